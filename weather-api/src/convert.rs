//! Provider payload → [`WeatherSnapshot`] mapping.
//!
//! The provider speaks Kelvin, m/s, degrees and UTC epochs; snapshots carry
//! display strings only. Every numeric field is converted here and nowhere
//! else.

use chrono::DateTime;
use serde::Deserialize;
use weather_core::{CityKey, OriginError, WeatherSnapshot};

const KELVIN_OFFSET: f64 = 273.15;

// ============================================================================
// PROVIDER PAYLOAD
// ============================================================================

/// Subset of the OpenWeatherMap current-weather response that we read.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderWeather {
    pub main: ProviderMain,
    pub wind: ProviderWind,
    pub clouds: ProviderClouds,
    pub sys: ProviderSys,
    /// Shift from UTC in seconds.
    #[serde(default)]
    pub timezone: i64,
    pub coord: ProviderCoord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMain {
    pub temp: f64,
    pub pressure: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderWind {
    pub speed: f64,
    #[serde(default)]
    pub deg: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderClouds {
    pub all: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSys {
    pub sunrise: i64,
    pub sunset: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCoord {
    pub lat: f64,
    pub lon: f64,
}

impl ProviderWeather {
    /// Build the snapshot for `city` as requested at `requested_time`.
    ///
    /// `location_name` is the normalized lookup key, not the provider's
    /// display name.
    pub fn into_snapshot(
        self,
        city: &CityKey,
        requested_time: &str,
    ) -> Result<WeatherSnapshot, OriginError> {
        Ok(WeatherSnapshot {
            location_name: city.to_string(),
            temperature_celsius: kelvin_to_celsius(self.main.temp),
            temperature_fahrenheit: kelvin_to_fahrenheit(self.main.temp),
            wind: wind_description(self.wind.speed, self.wind.deg),
            cloudiness: cloudiness(self.clouds.all).to_string(),
            pressure: format!("{} hpa", self.main.pressure),
            humidity: format!("{}%", self.main.humidity),
            sunrise: local_time(self.sys.sunrise, self.timezone)?,
            sunset: local_time(self.sys.sunset, self.timezone)?,
            geo_coordinates: format!("[{:.2}, {:.2}]", self.coord.lat, self.coord.lon),
            requested_time: requested_time.to_string(),
            forecast: String::new(),
        })
    }
}

// ============================================================================
// CONVERTERS
// ============================================================================

pub fn kelvin_to_celsius(kelvin: f64) -> String {
    format!("{} °C", round_to_int(kelvin - KELVIN_OFFSET))
}

pub fn kelvin_to_fahrenheit(kelvin: f64) -> String {
    format!("{} °F", round_to_int((kelvin - KELVIN_OFFSET) * 9.0 / 5.0 + 32.0))
}

fn round_to_int(value: f64) -> i64 {
    // `as` saturates; -0.4 rounds to -0.0 which casts to 0.
    value.round() as i64
}

/// Beaufort scale upper bounds in m/s (exclusive), paired with their names.
const BEAUFORT: &[(f64, &str)] = &[
    (0.5, "Calm"),
    (1.6, "Light air"),
    (3.4, "Light breeze"),
    (5.5, "Gentle breeze"),
    (8.0, "Moderate breeze"),
    (10.8, "Fresh breeze"),
    (13.9, "Strong breeze"),
    (17.2, "High wind"),
    (20.8, "Gale"),
    (24.5, "Strong gale"),
    (28.5, "Storm"),
    (32.7, "Violent storm"),
];

/// Beaufort name for a wind speed in m/s.
pub fn beaufort(speed: f64) -> &'static str {
    BEAUFORT
        .iter()
        .find(|(limit, _)| speed < *limit)
        .map(|(_, name)| *name)
        .unwrap_or("Hurricane")
}

const COMPASS: [&str; 16] = [
    "north",
    "north-northeast",
    "northeast",
    "east-northeast",
    "east",
    "east-southeast",
    "southeast",
    "south-southeast",
    "south",
    "south-southwest",
    "southwest",
    "west-southwest",
    "west",
    "west-northwest",
    "northwest",
    "north-northwest",
];

/// 16-point compass name for a meteorological bearing in degrees.
pub fn compass_direction(degrees: f64) -> &'static str {
    let normalized = degrees.rem_euclid(360.0);
    let index = ((normalized / 22.5) + 0.5).floor() as usize % COMPASS.len();
    COMPASS[index]
}

pub fn wind_description(speed: f64, degrees: Option<f64>) -> String {
    match degrees {
        Some(deg) => format!(
            "{}, {:.1} m/s, {}",
            beaufort(speed),
            speed,
            compass_direction(deg)
        ),
        None => format!("{}, {:.1} m/s", beaufort(speed), speed),
    }
}

/// Cloud cover bucket for a percentage.
pub fn cloudiness(percent: f64) -> &'static str {
    match percent {
        p if p <= 10.0 => "Clear sky",
        p if p <= 25.0 => "Few clouds",
        p if p <= 50.0 => "Scattered clouds",
        p if p <= 84.0 => "Broken clouds",
        _ => "Overcast clouds",
    }
}

/// `HH:MM` wall-clock time for a UTC epoch shifted by `offset_secs`.
pub fn local_time(epoch_secs: i64, offset_secs: i64) -> Result<String, OriginError> {
    let shifted = epoch_secs
        .checked_add(offset_secs)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| OriginError::InvalidResponse {
            reason: format!("timestamp {} + {} out of range", epoch_secs, offset_secs),
        })?;
    Ok(shifted.format("%H:%M").to_string())
}
