//! Weather Core - Entity Types
//!
//! Pure data structures shared by every tier of the lookup service. All other
//! crates depend on this one; it carries no I/O.

pub mod config;
pub mod error;
pub mod health;
pub mod origin;

pub use config::{LookupConfig, RecacheTtl, DEFAULT_TTL_SECS};
pub use error::{
    ConfigError, OriginError, PersistenceError, StorageError, StorageTier, ValidationError,
    WeatherError, WeatherResult, WriteStep,
};
pub use health::{HealthCheck, HealthStatus};
pub use origin::OriginClient;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// TIME
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// strftime layout of [`CompactTimestamp`]: fixed width, lexically sortable.
pub const COMPACT_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// strftime layout of the human-readable request time carried in snapshots.
pub const REQUESTED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render the wall-clock label stored in [`WeatherSnapshot::requested_time`].
pub fn requested_time_label(now: Timestamp) -> String {
    now.format(REQUESTED_TIME_FORMAT).to_string()
}

/// Fixed-width UTC timestamp (`20240109T115700Z`) used to key event records
/// and stored objects.
///
/// Ordering of the string form equals chronological ordering, which is what
/// the event log relies on for "latest" queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompactTimestamp(String);

impl CompactTimestamp {
    /// Format an instant at second resolution.
    pub fn from_datetime(dt: Timestamp) -> Self {
        Self(dt.format(COMPACT_TIMESTAMP_FORMAT).to_string())
    }

    /// Parse and validate a compact timestamp string.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let candidate = Self(raw.to_string());
        candidate.to_datetime()?;
        Ok(candidate)
    }

    /// Wrap a value read back from persistence without validating it.
    ///
    /// Persisted rows are not trusted; callers find out about a bad value
    /// when they call [`CompactTimestamp::to_datetime`].
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Convert back into a UTC instant.
    pub fn to_datetime(&self) -> Result<Timestamp, ValidationError> {
        let naive = NaiveDateTime::parse_from_str(&self.0, COMPACT_TIMESTAMP_FORMAT).map_err(
            |e| ValidationError::InvalidValue {
                field: "timestamp".to_string(),
                reason: format!("'{}' is not a compact timestamp: {}", self.0, e),
            },
        )?;
        Ok(naive.and_utc())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompactTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// CITY KEY
// ============================================================================

/// Normalized (trimmed, lower-cased) city identifier.
///
/// This is the only key used across cache, event log and object store. It is
/// not checked against any gazetteer: any non-blank input is a valid key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CityKey(String);

impl CityKey {
    /// Normalize raw user input into a key.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "city".to_string(),
            });
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CityKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CityKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CityKey> for String {
    fn from(key: CityKey) -> Self {
        key.0
    }
}

impl AsRef<str> for CityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Fully-populated weather result for one city at one fetch time.
///
/// Every field is a display string; numeric provider values are converted
/// before a snapshot is built. Snapshots are never patched or merged: a
/// lookup yields either a cached copy or a freshly fetched one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WeatherSnapshot {
    #[cfg_attr(feature = "openapi", schema(example = "Warsaw"))]
    pub location_name: String,
    #[cfg_attr(feature = "openapi", schema(example = "17 °C"))]
    pub temperature_celsius: String,
    #[cfg_attr(feature = "openapi", schema(example = "63 °F"))]
    pub temperature_fahrenheit: String,
    #[cfg_attr(feature = "openapi", schema(example = "Gentle breeze, 3.6 m/s, west-northwest"))]
    pub wind: String,
    #[cfg_attr(feature = "openapi", schema(example = "Scattered clouds"))]
    pub cloudiness: String,
    #[cfg_attr(feature = "openapi", schema(example = "1027 hpa"))]
    pub pressure: String,
    #[cfg_attr(feature = "openapi", schema(example = "63%"))]
    pub humidity: String,
    #[cfg_attr(feature = "openapi", schema(example = "06:07"))]
    pub sunrise: String,
    #[cfg_attr(feature = "openapi", schema(example = "18:00"))]
    pub sunset: String,
    #[cfg_attr(feature = "openapi", schema(example = "[52.23, 21.01]"))]
    pub geo_coordinates: String,
    /// Wall-clock time (UTC) at which the fetch was requested.
    #[cfg_attr(feature = "openapi", schema(example = "2018-01-09 11:57:00"))]
    pub requested_time: String,
    /// Optional forecast blob; empty when the provider supplied none.
    #[serde(default)]
    pub forecast: String,
}

// ============================================================================
// PERSISTENCE RECORDS
// ============================================================================

/// Opaque location of a stored snapshot, chosen by the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pointer from a city + fetch time to the stored payload.
///
/// At most one record exists per `(city, timestamp)`; writing the pair again
/// replaces the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub city: CityKey,
    pub timestamp: CompactTimestamp,
    pub path: ObjectPath,
}

impl EventRecord {
    pub fn new(city: CityKey, timestamp: CompactTimestamp, path: ObjectPath) -> Self {
        Self {
            city,
            timestamp,
            path,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_city_key_normalizes() {
        let key = CityKey::parse("  Warsaw ").expect("valid city");
        assert_eq!(key.as_str(), "warsaw");
        assert_eq!(key.to_string(), "warsaw");
    }

    #[test]
    fn test_city_key_rejects_blank() {
        assert!(CityKey::parse("").is_err());
        assert!(CityKey::parse("   ").is_err());
    }

    #[test]
    fn test_city_key_serde_validates() {
        let key: CityKey = serde_json::from_str("\"São Paulo\"").expect("valid json");
        assert_eq!(key.as_str(), "são paulo");
        assert!(serde_json::from_str::<CityKey>("\"  \"").is_err());
    }

    #[test]
    fn test_compact_timestamp_format() {
        let dt = Utc.with_ymd_and_hms(2018, 1, 9, 11, 57, 0).single().expect("valid date");
        let ts = CompactTimestamp::from_datetime(dt);
        assert_eq!(ts.as_str(), "20180109T115700Z");
        assert_eq!(ts.to_datetime().expect("parses"), dt);
        assert_eq!(requested_time_label(dt), "2018-01-09 11:57:00");
    }

    #[test]
    fn test_compact_timestamp_rejects_garbage() {
        assert!(CompactTimestamp::parse("yesterday").is_err());
        assert!(CompactTimestamp::from_stored("2018-01-09").to_datetime().is_err());
    }

    #[test]
    fn test_snapshot_forecast_defaults_to_empty() {
        let json = r#"{
            "location_name": "warsaw",
            "temperature_celsius": "17 °C",
            "temperature_fahrenheit": "63 °F",
            "wind": "Calm, 0.2 m/s",
            "cloudiness": "Clear sky",
            "pressure": "1027 hpa",
            "humidity": "63%",
            "sunrise": "06:07",
            "sunset": "18:00",
            "geo_coordinates": "[52.23, 21.01]",
            "requested_time": "2018-01-09 11:57:00"
        }"#;
        let snapshot: WeatherSnapshot = serde_json::from_str(json).expect("valid snapshot");
        assert_eq!(snapshot.forecast, "");
    }

    proptest! {
        #[test]
        fn prop_compact_timestamp_order_matches_time(a in 0i64..4_000_000_000, b in 0i64..4_000_000_000) {
            let da = Utc.timestamp_opt(a, 0).single().expect("in range");
            let db = Utc.timestamp_opt(b, 0).single().expect("in range");
            let ta = CompactTimestamp::from_datetime(da);
            let tb = CompactTimestamp::from_datetime(db);
            prop_assert_eq!(ta.cmp(&tb), da.cmp(&db));
            prop_assert_eq!(ta.to_datetime().expect("parses"), da);
        }
    }
}
