//! OpenWeatherMap-compatible origin client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use weather_core::{CityKey, OriginClient, OriginError, WeatherSnapshot};

use crate::config::ProviderConfig;
use crate::convert::ProviderWeather;

/// Longest provider error body echoed back in [`OriginError::Status`].
const MAX_ERROR_BODY: usize = 200;

/// HTTP client for a current-weather endpoint.
///
/// The URL template carries `{city}` and `{api_key}` placeholders in its
/// query string; both are substituted and percent-encoded per request.
pub struct OpenWeatherClient {
    http: reqwest::Client,
    url_format: String,
    api_key: SecretString,
}

impl OpenWeatherClient {
    pub fn new(
        url_format: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, OriginError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OriginError::Request {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            http,
            url_format: url_format.into(),
            api_key,
        })
    }

    pub fn from_config(config: ProviderConfig) -> Result<Self, OriginError> {
        Self::new(config.url_format, config.api_key, config.timeout)
    }

    /// Expand the template for `city`.
    fn request_url(&self, city: &CityKey) -> Result<Url, OriginError> {
        let mut url = Url::parse(&self.url_format).map_err(|e| OriginError::Request {
            reason: format!("invalid provider URL template: {}", e),
        })?;
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                let v = v
                    .replace("{city}", city.as_str())
                    .replace("{api_key}", self.api_key.expose_secret());
                (k.into_owned(), v)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        Ok(url)
    }
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    message: String,
}

fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ProviderErrorBody>(body) {
        return parsed.message;
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}

#[async_trait]
impl OriginClient for OpenWeatherClient {
    async fn fetch(
        &self,
        city: &CityKey,
        requested_time: &str,
    ) -> Result<WeatherSnapshot, OriginError> {
        let url = self.request_url(city)?;

        // Transport errors would otherwise print the URL, api key included.
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| OriginError::Request {
                reason: e.without_url().to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(OriginError::CityNotFound {
                city: city.to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| OriginError::Request {
            reason: e.without_url().to_string(),
        })?;

        if !status.is_success() {
            return Err(OriginError::Status {
                status: status.as_u16(),
                message: error_message(&String::from_utf8_lossy(&body)),
            });
        }

        let payload: ProviderWeather =
            serde_json::from_slice(&body).map_err(|e| OriginError::InvalidResponse {
                reason: e.to_string(),
            })?;
        tracing::debug!(city = %city, "Provider answered");
        payload.into_snapshot(city, requested_time)
    }

    fn provider_name(&self) -> &'static str {
        "openweathermap"
    }
}
