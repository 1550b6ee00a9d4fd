//! Tracing subscriber initialization.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

/// Filter applied when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str =
    "weather_api=debug,weather_storage=info,tower_http=info,info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: std::env::var("WEATHER_SERVICE_NAME")
                .unwrap_or_else(|_| "weather-api".to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_format: match std::env::var("WEATHER_LOG_FORMAT") {
                Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the global tracing subscriber.
///
/// Call once at startup; a second call fails because a global subscriber is
/// already set.
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<()> {
    let registry = tracing_subscriber::registry().with(env_filter());
    let result = match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer()).try_init(),
    };
    result.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = config.service_name,
        service_version = config.service_version,
        log_format = ?config.log_format,
        "Telemetry initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_telemetry_config_log_format() {
        {
            let _guard = EnvVarGuard::set("WEATHER_LOG_FORMAT", Some("JSON"));
            assert_eq!(TelemetryConfig::default().log_format, LogFormat::Json);
        }
        {
            let _guard = EnvVarGuard::set("WEATHER_LOG_FORMAT", None);
            let config = TelemetryConfig::default();
            assert_eq!(config.log_format, LogFormat::Pretty);
            assert_eq!(config.service_version, env!("CARGO_PKG_VERSION"));
        }
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig {
            service_name: "weather-api-test".to_string(),
            service_version: "0.0.0".to_string(),
            log_format: LogFormat::Pretty,
        };
        // Another test may have installed a subscriber first; either way the
        // second call in this test must fail.
        let _ = init_tracer(&config);
        assert!(init_tracer(&config).is_err());
    }
}
