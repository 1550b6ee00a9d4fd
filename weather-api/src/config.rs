//! Service Configuration
//!
//! Everything the binary needs is read from environment variables once at
//! startup. Unset variables fall back to development defaults, except the
//! provider API key, which is required.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use weather_core::{ConfigError, LookupConfig, RecacheTtl, DEFAULT_TTL_SECS};
use weather_storage::DEFAULT_CACHE_PREFIX;

/// OpenWeatherMap current-weather endpoint.
pub const DEFAULT_PROVIDER_URL_FORMAT: &str =
    "https://api.openweathermap.org/data/2.5/weather?q={city}&appid={api_key}";

// ============================================================================
// CACHE BACKEND
// ============================================================================

/// Which fast cache implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    /// Process-local map, lost on restart.
    #[default]
    Memory,
    /// Memory-mapped LMDB environment on local disk.
    Lmdb,
}

impl std::str::FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "lmdb" => Ok(Self::Lmdb),
            other => Err(invalid("WEATHER_CACHE_BACKEND", other, "expected 'memory' or 'lmdb'")),
        }
    }
}

// ============================================================================
// PROVIDER CONFIGURATION
// ============================================================================

/// Weather provider settings.
#[derive(Debug)]
pub struct ProviderConfig {
    /// URL template with `{city}` and `{api_key}` placeholders.
    pub url_format: String,
    pub api_key: SecretString,
    /// Per-request HTTP timeout for provider calls.
    pub timeout: Duration,
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

#[derive(Debug)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub lookup: LookupConfig,
    pub cache_backend: CacheBackend,
    pub cache_path: PathBuf,
    pub cache_max_size_mb: usize,
    pub cache_prefix: String,
    pub event_log_path: PathBuf,
    pub object_store_dir: PathBuf,
    pub provider: ProviderConfig,
    /// Upper bound on a whole `/weather` lookup.
    pub request_timeout: Duration,
    /// Allowed CORS origins. Empty means allow all origins.
    pub cors_origins: Vec<String>,
}

impl ServiceConfig {
    /// Create a ServiceConfig from environment variables.
    ///
    /// Environment variables:
    /// - `WEATHER_API_BIND`: Listen host (default: 0.0.0.0)
    /// - `PORT` / `WEATHER_API_PORT`: Listen port (default: 3000)
    /// - `WEATHER_CACHE_TTL_SECS`: Freshness window (default: 300)
    /// - `WEATHER_RECACHE_TTL`: "remaining" or "full" (default: remaining)
    /// - `WEATHER_CACHE_BACKEND`: "memory" or "lmdb" (default: memory)
    /// - `WEATHER_CACHE_PATH`: LMDB directory (default: ./data/cache)
    /// - `WEATHER_CACHE_MAX_SIZE_MB`: LMDB map size (default: 64)
    /// - `WEATHER_CACHE_PREFIX`: Cache key prefix (default: weather_api)
    /// - `WEATHER_EVENT_LOG_PATH`: SQLite file (default: ./data/events.sqlite3)
    /// - `WEATHER_OBJECT_STORE_DIR`: Snapshot directory (default: ./data/objects)
    /// - `WEATHER_PROVIDER_URL_FORMAT`: Provider URL template
    /// - `WEATHER_PROVIDER_API_KEY`: Provider API key (required)
    /// - `WEATHER_PROVIDER_TIMEOUT_SECS`: Provider HTTP timeout (default: 10)
    /// - `WEATHER_REQUEST_TIMEOUT_SECS`: Whole-lookup timeout (default: 30)
    /// - `WEATHER_CORS_ORIGINS`: Comma-separated allowed origins
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = var("WEATHER_API_BIND").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = var("PORT")
            .or_else(|| var("WEATHER_API_PORT"))
            .unwrap_or_else(|| "3000".to_string());
        let port: u16 = parse_field("WEATHER_API_PORT", &port)?;
        let addr = format!("{}:{}", host, port);
        let bind_addr = addr
            .parse::<SocketAddr>()
            .map_err(|e| invalid("WEATHER_API_BIND", &addr, &e.to_string()))?;

        let ttl_secs = match var("WEATHER_CACHE_TTL_SECS") {
            Some(raw) => parse_field("WEATHER_CACHE_TTL_SECS", &raw)?,
            None => DEFAULT_TTL_SECS,
        };
        let recache_ttl = match var("WEATHER_RECACHE_TTL") {
            Some(raw) => raw.parse::<RecacheTtl>()?,
            None => RecacheTtl::default(),
        };
        let lookup = LookupConfig::new(Duration::from_secs(ttl_secs)).with_recache_ttl(recache_ttl);
        lookup.validate()?;

        let cache_backend = match var("WEATHER_CACHE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => CacheBackend::default(),
        };
        let cache_max_size_mb = match var("WEATHER_CACHE_MAX_SIZE_MB") {
            Some(raw) => parse_field("WEATHER_CACHE_MAX_SIZE_MB", &raw)?,
            None => 64,
        };

        let api_key = var("WEATHER_PROVIDER_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "WEATHER_PROVIDER_API_KEY".to_string(),
            })?;
        let url_format = var("WEATHER_PROVIDER_URL_FORMAT")
            .unwrap_or_else(|| DEFAULT_PROVIDER_URL_FORMAT.to_string());
        if !url_format.contains("{city}") {
            return Err(invalid(
                "WEATHER_PROVIDER_URL_FORMAT",
                &url_format,
                "template must contain {city}",
            ));
        }
        let provider_timeout = secs_or("WEATHER_PROVIDER_TIMEOUT_SECS", &var, 10)?;
        let request_timeout = secs_or("WEATHER_REQUEST_TIMEOUT_SECS", &var, 30)?;

        let cors_origins = var("WEATHER_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            lookup,
            cache_backend,
            cache_path: var("WEATHER_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/cache")),
            cache_max_size_mb,
            cache_prefix: var("WEATHER_CACHE_PREFIX")
                .unwrap_or_else(|| DEFAULT_CACHE_PREFIX.to_string()),
            event_log_path: var("WEATHER_EVENT_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/events.sqlite3")),
            object_store_dir: var("WEATHER_OBJECT_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/objects")),
            provider: ProviderConfig {
                url_format,
                api_key: SecretString::from(api_key),
                timeout: provider_timeout,
            },
            request_timeout,
            cors_origins,
        })
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_field<T>(field: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(field, raw, &e.to_string()))
}

fn secs_or<F>(field: &str, var: &F, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = match var(field) {
        Some(raw) => parse_field(field, &raw)?,
        None => default,
    };
    if secs == 0 {
        return Err(invalid(field, "0", "timeout must be at least one second"));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_only_api_key() {
        let config = ServiceConfig::from_vars(vars(&[("WEATHER_PROVIDER_API_KEY", "k3y")]))
            .expect("valid config");
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:3000");
        assert_eq!(config.lookup.ttl, Duration::from_secs(300));
        assert_eq!(config.lookup.recache_ttl, RecacheTtl::Remaining);
        assert_eq!(config.cache_backend, CacheBackend::Memory);
        assert_eq!(config.cache_prefix, "weather_api");
        assert_eq!(config.provider.url_format, DEFAULT_PROVIDER_URL_FORMAT);
        assert_eq!(config.provider.api_key.expose_secret(), "k3y");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_missing_api_key_is_an_error() {
        let err = ServiceConfig::from_vars(vars(&[])).expect_err("key required");
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "WEATHER_PROVIDER_API_KEY".to_string()
            }
        );

        let blank = ServiceConfig::from_vars(vars(&[("WEATHER_PROVIDER_API_KEY", "  ")]));
        assert!(blank.is_err());
    }

    #[test]
    fn test_port_precedence() {
        let config = ServiceConfig::from_vars(vars(&[
            ("WEATHER_PROVIDER_API_KEY", "k"),
            ("PORT", "8080"),
            ("WEATHER_API_PORT", "9090"),
        ]))
        .expect("valid config");
        assert_eq!(config.bind_addr.port(), 8080);

        let config = ServiceConfig::from_vars(vars(&[
            ("WEATHER_PROVIDER_API_KEY", "k"),
            ("WEATHER_API_BIND", "127.0.0.1"),
            ("WEATHER_API_PORT", "9090"),
        ]))
        .expect("valid config");
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9090");
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_vars(vars(&[
            ("WEATHER_PROVIDER_API_KEY", "k"),
            ("WEATHER_CACHE_TTL_SECS", "60"),
            ("WEATHER_RECACHE_TTL", "full"),
            ("WEATHER_CACHE_BACKEND", "LMDB"),
            ("WEATHER_CACHE_PATH", "/var/lib/weather/cache"),
            ("WEATHER_CORS_ORIGINS", "https://a.example, ,https://b.example"),
        ]))
        .expect("valid config");
        assert_eq!(config.lookup.ttl, Duration::from_secs(60));
        assert_eq!(config.lookup.recache_ttl, RecacheTtl::Full);
        assert_eq!(config.cache_backend, CacheBackend::Lmdb);
        assert_eq!(config.cache_path, PathBuf::from("/var/lib/weather/cache"));
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        for (key, value) in [
            ("WEATHER_CACHE_TTL_SECS", "soon"),
            ("WEATHER_CACHE_TTL_SECS", "0"),
            ("WEATHER_RECACHE_TTL", "sometimes"),
            ("WEATHER_CACHE_BACKEND", "redis"),
            ("PORT", "70000"),
            ("WEATHER_REQUEST_TIMEOUT_SECS", "0"),
            ("WEATHER_PROVIDER_URL_FORMAT", "https://example.com/weather"),
        ] {
            let result =
                ServiceConfig::from_vars(vars(&[("WEATHER_PROVIDER_API_KEY", "k"), (key, value)]));
            assert!(result.is_err(), "{}={} should be rejected", key, value);
        }
    }
}
