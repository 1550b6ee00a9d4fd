//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ConfigError;

/// Default freshness window shared by the fast cache and the second-chance
/// tier, in seconds.
pub const DEFAULT_TTL_SECS: u64 = 300;

/// TTL applied when a second-chance hit is written back into the fast cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecacheTtl {
    /// Only the part of the window the stored record has left (`ttl - age`).
    #[default]
    Remaining,
    /// A full `ttl`, regardless of how old the stored record already is.
    Full,
}

impl std::str::FromStr for RecacheTtl {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remaining" => Ok(Self::Remaining),
            "full" => Ok(Self::Full),
            other => Err(ConfigError::InvalidValue {
                field: "recache_ttl".to_string(),
                value: other.to_string(),
                reason: "expected 'remaining' or 'full'".to_string(),
            }),
        }
    }
}

/// Lookup orchestration settings, injected once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Freshness window for both the fast cache and the second-chance tier.
    pub ttl: Duration,
    pub recache_ttl: RecacheTtl,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            recache_ttl: RecacheTtl::default(),
        }
    }
}

impl LookupConfig {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    pub fn with_recache_ttl(mut self, recache_ttl: RecacheTtl) -> Self {
        self.recache_ttl = recache_ttl;
        self
    }

    /// Reject settings that would make every tier useless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "ttl".to_string(),
                value: "0".to_string(),
                reason: "ttl must be at least one second".to_string(),
            });
        }
        Ok(())
    }

    /// TTL to use when re-caching a second-chance hit of the given age.
    ///
    /// Never shorter than one second, so a record exactly at the freshness
    /// boundary is still written back.
    pub fn recache_ttl_for_age(&self, age: Duration) -> Duration {
        match self.recache_ttl {
            RecacheTtl::Full => self.ttl,
            RecacheTtl::Remaining => self
                .ttl
                .saturating_sub(age)
                .max(Duration::from_secs(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LookupConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.recache_ttl, RecacheTtl::Remaining);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = LookupConfig::new(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_recache_remaining() {
        let config = LookupConfig::default();
        assert_eq!(
            config.recache_ttl_for_age(Duration::from_secs(120)),
            Duration::from_secs(180)
        );
        assert_eq!(
            config.recache_ttl_for_age(Duration::from_secs(300)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_recache_full() {
        let config = LookupConfig::default().with_recache_ttl(RecacheTtl::Full);
        assert_eq!(
            config.recache_ttl_for_age(Duration::from_secs(299)),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_recache_parse() {
        assert_eq!("FULL".parse::<RecacheTtl>(), Ok(RecacheTtl::Full));
        assert_eq!("remaining".parse::<RecacheTtl>(), Ok(RecacheTtl::Remaining));
        assert!("sometimes".parse::<RecacheTtl>().is_err());
    }
}
