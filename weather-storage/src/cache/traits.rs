//! Cache backend trait and shared helpers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use weather_core::{CityKey, StorageError, StorageTier, WeatherSnapshot};

/// Key namespace used when none is configured.
pub const DEFAULT_CACHE_PREFIX: &str = "weather_api";

/// Build the namespaced cache key for a city.
pub fn cache_key(prefix: &str, city: &CityKey) -> String {
    format!("{}:{}", prefix, city)
}

/// Cache backend trait for pluggable cache implementations.
///
/// Implementations must be safe under concurrent `get`/`set` on the same key;
/// the last write wins. No request deduplication happens at this layer.
#[async_trait]
pub trait FastCache: Send + Sync {
    /// Get a live snapshot, or `None` on miss, expiry, corruption or backend
    /// failure.
    async fn get(&self, city: &CityKey) -> Option<WeatherSnapshot>;

    /// Store a snapshot that expires after `ttl`.
    async fn set(
        &self,
        city: &CityKey,
        ttl: Duration,
        snapshot: &WeatherSnapshot,
    ) -> Result<(), StorageError>;

    /// Get cache statistics.
    async fn stats(&self) -> CacheStats;

    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries currently held, where the backend can tell.
    pub entry_count: u64,
    /// Entries dropped because they outlived their TTL.
    pub expirations: u64,
    /// Entries dropped because they could not be decoded.
    pub corrupt_entries: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters shared by the backends.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    corrupt_entries: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_corrupt(&self) {
        self.corrupt_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entry_count: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            expirations: self.expirations.load(Ordering::Relaxed),
            corrupt_entries: self.corrupt_entries.load(Ordering::Relaxed),
        }
    }
}

/// Absolute expiry, in epoch milliseconds, for an entry written at `now`.
pub(crate) fn expires_at_millis(now: DateTime<Utc>, ttl: Duration) -> Result<i64, StorageError> {
    let ttl_millis = i64::try_from(ttl.as_millis()).map_err(|_| StorageError::Encode {
        reason: format!("ttl {:?} out of range", ttl),
    })?;
    now.timestamp_millis()
        .checked_add(ttl_millis)
        .ok_or_else(|| StorageError::Encode {
            reason: format!("ttl {:?} out of range", ttl),
        })
}

pub(crate) fn encode_snapshot(snapshot: &WeatherSnapshot) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(snapshot).map_err(|e| StorageError::Encode {
        reason: e.to_string(),
    })
}

pub(crate) fn decode_snapshot(key: &str, bytes: &[u8]) -> Result<WeatherSnapshot, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Decode {
        path: key.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn cache_unavailable(reason: impl Into<String>) -> StorageError {
    StorageError::Unavailable {
        tier: StorageTier::Cache,
        reason: reason.into(),
    }
}
