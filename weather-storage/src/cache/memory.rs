//! In-process cache backend.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};
use weather_core::{CityKey, StorageError, WeatherSnapshot};

use super::traits::{
    cache_key, decode_snapshot, encode_snapshot, expires_at_millis, CacheStats, FastCache,
    StatsCounters, DEFAULT_CACHE_PREFIX,
};

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Vec<u8>,
    expires_at_millis: i64,
}

/// Concurrent map with per-entry expiry.
///
/// Expired entries are dropped on the read that finds them. Contents do not
/// survive a restart, which is exactly the cold-start case the second-chance
/// tier covers.
#[derive(Debug)]
pub struct InMemoryFastCache {
    prefix: String,
    entries: DashMap<String, CacheEntry>,
    stats: StatsCounters,
}

impl Default for InMemoryFastCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFastCache {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_CACHE_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: DashMap::new(),
            stats: StatsCounters::default(),
        }
    }

    /// Evict one city. Returns true if an entry was present.
    pub fn invalidate(&self, city: &CityKey) -> bool {
        self.entries.remove(&cache_key(&self.prefix, city)).is_some()
    }

    /// Evict everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of entries held, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store raw bytes under a city's key, bypassing encoding.
    pub fn insert_raw(
        &self,
        city: &CityKey,
        ttl: Duration,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), StorageError> {
        let entry = CacheEntry {
            payload: payload.into(),
            expires_at_millis: expires_at_millis(Utc::now(), ttl)?,
        };
        self.entries.insert(cache_key(&self.prefix, city), entry);
        Ok(())
    }

    /// Drop `key` only if it still holds `seen`. A concurrent `set` that
    /// replaced the entry after it was read is left alone.
    fn remove_if_unchanged(&self, key: &str, seen: &CacheEntry) -> bool {
        self.entries
            .remove_if(key, |_, current| current.payload == seen.payload)
            .is_some()
    }
}

#[async_trait]
impl FastCache for InMemoryFastCache {
    async fn get(&self, city: &CityKey) -> Option<WeatherSnapshot> {
        let key = cache_key(&self.prefix, city);
        let now_millis = Utc::now().timestamp_millis();

        // Clone out of the shard so no map guard is held across removal.
        let entry = self.entries.get(&key).map(|e| e.value().clone());
        let Some(entry) = entry else {
            self.stats.record_miss();
            return None;
        };

        if entry.expires_at_millis <= now_millis {
            self.entries
                .remove_if(&key, |_, current| current.expires_at_millis <= now_millis);
            self.stats.record_expiration();
            self.stats.record_miss();
            debug!(city = %city, "Cache entry expired");
            return None;
        }

        match decode_snapshot(&key, &entry.payload) {
            Ok(snapshot) => {
                self.stats.record_hit();
                Some(snapshot)
            }
            Err(e) => {
                warn!(city = %city, tier = "cache", error = %e, "Discarding undecodable cache entry");
                self.remove_if_unchanged(&key, &entry);
                self.stats.record_corrupt();
                self.stats.record_miss();
                None
            }
        }
    }

    async fn set(
        &self,
        city: &CityKey,
        ttl: Duration,
        snapshot: &WeatherSnapshot,
    ) -> Result<(), StorageError> {
        let payload = encode_snapshot(snapshot)?;
        self.insert_raw(city, ttl, payload)
    }

    async fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.entries.len() as u64)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
