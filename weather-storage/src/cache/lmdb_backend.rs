//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts.
//!
//! # Value Layout
//!
//! Each value is `[expires_at_millis: i64 LE][json snapshot]`. LMDB has no
//! native expiry, so an entry whose deadline has passed is treated as absent
//! and deleted by the read that finds it.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get`
//! - Write transactions for `set`, lazy expiry and invalidation
//! - Statistics are tracked with atomic counters

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tracing::{debug, warn};
use weather_core::{CityKey, StorageError, WeatherSnapshot};

use super::traits::{
    cache_key, cache_unavailable, decode_snapshot, encode_snapshot, expires_at_millis,
    CacheStats, FastCache, StatsCounters, DEFAULT_CACHE_PREFIX,
};

const HEADER_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for StorageError {
    fn from(e: LmdbCacheError) -> Self {
        cache_unavailable(e.to_string())
    }
}

fn txn_error(e: heed::Error) -> StorageError {
    LmdbCacheError::Transaction(e.to_string()).into()
}

/// What a read found under a key.
enum Lookup {
    Missing,
    Expired,
    Live(WeatherSnapshot),
}

/// LMDB-backed fast cache.
///
/// # Example
///
/// ```ignore
/// use weather_storage::cache::LmdbFastCache;
///
/// let cache = LmdbFastCache::new("/var/lib/weather/cache", 64, "weather_api")?;
/// cache.set(&city, Duration::from_secs(300), &snapshot).await?;
/// let hit = cache.get(&city).await;
/// ```
pub struct LmdbFastCache {
    env: Env,
    db: Database<Bytes, Bytes>,
    prefix: String,
    stats: StatsCounters,
}

impl LmdbFastCache {
    /// Create a new LMDB cache backend.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    /// * `prefix` - Key namespace
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn new<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        prefix: impl Into<String>,
    ) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment directory is owned by this process and is
        // not opened twice within it.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            prefix: prefix.into(),
            stats: StatsCounters::default(),
        })
    }

    /// Open with the default key prefix.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        Self::new(path, max_size_mb, DEFAULT_CACHE_PREFIX)
    }

    fn read(&self, key: &str, now_millis: i64) -> Result<Lookup, StorageError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let Some(bytes) = self.db.get(&rtxn, key.as_bytes()).map_err(txn_error)? else {
            return Ok(Lookup::Missing);
        };

        if bytes.len() < HEADER_LEN {
            return Err(StorageError::Decode {
                path: key.to_string(),
                reason: format!("entry is {} bytes, shorter than its header", bytes.len()),
            });
        }

        let (header, body) = bytes.split_at(HEADER_LEN);
        let mut deadline = [0u8; HEADER_LEN];
        deadline.copy_from_slice(header);
        if i64::from_le_bytes(deadline) <= now_millis {
            return Ok(Lookup::Expired);
        }

        decode_snapshot(key, body).map(Lookup::Live)
    }

    /// Delete `key` if it is still expired (or still corrupt) when the write
    /// transaction starts. A concurrent fresh `set` is left alone.
    fn remove_if_dead(&self, key: &str, now_millis: i64) -> Result<bool, StorageError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let dead = match self.db.get(&wtxn, key.as_bytes()).map_err(txn_error)? {
            Some(bytes) if bytes.len() >= HEADER_LEN => {
                let mut deadline = [0u8; HEADER_LEN];
                deadline.copy_from_slice(&bytes[..HEADER_LEN]);
                i64::from_le_bytes(deadline) <= now_millis
                    || decode_snapshot(key, &bytes[HEADER_LEN..]).is_err()
            }
            Some(_) => true,
            None => false,
        };
        let removed = if dead {
            self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_error)?
        } else {
            false
        };
        wtxn.commit().map_err(txn_error)?;
        Ok(removed)
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), value)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)
    }

    /// Evict one city. Returns true if an entry was present.
    pub fn invalidate(&self, city: &CityKey) -> Result<bool, StorageError> {
        let key = cache_key(&self.prefix, city);
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self
            .db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> Result<u64, StorageError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        self.db.len(&rtxn).map_err(txn_error)
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl FastCache for LmdbFastCache {
    async fn get(&self, city: &CityKey) -> Option<WeatherSnapshot> {
        let key = cache_key(&self.prefix, city);
        let now_millis = Utc::now().timestamp_millis();

        match self.read(&key, now_millis) {
            Ok(Lookup::Live(snapshot)) => {
                self.stats.record_hit();
                Some(snapshot)
            }
            Ok(Lookup::Missing) => {
                self.stats.record_miss();
                None
            }
            Ok(Lookup::Expired) => {
                self.stats.record_expiration();
                self.stats.record_miss();
                debug!(city = %city, "Cache entry expired");
                if let Err(e) = self.remove_if_dead(&key, now_millis) {
                    warn!(city = %city, tier = "cache", error = %e, "Failed to drop expired cache entry");
                }
                None
            }
            Err(e @ StorageError::Decode { .. }) => {
                warn!(city = %city, tier = "cache", error = %e, "Discarding undecodable cache entry");
                self.stats.record_corrupt();
                self.stats.record_miss();
                if let Err(e) = self.remove_if_dead(&key, now_millis) {
                    warn!(city = %city, tier = "cache", error = %e, "Failed to drop corrupt cache entry");
                }
                None
            }
            Err(e) => {
                warn!(city = %city, tier = "cache", error = %e, "Cache read failed");
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
        let key = cache_key(&self.prefix, city);
        let deadline = expires_at_millis(Utc::now(), ttl)?;
        let body = encode_snapshot(snapshot)?;

        let mut value = Vec::with_capacity(HEADER_LEN + body.len());
        value.extend_from_slice(&deadline.to_le_bytes());
        value.extend_from_slice(&body);

        self.write(&key, &value)
    }

    async fn stats(&self) -> CacheStats {
        let entry_count = self.len().unwrap_or_default();
        self.stats.snapshot(entry_count)
    }

    fn backend_name(&self) -> &'static str {
        "lmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_backend() -> (LmdbFastCache, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend =
            LmdbFastCache::open(temp_dir.path(), 10).expect("backend creation should succeed");
        (backend, temp_dir)
    }

    fn make_snapshot(name: &str) -> WeatherSnapshot {
        WeatherSnapshot {
            location_name: name.to_string(),
            temperature_celsius: "-3 °C".to_string(),
            temperature_fahrenheit: "27 °F".to_string(),
            wind: "Calm, 0.3 m/s".to_string(),
            cloudiness: "Overcast clouds".to_string(),
            pressure: "1003 hpa".to_string(),
            humidity: "91%".to_string(),
            sunrise: "07:41".to_string(),
            sunset: "15:38".to_string(),
            geo_coordinates: "[52.23, 21.01]".to_string(),
            requested_time: "2018-01-09 11:57:00".to_string(),
            forecast: String::new(),
        }
    }

    fn city(name: &str) -> CityKey {
        CityKey::parse(name).expect("valid city")
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (backend, _temp_dir) = create_test_backend();
        let warsaw = city("warsaw");

        backend
            .set(&warsaw, Duration::from_secs(300), &make_snapshot("Warsaw"))
            .await
            .expect("set should succeed");

        assert_eq!(backend.get(&warsaw).await, Some(make_snapshot("Warsaw")));
        assert_eq!(backend.stats().await.hits, 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (backend, _temp_dir) = create_test_backend();
        assert!(backend.get(&city("atlantis")).await.is_none());
        assert_eq!(backend.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_removed_lazily() {
        let (backend, _temp_dir) = create_test_backend();
        let warsaw = city("warsaw");

        backend
            .set(&warsaw, Duration::from_millis(20), &make_snapshot("Warsaw"))
            .await
            .expect("set should succeed");
        assert_eq!(backend.len().expect("len"), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(backend.get(&warsaw).await.is_none());
        assert!(backend.is_empty().expect("len"));
        assert_eq!(backend.stats().await.expirations, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let (backend, _temp_dir) = create_test_backend();
        let warsaw = city("warsaw");
        let key = cache_key(DEFAULT_CACHE_PREFIX, &warsaw);

        let mut value = i64::MAX.to_le_bytes().to_vec();
        value.extend_from_slice(b"{ not a snapshot");
        backend.write(&key, &value).expect("raw write should succeed");

        assert!(backend.get(&warsaw).await.is_none());
        assert_eq!(backend.stats().await.corrupt_entries, 1);
        assert!(backend.is_empty().expect("len"));
    }

    #[tokio::test]
    async fn test_truncated_header_is_a_miss() {
        let (backend, _temp_dir) = create_test_backend();
        let warsaw = city("warsaw");
        let key = cache_key(DEFAULT_CACHE_PREFIX, &warsaw);
        backend.write(&key, b"abc").expect("raw write should succeed");

        assert!(backend.get(&warsaw).await.is_none());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let warsaw = city("warsaw");
        {
            let backend = LmdbFastCache::open(temp_dir.path(), 10).expect("open");
            backend
                .set(&warsaw, Duration::from_secs(300), &make_snapshot("Warsaw"))
                .await
                .expect("set should succeed");
        }
        let reopened = LmdbFastCache::open(temp_dir.path(), 10).expect("reopen");
        assert_eq!(reopened.get(&warsaw).await, Some(make_snapshot("Warsaw")));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let warsaw = city("warsaw");
        let backend = LmdbFastCache::new(temp_dir.path().join("cache"), 10, "test").expect("open");
        backend
            .set(&warsaw, Duration::from_secs(300), &make_snapshot("Warsaw"))
            .await
            .expect("set should succeed");
        assert!(backend.invalidate(&warsaw).expect("invalidate"));
        assert!(!backend.invalidate(&warsaw).expect("invalidate"));
        assert!(backend.get(&warsaw).await.is_none());
    }
}
