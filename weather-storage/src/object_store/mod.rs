//! Object store tier.
//!
//! Holds one snapshot payload per `(city, timestamp)`. The returned
//! [`ObjectPath`] is a pure function of those two inputs, so storing the same
//! pair twice lands on the same object, matching the event log's upsert.

pub mod fs;
pub mod memory;

pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;

use async_trait::async_trait;
use weather_core::{CityKey, CompactTimestamp, ObjectPath, StorageError, WeatherSnapshot};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persist a snapshot and return where it went.
    async fn store(
        &self,
        city: &CityKey,
        timestamp: &CompactTimestamp,
        snapshot: &WeatherSnapshot,
    ) -> Result<ObjectPath, StorageError>;

    /// Load a snapshot.
    ///
    /// Fails with [`StorageError::NotFound`] when nothing is at `path` and
    /// [`StorageError::Decode`] when something is there but is not a snapshot.
    async fn read(&self, path: &ObjectPath) -> Result<WeatherSnapshot, StorageError>;
}

/// File name for a city and fetch time: `{escaped_city}_{timestamp}.json`.
///
/// Bytes outside `[a-z0-9-]` are written as `%xx`, so the name never contains
/// a path separator or a dot segment.
pub fn object_name(city: &CityKey, timestamp: &CompactTimestamp) -> String {
    let mut escaped = String::with_capacity(city.as_str().len());
    for byte in city.as_str().bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' => escaped.push(byte as char),
            other => {
                escaped.push('%');
                escaped.push_str(&hex::encode([other]));
            }
        }
    }
    format!("{}_{}.json", escaped, timestamp)
}

pub(crate) fn encode_pretty(snapshot: &WeatherSnapshot) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec_pretty(snapshot).map_err(|e| StorageError::Encode {
        reason: e.to_string(),
    })
}

pub(crate) fn decode_object(path: &ObjectPath, bytes: &[u8]) -> Result<WeatherSnapshot, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })
}
