//! In-process object store.

use async_trait::async_trait;
use dashmap::DashMap;
use weather_core::{CityKey, CompactTimestamp, ObjectPath, StorageError, WeatherSnapshot};

use super::{decode_object, encode_pretty, object_name, ObjectStore};

const SCHEME: &str = "mem://";

/// Object store backed by a concurrent map of path to bytes.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<String, Vec<u8>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the object for `(city, timestamp)` lives.
    pub fn path_for(city: &CityKey, timestamp: &CompactTimestamp) -> ObjectPath {
        ObjectPath::new(format!("{}{}", SCHEME, object_name(city, timestamp)))
    }

    /// Overwrite an object with arbitrary bytes.
    pub fn insert_raw(&self, path: &ObjectPath, bytes: impl Into<Vec<u8>>) {
        self.objects.insert(path.as_str().to_string(), bytes.into());
    }

    /// Drop an object. Returns true if it existed.
    pub fn remove(&self, path: &ObjectPath) -> bool {
        self.objects.remove(path.as_str()).is_some()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn store(
        &self,
        city: &CityKey,
        timestamp: &CompactTimestamp,
        snapshot: &WeatherSnapshot,
    ) -> Result<ObjectPath, StorageError> {
        let path = Self::path_for(city, timestamp);
        let bytes = encode_pretty(snapshot)?;
        self.objects.insert(path.as_str().to_string(), bytes);
        Ok(path)
    }

    async fn read(&self, path: &ObjectPath) -> Result<WeatherSnapshot, StorageError> {
        let bytes = self
            .objects
            .get(path.as_str())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound {
                path: path.to_string(),
            })?;
        decode_object(path, &bytes)
    }
}
