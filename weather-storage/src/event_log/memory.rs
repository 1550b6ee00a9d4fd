//! In-process event log.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use weather_core::{CityKey, CompactTimestamp, EventRecord, ObjectPath, StorageError};

use super::EventLog;

type CityTrail = BTreeMap<CompactTimestamp, ObjectPath>;

/// Event log held in memory, ordered per city by timestamp.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    trails: RwLock<HashMap<CityKey, CityTrail>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all cities.
    pub fn len(&self) -> Result<usize, StorageError> {
        let trails = self.trails.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(trails.values().map(BTreeMap::len).sum())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn put(&self, record: &EventRecord) -> Result<(), StorageError> {
        let mut trails = self.trails.write().map_err(|_| StorageError::LockPoisoned)?;
        trails
            .entry(record.city.clone())
            .or_default()
            .insert(record.timestamp.clone(), record.path.clone());
        Ok(())
    }

    async fn get_latest(&self, city: &CityKey) -> Result<Option<EventRecord>, StorageError> {
        let trails = self.trails.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(trails
            .get(city)
            .and_then(|trail| trail.last_key_value())
            .map(|(ts, path)| EventRecord::new(city.clone(), ts.clone(), path.clone())))
    }

    async fn history(
        &self,
        city: &CityKey,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StorageError> {
        let trails = self.trails.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(trails
            .get(city)
            .map(|trail| {
                trail
                    .iter()
                    .rev()
                    .take(limit)
                    .map(|(ts, path)| EventRecord::new(city.clone(), ts.clone(), path.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
