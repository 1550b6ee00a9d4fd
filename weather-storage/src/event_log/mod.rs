//! Event log tier.
//!
//! Durable record of every successful origin fetch: one row per
//! `(city, timestamp)` pointing at the stored snapshot. The lookup only ever
//! asks for the latest row of a city; the full trail stays for auditing.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryEventLog;
pub use sqlite::SqliteEventLog;

use async_trait::async_trait;
use weather_core::{CityKey, EventRecord, HealthCheck, StorageError};

/// Append-mostly log of fetch records.
///
/// `put` is an upsert keyed by `(city, timestamp)`: repeating a pair replaces
/// its path and never fails on the duplicate. Records are never deleted.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn put(&self, record: &EventRecord) -> Result<(), StorageError>;

    /// Most recent record for a city, by timestamp.
    async fn get_latest(&self, city: &CityKey) -> Result<Option<EventRecord>, StorageError>;

    /// Up to `limit` records for a city, newest first.
    async fn history(&self, city: &CityKey, limit: usize)
        -> Result<Vec<EventRecord>, StorageError>;

    async fn health_check(&self) -> HealthCheck {
        HealthCheck::healthy("event_log")
    }
}
