//! Lookup results.
//!
//! A lookup has one primary value (the snapshot) and up to three side
//! effects. [`LookupOutcome`] keeps them apart so callers and tests can check
//! what happened to the cache, log and store without the snapshot depending
//! on any of it.

use std::fmt;
use std::time::Duration;

use weather_core::{ObjectPath, PersistenceError, StorageError, WeatherSnapshot};

/// Which tier produced the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupSource {
    Cache,
    SecondChance,
    Origin,
}

impl LookupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::SecondChance => "second_chance",
            Self::Origin => "origin",
        }
    }
}

impl fmt::Display for LookupSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the second-chance tier could not answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondChanceMiss {
    /// The city has never been fetched.
    NoRecord,
    /// The latest record is older than the TTL.
    Stale { age: Duration },
    /// The event log could not be queried.
    LogUnavailable(StorageError),
    /// The latest record's timestamp does not parse.
    InvalidTimestamp { raw: String },
    /// The record is fresh but its object is missing or corrupt.
    ObjectUnreadable {
        path: ObjectPath,
        source: StorageError,
    },
}

impl SecondChanceMiss {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoRecord => "no_record",
            Self::Stale { .. } => "stale",
            Self::LogUnavailable(_) => "log_unavailable",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
            Self::ObjectUnreadable { .. } => "object_unreadable",
        }
    }
}

impl fmt::Display for SecondChanceMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRecord => write!(f, "no record"),
            Self::Stale { age } => write!(f, "stale ({}s old)", age.as_secs()),
            Self::LogUnavailable(e) => write!(f, "event log unavailable: {}", e),
            Self::InvalidTimestamp { raw } => write!(f, "invalid timestamp '{}'", raw),
            Self::ObjectUnreadable { path, source } => {
                write!(f, "object {} unreadable: {}", path, source)
            }
        }
    }
}

/// Result of each write-through step. `None` means the step was not
/// attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteThrough {
    pub object_store: Option<Result<ObjectPath, PersistenceError>>,
    pub event_log: Option<Result<(), PersistenceError>>,
    pub cache: Option<Result<(), PersistenceError>>,
}

impl WriteThrough {
    /// Every failed step, in write order.
    pub fn failures(&self) -> Vec<&PersistenceError> {
        let mut failures = Vec::new();
        if let Some(Err(e)) = &self.object_store {
            failures.push(e);
        }
        if let Some(Err(e)) = &self.event_log {
            failures.push(e);
        }
        if let Some(Err(e)) = &self.cache {
            failures.push(e);
        }
        failures
    }

    /// True when no attempted step failed.
    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }

    /// Stored path, if the object-store step ran and succeeded.
    pub fn stored_path(&self) -> Option<&ObjectPath> {
        self.object_store.as_ref().and_then(|r| r.as_ref().ok())
    }
}

/// What a lookup returned and what it did on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupOutcome {
    snapshot: WeatherSnapshot,
    source: LookupSource,
    second_chance: Option<SecondChanceMiss>,
    writes: WriteThrough,
}

impl LookupOutcome {
    pub(crate) fn from_cache(snapshot: WeatherSnapshot) -> Self {
        Self {
            snapshot,
            source: LookupSource::Cache,
            second_chance: None,
            writes: WriteThrough::default(),
        }
    }

    pub(crate) fn from_second_chance(
        snapshot: WeatherSnapshot,
        cache: Result<(), PersistenceError>,
    ) -> Self {
        Self {
            snapshot,
            source: LookupSource::SecondChance,
            second_chance: None,
            writes: WriteThrough {
                cache: Some(cache),
                ..WriteThrough::default()
            },
        }
    }

    pub(crate) fn from_origin(
        snapshot: WeatherSnapshot,
        miss: SecondChanceMiss,
        writes: WriteThrough,
    ) -> Self {
        Self {
            snapshot,
            source: LookupSource::Origin,
            second_chance: Some(miss),
            writes,
        }
    }

    pub fn snapshot(&self) -> &WeatherSnapshot {
        &self.snapshot
    }

    /// Consume the outcome and return the snapshot.
    pub fn into_snapshot(self) -> WeatherSnapshot {
        self.snapshot
    }

    pub fn source(&self) -> LookupSource {
        self.source
    }

    /// Why the second-chance tier fell through. Only set for origin lookups.
    pub fn second_chance_miss(&self) -> Option<&SecondChanceMiss> {
        self.second_chance.as_ref()
    }

    pub fn writes(&self) -> &WriteThrough {
        &self.writes
    }
}

impl AsRef<WeatherSnapshot> for LookupOutcome {
    fn as_ref(&self) -> &WeatherSnapshot {
        &self.snapshot
    }
}
