//! SQLite-backed event log.
//!
//! The connection and schema are created on first use, exactly once, behind
//! an async one-shot cell; concurrent first calls wait on the same
//! initialization. Call [`SqliteEventLog::connect`] at startup to pay that
//! cost (and surface a bad path) before serving traffic.
//!
//! All SQLite work runs on the blocking pool behind a mutex.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use weather_core::{
    CityKey, CompactTimestamp, EventRecord, HealthCheck, ObjectPath, StorageError, StorageTier,
};

use super::EventLog;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS weather_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        city TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        path TEXT NOT NULL,
        UNIQUE(city, timestamp)
    );

    CREATE INDEX IF NOT EXISTS idx_weather_events_ts ON weather_events(timestamp);
"#;

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

impl Location {
    fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Memory => ":memory:".to_string(),
        }
    }
}

fn unavailable(reason: impl Into<String>) -> StorageError {
    StorageError::Unavailable {
        tier: StorageTier::EventLog,
        reason: reason.into(),
    }
}

fn sql_error(e: rusqlite::Error) -> StorageError {
    unavailable(e.to_string())
}

fn open_connection(location: &Location) -> Result<Connection, StorageError> {
    let conn = match location {
        Location::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::Io {
                    path: parent.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
            Connection::open(path).map_err(sql_error)?
        }
        Location::Memory => Connection::open_in_memory().map_err(sql_error)?,
    };
    conn.execute_batch(SCHEMA).map_err(sql_error)?;
    Ok(conn)
}

/// Raw row, converted outside the rusqlite closure so a bad value surfaces as
/// a decode error rather than a SQL error.
type RawRow = (String, String, String);

fn to_record(row: RawRow) -> Result<EventRecord, StorageError> {
    let (city, timestamp, path) = row;
    let city = CityKey::parse(&city).map_err(|e| StorageError::Decode {
        path: "weather_events.city".to_string(),
        reason: e.to_string(),
    })?;
    Ok(EventRecord::new(
        city,
        CompactTimestamp::from_stored(timestamp),
        ObjectPath::new(path),
    ))
}

/// SQLite event log.
pub struct SqliteEventLog {
    location: Location,
    conn: OnceCell<Arc<Mutex<Connection>>>,
    initializations: AtomicUsize,
}

impl SqliteEventLog {
    /// Log stored in the database file at `path` (created if missing).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_location(Location::File(path.into()))
    }

    /// Log that lives only as long as this value.
    pub fn in_memory() -> Self {
        Self::with_location(Location::Memory)
    }

    fn with_location(location: Location) -> Self {
        Self {
            location,
            conn: OnceCell::new(),
            initializations: AtomicUsize::new(0),
        }
    }

    /// Database file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    /// Force initialization now instead of on first use.
    pub async fn connect(&self) -> Result<(), StorageError> {
        self.connection().await.map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.conn.initialized()
    }

    /// How many times the connection and schema were set up. Never above one.
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    async fn connection(&self) -> Result<Arc<Mutex<Connection>>, StorageError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let location = self.location.clone();
                let conn = tokio::task::spawn_blocking(move || open_connection(&location))
                    .await
                    .map_err(|e| unavailable(format!("initialization task failed: {}", e)))??;
                self.initializations.fetch_add(1, Ordering::SeqCst);
                info!(location = %self.location.describe(), "Event log initialized");
                Ok::<_, StorageError>(Arc::new(Mutex::new(conn)))
            })
            .await?;
        Ok(Arc::clone(conn))
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection().await?;
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StorageError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| unavailable(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn put(&self, record: &EventRecord) -> Result<(), StorageError> {
        let record = record.clone();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO weather_events (city, timestamp, path) VALUES (?1, ?2, ?3)",
                params![
                    record.city.as_str(),
                    record.timestamp.as_str(),
                    record.path.as_str()
                ],
            )
            .map_err(sql_error)?;
            debug!(city = %record.city, timestamp = %record.timestamp, "Event recorded");
            Ok(())
        })
        .await
    }

    async fn get_latest(&self, city: &CityKey) -> Result<Option<EventRecord>, StorageError> {
        let city = city.clone();
        self.with_connection(move |conn| {
            let row: Option<RawRow> = conn
                .query_row(
                    "SELECT city, timestamp, path FROM weather_events
                     WHERE city = ?1 ORDER BY timestamp DESC LIMIT 1",
                    params![city.as_str()],
                    |row| Ok::<RawRow, rusqlite::Error>((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .map_err(sql_error)?;
            row.map(to_record).transpose()
        })
        .await
    }

    async fn history(
        &self,
        city: &CityKey,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StorageError> {
        let city = city.clone();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_connection(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT city, timestamp, path FROM weather_events
                     WHERE city = ?1 ORDER BY timestamp DESC LIMIT ?2",
                )
                .map_err(sql_error)?;
            let rows = stmt
                .query_map(params![city.as_str(), limit], |row| {
                    Ok::<RawRow, rusqlite::Error>((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .map_err(sql_error)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(to_record(row.map_err(sql_error)?)?);
            }
            Ok(records)
        })
        .await
    }

    async fn health_check(&self) -> HealthCheck {
        let started = Instant::now();
        let probe = self
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM weather_events", [], |row| {
                    row.get::<_, i64>(0)
                })
                .map_err(sql_error)
            })
            .await;
        let elapsed = started.elapsed().as_millis() as i64;

        match probe {
            Ok(rows) => HealthCheck::healthy("event_log")
                .with_response_time(elapsed)
                .with_metadata("rows", serde_json::json!(rows)),
            Err(e) => HealthCheck::unhealthy("event_log", e.to_string()).with_response_time(elapsed),
        }
    }
}
