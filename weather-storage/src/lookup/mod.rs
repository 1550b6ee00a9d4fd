//! Tiered lookup with write-through.
//!
//! ```text
//! lookup(city, now)
//!   ├─ FastCache.get ─────────────────────────────── hit → return
//!   ├─ EventLog.get_latest → age ≤ ttl → ObjectStore.read
//!   │                                     └─ ok → FastCache.set → return
//!   └─ OriginClient.fetch ── err → propagate
//!        └─ ObjectStore.store → EventLog.put → FastCache.set → return
//! ```
//!
//! Only [`OriginError`] leaves this module. Every storage failure is logged,
//! recorded in the [`LookupOutcome`], and otherwise ignored.

pub mod outcome;

pub use outcome::{LookupOutcome, LookupSource, SecondChanceMiss, WriteThrough};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use weather_core::{
    requested_time_label, CityKey, CompactTimestamp, EventRecord, LookupConfig, OriginClient,
    OriginError, PersistenceError, Timestamp, WeatherSnapshot, WriteStep,
};

use crate::cache::FastCache;
use crate::event_log::EventLog;
use crate::object_store::ObjectStore;

/// Cache → second chance → origin orchestration.
///
/// Collaborators are shared behind `Arc` and may be trait objects. There is
/// no locking and no deduplication: concurrent misses for the same city each
/// reach the origin, and each write is idempotent per `(city, timestamp)`.
pub struct LookupOrchestrator<C, L, S, O>
where
    C: FastCache + ?Sized,
    L: EventLog + ?Sized,
    S: ObjectStore + ?Sized,
    O: OriginClient + ?Sized,
{
    cache: Arc<C>,
    log: Arc<L>,
    store: Arc<S>,
    origin: Arc<O>,
    config: LookupConfig,
}

impl<C, L, S, O> LookupOrchestrator<C, L, S, O>
where
    C: FastCache + ?Sized,
    L: EventLog + ?Sized,
    S: ObjectStore + ?Sized,
    O: OriginClient + ?Sized,
{
    pub fn new(
        cache: Arc<C>,
        log: Arc<L>,
        store: Arc<S>,
        origin: Arc<O>,
        config: LookupConfig,
    ) -> Self {
        Self {
            cache,
            log,
            store,
            origin,
            config,
        }
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn event_log(&self) -> &L {
        &self.log
    }

    pub fn object_store(&self) -> &S {
        &self.store
    }

    /// Resolve a snapshot for `city` as of `now`.
    ///
    /// Fails only when every tier misses and the origin fetch fails.
    pub async fn lookup(
        &self,
        city: &CityKey,
        now: Timestamp,
    ) -> Result<LookupOutcome, OriginError> {
        if let Some(snapshot) = self.cache.get(city).await {
            info!(city = %city, source = "cache", "Weather served from fast cache");
            return Ok(LookupOutcome::from_cache(snapshot));
        }

        let miss = match self.second_chance(city, now).await {
            Ok((snapshot, age)) => {
                let ttl = self.config.recache_ttl_for_age(age);
                let cached = self.populate_cache(city, ttl, &snapshot).await;
                info!(
                    city = %city,
                    source = "second_chance",
                    age_secs = age.as_secs(),
                    "Weather served from event log"
                );
                return Ok(LookupOutcome::from_second_chance(snapshot, cached));
            }
            Err(miss) => miss,
        };
        debug!(city = %city, reason = %miss, "No second chance");

        let snapshot = match self.origin.fetch(city, &requested_time_label(now)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(
                    city = %city,
                    provider = self.origin.provider_name(),
                    kind = e.kind(),
                    error = %e,
                    "Origin fetch failed"
                );
                return Err(e);
            }
        };

        let writes = self
            .write_through(city, CompactTimestamp::from_datetime(now), &snapshot)
            .await;
        info!(
            city = %city,
            source = "origin",
            clean = writes.is_clean(),
            "Weather fetched from origin"
        );
        Ok(LookupOutcome::from_origin(snapshot, miss, writes))
    }

    /// Latest stored snapshot for `city` and its age, if still fresh.
    ///
    /// The boundary is inclusive: a record exactly `ttl` old is fresh.
    async fn second_chance(
        &self,
        city: &CityKey,
        now: Timestamp,
    ) -> Result<(WeatherSnapshot, Duration), SecondChanceMiss> {
        let record = match self.log.get_latest(city).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(SecondChanceMiss::NoRecord),
            Err(e) => {
                warn!(city = %city, tier = "event_log", error = %e, "Event log lookup failed");
                return Err(SecondChanceMiss::LogUnavailable(e));
            }
        };

        let fetched_at = record.timestamp.to_datetime().map_err(|e| {
            warn!(city = %city, tier = "event_log", error = %e, "Unparseable event timestamp");
            SecondChanceMiss::InvalidTimestamp {
                raw: record.timestamp.to_string(),
            }
        })?;

        // A record from the future (clock skew) counts as brand new.
        let age = (now - fetched_at).to_std().unwrap_or(Duration::ZERO);
        if age > self.config.ttl {
            return Err(SecondChanceMiss::Stale { age });
        }

        match self.store.read(&record.path).await {
            Ok(snapshot) => Ok((snapshot, age)),
            Err(e) => {
                warn!(
                    city = %city,
                    tier = "object_store",
                    path = %record.path,
                    error = %e,
                    "Stored snapshot unreadable"
                );
                Err(SecondChanceMiss::ObjectUnreadable {
                    path: record.path,
                    source: e,
                })
            }
        }
    }

    /// Store object → append log → populate cache.
    ///
    /// The log append is skipped when the store fails, so a log entry never
    /// points at a missing object. The cache is populated either way.
    async fn write_through(
        &self,
        city: &CityKey,
        timestamp: CompactTimestamp,
        snapshot: &WeatherSnapshot,
    ) -> WriteThrough {
        let stored = self
            .store
            .store(city, &timestamp, snapshot)
            .await
            .map_err(|e| persistence_failure(city, WriteStep::StoreObject, e));

        let logged = match &stored {
            Ok(path) => Some(
                self.log
                    .put(&EventRecord::new(city.clone(), timestamp, path.clone()))
                    .await
                    .map_err(|e| persistence_failure(city, WriteStep::AppendLog, e)),
            ),
            Err(_) => None,
        };

        let cached = self.populate_cache(city, self.config.ttl, snapshot).await;

        WriteThrough {
            object_store: Some(stored),
            event_log: logged,
            cache: Some(cached),
        }
    }

    async fn populate_cache(
        &self,
        city: &CityKey,
        ttl: Duration,
        snapshot: &WeatherSnapshot,
    ) -> Result<(), PersistenceError> {
        self.cache
            .set(city, ttl, snapshot)
            .await
            .map_err(|e| persistence_failure(city, WriteStep::PopulateCache, e))
    }
}

fn persistence_failure(
    city: &CityKey,
    step: WriteStep,
    source: weather_core::StorageError,
) -> PersistenceError {
    warn!(city = %city, step = %step, error = %source, "Write-through step failed");
    PersistenceError::new(step, source)
}

impl<C, L, S, O> Clone for LookupOrchestrator<C, L, S, O>
where
    C: FastCache + ?Sized,
    L: EventLog + ?Sized,
    S: ObjectStore + ?Sized,
    O: OriginClient + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            log: Arc::clone(&self.log),
            store: Arc::clone(&self.store),
            origin: Arc::clone(&self.origin),
            config: self.config.clone(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryEventLog, InMemoryFastCache, InMemoryObjectStore};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use weather_core::RecacheTtl;

    struct FixedOrigin {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FixedOrigin {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl OriginClient for FixedOrigin {
        async fn fetch(
            &self,
            city: &CityKey,
            requested_time: &str,
        ) -> Result<WeatherSnapshot, OriginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(OriginError::Request {
                    reason: "connection refused".to_string(),
                });
            }
            Ok(WeatherSnapshot {
                location_name: city.to_string(),
                temperature_celsius: "17 °C".to_string(),
                temperature_fahrenheit: "63 °F".to_string(),
                wind: "Calm, 0.1 m/s".to_string(),
                cloudiness: "Clear sky".to_string(),
                pressure: "1027 hpa".to_string(),
                humidity: "63%".to_string(),
                sunrise: "06:07".to_string(),
                sunset: "18:00".to_string(),
                geo_coordinates: "[52.23, 21.01]".to_string(),
                requested_time: requested_time.to_string(),
                forecast: String::new(),
            })
        }
    }

    type Orchestrator =
        LookupOrchestrator<InMemoryFastCache, InMemoryEventLog, InMemoryObjectStore, FixedOrigin>;

    fn build(config: LookupConfig, fail: bool) -> Orchestrator {
        LookupOrchestrator::new(
            Arc::new(InMemoryFastCache::new()),
            Arc::new(InMemoryEventLog::new()),
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(FixedOrigin::new(fail)),
            config,
        )
    }

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_515_499_020 + secs, 0)
            .single()
            .expect("valid instant")
    }

    fn warsaw() -> CityKey {
        CityKey::parse("warsaw").expect("valid city")
    }

    #[tokio::test]
    async fn test_origin_then_cache() {
        let orchestrator = build(LookupConfig::default(), false);

        let first = orchestrator.lookup(&warsaw(), at(0)).await.expect("lookup");
        assert_eq!(first.source(), LookupSource::Origin);
        assert_eq!(first.second_chance_miss(), Some(&SecondChanceMiss::NoRecord));
        assert!(first.writes().is_clean());
        assert_eq!(first.snapshot().requested_time, "2018-01-09 11:57:00");

        let second = orchestrator.lookup(&warsaw(), at(1)).await.expect("lookup");
        assert_eq!(second.source(), LookupSource::Cache);
        assert_eq!(second.snapshot(), first.snapshot());
        assert_eq!(orchestrator.origin.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_chance_after_eviction() {
        let orchestrator = build(LookupConfig::default(), false);
        let first = orchestrator.lookup(&warsaw(), at(0)).await.expect("lookup");

        orchestrator.cache().clear();
        let again = orchestrator.lookup(&warsaw(), at(120)).await.expect("lookup");
        assert_eq!(again.source(), LookupSource::SecondChance);
        assert_eq!(again.snapshot(), first.snapshot());
        assert_eq!(again.writes().cache, Some(Ok(())));
        assert_eq!(orchestrator.origin.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_record_goes_to_origin() {
        let orchestrator = build(LookupConfig::default(), false);
        orchestrator.lookup(&warsaw(), at(0)).await.expect("lookup");
        orchestrator.cache().clear();

        let outcome = orchestrator.lookup(&warsaw(), at(301)).await.expect("lookup");
        assert_eq!(outcome.source(), LookupSource::Origin);
        assert_eq!(
            outcome.second_chance_miss(),
            Some(&SecondChanceMiss::Stale {
                age: Duration::from_secs(301)
            })
        );
    }

    #[tokio::test]
    async fn test_origin_failure_propagates() {
        let orchestrator = build(LookupConfig::default(), true);
        let err = orchestrator.lookup(&warsaw(), at(0)).await.unwrap_err();
        assert_eq!(err.kind(), "request");
        assert!(orchestrator.cache().is_empty());
        assert!(orchestrator.event_log().is_empty().expect("len"));
        assert!(orchestrator.object_store().is_empty());
    }

    #[tokio::test]
    async fn test_recache_policy_applies_to_second_chance() {
        let config = LookupConfig::new(Duration::from_secs(300)).with_recache_ttl(RecacheTtl::Full);
        let orchestrator = build(config, false);
        orchestrator.lookup(&warsaw(), at(0)).await.expect("lookup");
        orchestrator.cache().clear();

        let outcome = orchestrator.lookup(&warsaw(), at(299)).await.expect("lookup");
        assert_eq!(outcome.source(), LookupSource::SecondChance);
        assert_eq!(orchestrator.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_clone_shares_collaborators() {
        let orchestrator = build(LookupConfig::default(), false);
        let clone = orchestrator.clone();
        orchestrator.lookup(&warsaw(), at(0)).await.expect("lookup");
        let outcome = clone.lookup(&warsaw(), at(1)).await.expect("lookup");
        assert_eq!(outcome.source(), LookupSource::Cache);
    }
}
