//! Weather Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Instrumented tier doubles with call counters and failure injection
//! - A scripted origin client
//! - Proptest generators for keys, timestamps and snapshots
//! - Fixtures and assertions for lookup outcomes

pub use weather_core::{
    CityKey, CompactTimestamp, EventRecord, LookupConfig, ObjectPath, OriginClient, OriginError,
    RecacheTtl, StorageError, StorageTier, Timestamp, WeatherSnapshot, WriteStep,
};
pub use weather_storage::{
    CacheStats, EventLog, FastCache, InMemoryEventLog, InMemoryFastCache, InMemoryObjectStore,
    LookupOrchestrator, LookupOutcome, LookupSource, ObjectStore, SecondChanceMiss,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

fn injected(tier: StorageTier) -> StorageError {
    StorageError::Unavailable {
        tier,
        reason: "injected failure".to_string(),
    }
}

// ============================================================================
// INSTRUMENTED TIERS
// ============================================================================

/// Fast cache wrapper that counts calls and can be told to fail.
///
/// A failing `get` behaves like a backend outage: it returns `None`.
#[derive(Debug, Default)]
pub struct InstrumentedCache<C: FastCache = InMemoryFastCache> {
    inner: C,
    gets: AtomicUsize,
    sets: AtomicUsize,
    fail_gets: AtomicBool,
    fail_sets: AtomicBool,
}

impl<C: FastCache> InstrumentedCache<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            fail_gets: AtomicBool::new(false),
            fail_sets: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }

    pub fn reset_counts(&self) {
        self.gets.store(0, Ordering::SeqCst);
        self.sets.store(0, Ordering::SeqCst);
    }
}

impl InstrumentedCache<InMemoryFastCache> {
    /// Simulate an eviction of everything.
    pub fn evict_all(&self) {
        self.inner.clear();
    }
}

#[async_trait]
impl<C: FastCache> FastCache for InstrumentedCache<C> {
    async fn get(&self, city: &CityKey) -> Option<WeatherSnapshot> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return None;
        }
        self.inner.get(city).await
    }

    async fn set(
        &self,
        city: &CityKey,
        ttl: Duration,
        snapshot: &WeatherSnapshot,
    ) -> Result<(), StorageError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(injected(StorageTier::Cache));
        }
        self.inner.set(city, ttl, snapshot).await
    }

    async fn stats(&self) -> CacheStats {
        self.inner.stats().await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

/// Event log wrapper that counts calls and can be told to fail.
#[derive(Debug, Default)]
pub struct InstrumentedEventLog<L: EventLog = InMemoryEventLog> {
    inner: L,
    puts: AtomicUsize,
    reads: AtomicUsize,
    fail_puts: AtomicBool,
    fail_reads: AtomicBool,
}

impl<L: EventLog> InstrumentedEventLog<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            puts: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            fail_puts: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Calls to `get_latest` and `history`.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn reset_counts(&self) {
        self.puts.store(0, Ordering::SeqCst);
        self.reads.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl<L: EventLog> EventLog for InstrumentedEventLog<L> {
    async fn put(&self, record: &EventRecord) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(injected(StorageTier::EventLog));
        }
        self.inner.put(record).await
    }

    async fn get_latest(&self, city: &CityKey) -> Result<Option<EventRecord>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected(StorageTier::EventLog));
        }
        self.inner.get_latest(city).await
    }

    async fn history(
        &self,
        city: &CityKey,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected(StorageTier::EventLog));
        }
        self.inner.history(city, limit).await
    }
}

/// Object store wrapper that counts calls and can be told to fail.
#[derive(Debug, Default)]
pub struct InstrumentedObjectStore<S: ObjectStore = InMemoryObjectStore> {
    inner: S,
    stores: AtomicUsize,
    reads: AtomicUsize,
    fail_stores: AtomicBool,
    fail_reads: AtomicBool,
}

impl<S: ObjectStore> InstrumentedObjectStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            stores: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            fail_stores: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_stores(&self, fail: bool) {
        self.fail_stores.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn reset_counts(&self) {
        self.stores.store(0, Ordering::SeqCst);
        self.reads.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for InstrumentedObjectStore<S> {
    async fn store(
        &self,
        city: &CityKey,
        timestamp: &CompactTimestamp,
        snapshot: &WeatherSnapshot,
    ) -> Result<ObjectPath, StorageError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        if self.fail_stores.load(Ordering::SeqCst) {
            return Err(injected(StorageTier::ObjectStore));
        }
        self.inner.store(city, timestamp, snapshot).await
    }

    async fn read(&self, path: &ObjectPath) -> Result<WeatherSnapshot, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::NotFound {
                path: path.to_string(),
            });
        }
        self.inner.read(path).await
    }
}

// ============================================================================
// MOCK ORIGIN
// ============================================================================

/// Scripted origin client.
///
/// Answers with [`fixtures::sample_snapshot`] for the requested city unless a
/// failure has been set.
#[derive(Debug, Default)]
pub struct MockOriginClient {
    calls: AtomicUsize,
    failure: Mutex<Option<OriginError>>,
    requested: Mutex<Vec<(CityKey, String)>>,
    gate: Option<Barrier>,
}

impl MockOriginClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Origin that fails every call with `error`.
    pub fn failing(error: OriginError) -> Self {
        let origin = Self::default();
        origin.set_failure(Some(error));
        origin
    }

    /// Origin whose fetches block until `parties` of them are in flight.
    ///
    /// Every caller is then known to have missed the cache before any of
    /// them writes through.
    pub fn gated(parties: usize) -> Self {
        Self {
            gate: Some(Barrier::new(parties)),
            ..Self::default()
        }
    }

    pub fn set_failure(&self, error: Option<OriginError>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = error;
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every `(city, requested_time)` seen, in call order.
    pub fn requests(&self) -> Vec<(CityKey, String)> {
        self.requested
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn reset_counts(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl OriginClient for MockOriginClient {
    async fn fetch(
        &self,
        city: &CityKey,
        requested_time: &str,
    ) -> Result<WeatherSnapshot, OriginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requested) = self.requested.lock() {
            requested.push((city.clone(), requested_time.to_string()));
        }
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        let failure = self.failure.lock().ok().and_then(|f| f.clone());
        match failure {
            Some(error) => Err(error),
            None => Ok(fixtures::sample_snapshot(city.as_str(), requested_time)),
        }
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ============================================================================
// TEST STACK
// ============================================================================

/// Orchestrator wired to instrumented in-memory tiers.
pub type InstrumentedOrchestrator = LookupOrchestrator<
    InstrumentedCache,
    InstrumentedEventLog,
    InstrumentedObjectStore,
    MockOriginClient,
>;

/// An orchestrator plus handles on each of its collaborators.
pub struct TestStack {
    pub cache: Arc<InstrumentedCache>,
    pub log: Arc<InstrumentedEventLog>,
    pub store: Arc<InstrumentedObjectStore>,
    pub origin: Arc<MockOriginClient>,
    pub orchestrator: InstrumentedOrchestrator,
}

impl TestStack {
    pub fn new(config: LookupConfig) -> Self {
        Self::with_origin(config, MockOriginClient::new())
    }

    pub fn with_origin(config: LookupConfig, origin: MockOriginClient) -> Self {
        let cache = Arc::new(InstrumentedCache::new(InMemoryFastCache::new()));
        let log = Arc::new(InstrumentedEventLog::new(InMemoryEventLog::new()));
        let store = Arc::new(InstrumentedObjectStore::new(InMemoryObjectStore::new()));
        let origin = Arc::new(origin);
        let orchestrator = LookupOrchestrator::new(
            Arc::clone(&cache),
            Arc::clone(&log),
            Arc::clone(&store),
            Arc::clone(&origin),
            config,
        );
        Self {
            cache,
            log,
            store,
            origin,
            orchestrator,
        }
    }

    /// Zero every counter without touching stored data.
    pub fn reset_counts(&self) {
        self.cache.reset_counts();
        self.log.reset_counts();
        self.store.reset_counts();
        self.origin.reset_counts();
    }

    /// Calls made past the cache: log reads and writes, store reads and
    /// writes, origin fetches.
    pub fn calls_beyond_cache(&self) -> usize {
        self.log.puts()
            + self.log.reads()
            + self.store.stores()
            + self.store.reads()
            + self.origin.calls()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for weather lookup types.

    use super::*;
    use proptest::prelude::*;

    /// A normalized, non-blank city key.
    pub fn arb_city_key() -> impl Strategy<Value = CityKey> {
        "[a-z][a-z -]{0,23}".prop_filter_map("blank city", |raw| CityKey::parse(&raw).ok())
    }

    /// Raw user input: mixed case with surrounding whitespace.
    pub fn arb_raw_city() -> impl Strategy<Value = String> {
        (" {0,3}", "[A-Za-z][A-Za-z ]{0,15}", " {0,3}")
            .prop_map(|(lead, name, trail)| format!("{}{}{}", lead, name, trail))
    }

    /// A whole-second instant between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_577_836_800i64..1_893_456_000i64).prop_filter_map("out of range", |secs| {
            chrono::DateTime::from_timestamp(secs, 0)
        })
    }

    pub fn arb_compact_timestamp() -> impl Strategy<Value = CompactTimestamp> {
        arb_timestamp().prop_map(CompactTimestamp::from_datetime)
    }

    pub fn arb_snapshot() -> impl Strategy<Value = WeatherSnapshot> {
        (
            arb_city_key(),
            -60i32..60,
            0u32..100,
            900u32..1100,
            arb_timestamp(),
        )
            .prop_map(|(city, celsius, humidity, pressure, at)| {
                let mut snapshot = fixtures::sample_snapshot(
                    city.as_str(),
                    &weather_core::requested_time_label(at),
                );
                snapshot.temperature_celsius = format!("{} °C", celsius);
                snapshot.humidity = format!("{}%", humidity);
                snapshot.pressure = format!("{} hpa", pressure);
                snapshot
            })
    }

    /// Record age in whole seconds, clustered around a 300 s TTL.
    pub fn arb_age_secs() -> impl Strategy<Value = i64> {
        prop_oneof![0i64..600, 295i64..305]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;
    use chrono::TimeZone;

    /// 2018-01-09 11:57:00 UTC, the reference instant used across tests.
    pub const BASE_EPOCH_SECS: i64 = 1_515_499_020;

    /// Reference instant shifted by `offset_secs`.
    pub fn at(offset_secs: i64) -> Timestamp {
        chrono::Utc
            .timestamp_opt(BASE_EPOCH_SECS + offset_secs, 0)
            .single()
            .unwrap_or_else(chrono::Utc::now)
    }

    #[track_caller]
    pub fn city(name: &str) -> CityKey {
        match CityKey::parse(name) {
            Ok(key) => key,
            Err(e) => panic!("invalid fixture city {:?}: {}", name, e),
        }
    }

    pub fn warsaw() -> CityKey {
        city("warsaw")
    }

    /// A fully populated snapshot for `location`.
    pub fn sample_snapshot(location: &str, requested_time: &str) -> WeatherSnapshot {
        WeatherSnapshot {
            location_name: location.to_string(),
            temperature_celsius: "17 °C".to_string(),
            temperature_fahrenheit: "63 °F".to_string(),
            wind: "Gentle breeze, 3.6 m/s, west-northwest".to_string(),
            cloudiness: "Scattered clouds".to_string(),
            pressure: "1027 hpa".to_string(),
            humidity: "63%".to_string(),
            sunrise: "06:07".to_string(),
            sunset: "18:00".to_string(),
            geo_coordinates: "[52.23, 21.01]".to_string(),
            requested_time: requested_time.to_string(),
            forecast: String::new(),
        }
    }

    /// Default 300 s TTL with remaining-window re-caching.
    pub fn default_config() -> LookupConfig {
        LookupConfig::default()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over lookup outcomes.

    use super::*;

    #[track_caller]
    pub fn assert_source(outcome: &LookupOutcome, expected: LookupSource) {
        assert_eq!(
            outcome.source(),
            expected,
            "Expected lookup from {}, got {}",
            expected,
            outcome.source()
        );
    }

    /// Assert that every attempted write-through step succeeded.
    #[track_caller]
    pub fn assert_clean_writes(outcome: &LookupOutcome) {
        let failures = outcome.writes().failures();
        assert!(failures.is_empty(), "Expected clean writes, got: {:?}", failures);
    }

    /// Assert that `step` is among the failed write-through steps.
    #[track_caller]
    pub fn assert_step_failed(outcome: &LookupOutcome, step: WriteStep) {
        let failures = outcome.writes().failures();
        assert!(
            failures.iter().any(|f| f.step == step),
            "Expected {} to fail, failures were: {:?}",
            step,
            failures
        );
    }

    #[track_caller]
    pub fn assert_second_chance_miss(outcome: &LookupOutcome, expected: &str) {
        match outcome.second_chance_miss() {
            Some(miss) => assert_eq!(miss.as_str(), expected, "Unexpected miss: {}", miss),
            None => panic!("Expected a second-chance miss of kind {}, got none", expected),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
