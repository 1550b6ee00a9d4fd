//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRef;
use weather_core::{LookupConfig, OriginClient};
use weather_storage::{
    EventLog, FastCache, FsObjectStore, InMemoryFastCache, LmdbFastCache, LookupOrchestrator,
    ObjectStore, SqliteEventLog,
};

use crate::config::{CacheBackend, ServiceConfig};
use crate::error::{ApiError, ApiResult};
use crate::origin::OpenWeatherClient;

/// Orchestrator over type-erased tiers, as wired by the binary.
pub type DynOrchestrator =
    LookupOrchestrator<dyn FastCache, dyn EventLog, dyn ObjectStore, dyn OriginClient>;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<DynOrchestrator>,
    /// Probed by the readiness endpoint.
    pub event_log: Arc<dyn EventLog>,
    /// Upper bound on a single `/weather` lookup.
    pub request_timeout: Duration,
    pub start_time: Instant,
}

macro_rules! impl_from_ref {
    ($ty:ty, $field:ident) => {
        impl FromRef<AppState> for $ty {
            fn from_ref(state: &AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}

impl_from_ref!(Arc<DynOrchestrator>, orchestrator);
impl_from_ref!(Arc<dyn EventLog>, event_log);
impl_from_ref!(Instant, start_time);

impl AppState {
    /// Wire state from already-built tiers.
    pub fn new(
        cache: Arc<dyn FastCache>,
        event_log: Arc<dyn EventLog>,
        object_store: Arc<dyn ObjectStore>,
        origin: Arc<dyn OriginClient>,
        lookup: LookupConfig,
        request_timeout: Duration,
    ) -> Self {
        let orchestrator = LookupOrchestrator::new(
            cache,
            Arc::clone(&event_log),
            object_store,
            origin,
            lookup,
        );
        Self {
            orchestrator: Arc::new(orchestrator),
            event_log,
            request_timeout,
            start_time: Instant::now(),
        }
    }

    /// Open every backing store named by `config` and build the origin client.
    ///
    /// The event log is connected eagerly so a broken database path fails
    /// startup instead of the first request.
    pub async fn from_config(config: ServiceConfig) -> ApiResult<Self> {
        let cache: Arc<dyn FastCache> = match config.cache_backend {
            CacheBackend::Memory => {
                Arc::new(InMemoryFastCache::with_prefix(config.cache_prefix.clone()))
            }
            CacheBackend::Lmdb => {
                let lmdb = LmdbFastCache::new(
                    &config.cache_path,
                    config.cache_max_size_mb,
                    config.cache_prefix.clone(),
                )
                .map_err(|e| ApiError::internal_error(format!("Failed to open LMDB cache: {}", e)))?;
                Arc::new(lmdb)
            }
        };

        if let Some(parent) = config.event_log_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ApiError::internal_error(format!(
                    "Failed to create event log directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let sqlite = SqliteEventLog::new(config.event_log_path.clone());
        sqlite.connect().await?;

        let store = FsObjectStore::new(config.object_store_dir.clone()).await?;

        let origin = OpenWeatherClient::from_config(config.provider).map_err(|e| {
            ApiError::internal_error(format!("Failed to build origin client: {}", e))
        })?;

        tracing::info!(
            cache = cache.backend_name(),
            event_log = %config.event_log_path.display(),
            object_store = %config.object_store_dir.display(),
            ttl_secs = config.lookup.ttl.as_secs(),
            "Storage tiers ready"
        );

        Ok(Self::new(
            cache,
            Arc::new(sqlite),
            Arc::new(store),
            Arc::new(origin),
            config.lookup,
            config.request_timeout,
        ))
    }
}
