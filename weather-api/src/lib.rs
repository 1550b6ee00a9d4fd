//! Weather API - HTTP layer
//!
//! Exposes `GET /weather?city=` over Axum and wires the lookup orchestrator
//! to its production tiers: a fast cache (in-memory or LMDB), a SQLite event
//! log, a filesystem object store and the OpenWeatherMap origin client.

pub mod config;
pub mod convert;
pub mod error;
pub mod openapi;
pub mod origin;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::{CacheBackend, ProviderConfig, ServiceConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use openapi::ApiDoc;
pub use origin::OpenWeatherClient;
pub use routes::create_router;
pub use state::{AppState, DynOrchestrator};
