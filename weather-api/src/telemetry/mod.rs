//! Weather API Telemetry
//!
//! Structured logging through `tracing` and Prometheus metrics for the API
//! layer. Nothing here needs an external collector.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, with_metrics, WeatherMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracer, LogFormat, TelemetryConfig, DEFAULT_LOG_FILTER};
