//! Prometheus Metrics Definitions
//!
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use weather_core::{OriginError, WriteStep};
use weather_storage::LookupSource;

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<WeatherMetrics>> = Lazy::new(WeatherMetrics::new);

/// Run `f` against the global metrics, skipping it if registration failed.
pub fn with_metrics(f: impl FnOnce(&WeatherMetrics)) {
    match METRICS.as_ref() {
        Ok(metrics) => f(metrics),
        Err(e) => tracing::debug!(error = %e, "Metrics unavailable"),
    }
}

#[derive(Clone)]
pub struct WeatherMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Served lookups - labels: source (cache, second_chance, origin)
    pub lookups_total: CounterVec,

    /// Failed origin fetches - labels: kind
    pub origin_failures_total: CounterVec,

    /// Failed write-through steps - labels: step
    pub write_through_failures_total: CounterVec,
}

impl WeatherMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "weather_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_failed("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "weather_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_failed("http_request_duration_seconds", e))?,

            lookups_total: register_counter_vec!(
                "weather_lookups_total",
                "Weather lookups served, by tier",
                &["source"]
            )
            .map_err(|e| registration_failed("lookups_total", e))?,

            origin_failures_total: register_counter_vec!(
                "weather_origin_failures_total",
                "Failed origin provider fetches",
                &["kind"]
            )
            .map_err(|e| registration_failed("origin_failures_total", e))?,

            write_through_failures_total: register_counter_vec!(
                "weather_write_through_failures_total",
                "Write-through steps that failed after a successful fetch",
                &["step"]
            )
            .map_err(|e| registration_failed("write_through_failures_total", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_lookup(&self, source: LookupSource) {
        self.lookups_total
            .with_label_values(&[source.as_str()])
            .inc();
    }

    pub fn record_origin_failure(&self, error: &OriginError) {
        self.origin_failures_total
            .with_label_values(&[error.kind()])
            .inc();
    }

    pub fn record_write_through_failure(&self, step: WriteStep) {
        self.write_through_failures_total
            .with_label_values(&[step.as_str()])
            .inc();
    }
}

fn registration_failed(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    // Register the weather metrics even if nothing has been recorded yet.
    Lazy::force(&METRICS);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
