//! OpenAPI document for the weather API, generated by utoipa from the route
//! annotations.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::{health, weather};
use crate::telemetry::metrics;

use weather_core::{HealthCheck, HealthStatus, WeatherSnapshot};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Weather API",
        description = "Current weather by city, served from a fast cache, a recent stored snapshot, or the upstream provider.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Weather", description = "Weather lookups"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics"),
    ),
    paths(
        weather::get_weather,
        health::ping,
        health::liveness,
        health::readiness,
        metrics::metrics_handler,
    ),
    components(
        schemas(
            ApiError, ErrorCode,
            WeatherSnapshot,
            health::HealthResponse, health::HealthDetails, HealthCheck, HealthStatus,
        )
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
