//! REST API Routes Module
//!
//! - `GET /weather?city=` - weather lookup
//! - `/health/*` - Kubernetes-compatible probes
//! - `/metrics` - Prometheus scrape endpoint
//! - `/openapi.json` - generated API description

pub mod health;
pub mod weather;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use health::create_router as health_router;
pub use weather::create_router as weather_router;

/// Handler for /openapi.json endpoint.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// Build the full application router.
///
/// `cors_origins` empty means any origin may call the API.
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .merge(weather_router())
        .nest("/health", health_router())
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(observability_middleware))
                .layer(build_cors_layer(cors_origins)),
        )
}

fn build_cors_layer(cors_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?cors_origins, "CORS: restricting origins");
        let origins: Vec<HeaderValue> = cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}
