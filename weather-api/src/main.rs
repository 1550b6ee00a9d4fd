//! Weather API Server Entry Point
//!
//! Reads configuration from the environment, opens the storage tiers and
//! starts the Axum HTTP server.

use weather_api::telemetry::{init_tracer, TelemetryConfig};
use weather_api::{create_router, ApiError, ApiResult, AppState, ServiceConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracer(&TelemetryConfig::default())?;

    let config = ServiceConfig::from_env()?;
    let addr = config.bind_addr;
    let cors_origins = config.cors_origins.clone();

    let state = AppState::from_config(config).await?;
    let app = create_router(state, &cors_origins);

    tracing::info!(%addr, "Starting weather API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
