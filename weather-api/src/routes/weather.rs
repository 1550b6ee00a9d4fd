//! Weather lookup endpoint.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use weather_core::{CityKey, WeatherSnapshot};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::telemetry::with_metrics;

/// Response header naming the tier that served the snapshot.
pub const SOURCE_HEADER: &str = "x-weather-source";

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
pub struct WeatherQuery {
    /// City name; case and surrounding whitespace are ignored.
    #[cfg_attr(feature = "openapi", param(example = "Warsaw"))]
    pub city: Option<String>,
}

/// GET /weather - Current weather for a city
#[utoipa::path(
    get,
    path = "/weather",
    tag = "Weather",
    params(WeatherQuery),
    responses(
        (status = 200, description = "Weather snapshot", body = WeatherSnapshot),
        (status = 400, description = "Missing or blank city", body = ApiError),
        (status = 404, description = "Provider does not know the city", body = ApiError),
        (status = 502, description = "Provider request failed", body = ApiError),
        (status = 504, description = "Lookup timed out", body = ApiError),
    ),
)]
pub async fn get_weather(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> ApiResult<([(&'static str, &'static str); 1], Json<WeatherSnapshot>)> {
    let city = CityKey::parse(query.city.as_deref().unwrap_or_default())?;

    let lookup = state.orchestrator.lookup(&city, Utc::now());
    let outcome = match tokio::time::timeout(state.request_timeout, lookup).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            with_metrics(|m| m.record_origin_failure(&e));
            return Err(e.into());
        }
        Err(_) => {
            tracing::warn!(
                city = %city,
                timeout_secs = state.request_timeout.as_secs(),
                "Weather lookup timed out"
            );
            return Err(ApiError::timeout(format!(
                "Lookup for '{}' did not finish within {}s",
                city,
                state.request_timeout.as_secs()
            )));
        }
    };

    let source = outcome.source();
    with_metrics(|m| {
        m.record_lookup(source);
        for failure in outcome.writes().failures() {
            m.record_write_through_failure(failure.step);
        }
    });

    Ok(([(SOURCE_HEADER, source.as_str())], Json(outcome.into_snapshot())))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/weather", get(get_weather))
}
