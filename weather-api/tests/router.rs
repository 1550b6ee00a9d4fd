//! Router-level tests: the full Axum app over instrumented in-memory tiers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;
use weather_api::routes::weather::SOURCE_HEADER;
use weather_api::{create_router, AppState};
use weather_core::{CityKey, OriginClient, OriginError, WeatherSnapshot};
use weather_storage::{InMemoryEventLog, InMemoryFastCache, InMemoryObjectStore, SqliteEventLog};
use weather_test_utils::{fixtures, MockOriginClient, TestStack};

const TIMEOUT: Duration = Duration::from_secs(5);

fn app_for(stack: &TestStack) -> Router {
    let state = AppState::new(
        stack.cache.clone(),
        stack.log.clone(),
        stack.store.clone(),
        stack.origin.clone(),
        fixtures::default_config(),
        TIMEOUT,
    );
    create_router(state, &[])
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Value) {
    let response = app
        .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
        .await
        .expect("infallible");
    let status = response.status();
    let source = response
        .headers()
        .get(SOURCE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, source, json)
}

// ============================================================================
// WEATHER
// ============================================================================

#[tokio::test]
async fn test_weather_miss_then_cache_hit() {
    let stack = TestStack::new(fixtures::default_config());
    let app = app_for(&stack);

    let (status, source, body) = get(app.clone(), "/weather?city=%20Warsaw%20").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(source.as_deref(), Some("origin"));
    assert_eq!(body["location_name"], "warsaw");
    assert_eq!(body["temperature_celsius"], "17 °C");
    assert_eq!(stack.origin.calls(), 1);
    assert_eq!(stack.store.stores(), 1);
    assert_eq!(stack.log.puts(), 1);

    stack.reset_counts();
    let (status, source, cached) = get(app, "/weather?city=WARSAW").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(source.as_deref(), Some("cache"));
    assert_eq!(cached, body);
    assert_eq!(stack.calls_beyond_cache(), 0);
}

#[tokio::test]
async fn test_weather_second_chance_after_cache_eviction() {
    let stack = TestStack::new(fixtures::default_config());
    let app = app_for(&stack);

    let (status, _, first) = get(app.clone(), "/weather?city=warsaw").await;
    assert_eq!(status, StatusCode::OK);

    stack.cache.evict_all();
    stack.reset_counts();

    let (status, source, second) = get(app, "/weather?city=warsaw").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(source.as_deref(), Some("second_chance"));
    assert_eq!(second, first);
    assert_eq!(stack.origin.calls(), 0);
    assert_eq!(stack.cache.sets(), 1);
}

#[tokio::test]
async fn test_weather_rejects_missing_or_blank_city() {
    let stack = TestStack::new(fixtures::default_config());

    for uri in ["/weather", "/weather?city=", "/weather?city=%20%20"] {
        let (status, _, body) = get(app_for(&stack), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["code"], "INVALID_INPUT");
    }
    assert_eq!(stack.cache.gets(), 0);
    assert_eq!(stack.origin.calls(), 0);
}

#[tokio::test]
async fn test_weather_unknown_city_is_404() {
    let origin = MockOriginClient::failing(OriginError::CityNotFound {
        city: "atlantis".to_string(),
    });
    let stack = TestStack::with_origin(fixtures::default_config(), origin);

    let (status, _, body) = get(app_for(&stack), "/weather?city=Atlantis").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CITY_NOT_FOUND");
    assert_eq!(stack.store.stores(), 0);
    assert_eq!(stack.cache.sets(), 0);
}

#[tokio::test]
async fn test_weather_provider_failure_is_502() {
    let origin = MockOriginClient::failing(OriginError::Status {
        status: 401,
        message: "Invalid API key".to_string(),
    });
    let stack = TestStack::with_origin(fixtures::default_config(), origin);

    let (status, _, body) = get(app_for(&stack), "/weather?city=warsaw").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "UPSTREAM_FAILURE");
    assert!(body["message"]
        .as_str()
        .is_some_and(|m| m.contains("Invalid API key")));
}

#[tokio::test]
async fn test_weather_survives_write_through_failures() {
    let stack = TestStack::new(fixtures::default_config());
    stack.store.fail_stores(true);
    stack.cache.fail_sets(true);

    let (status, source, body) = get(app_for(&stack), "/weather?city=warsaw").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(source.as_deref(), Some("origin"));
    assert_eq!(body["location_name"], "warsaw");
    // Store failed, so nothing was appended to the log.
    assert_eq!(stack.log.puts(), 0);
}

struct StalledOrigin;

#[async_trait]
impl OriginClient for StalledOrigin {
    async fn fetch(
        &self,
        city: &CityKey,
        requested_time: &str,
    ) -> Result<WeatherSnapshot, OriginError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(fixtures::sample_snapshot(city.as_str(), requested_time))
    }
}

#[tokio::test]
async fn test_weather_timeout_is_504() {
    let state = AppState::new(
        Arc::new(InMemoryFastCache::new()),
        Arc::new(InMemoryEventLog::new()),
        Arc::new(InMemoryObjectStore::new()),
        Arc::new(StalledOrigin),
        fixtures::default_config(),
        Duration::from_millis(50),
    );
    let app = create_router(state, &[]);

    let (status, _, body) = get(app, "/weather?city=warsaw").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], "TIMEOUT");
}

// ============================================================================
// HEALTH, METRICS, OPENAPI
// ============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let stack = TestStack::new(fixtures::default_config());
    let app = app_for(&stack);

    let response = app
        .clone()
        .oneshot(Request::get("/health/ping").body(Body::empty()).expect("request"))
        .await
        .expect("infallible");
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    assert_eq!(&body[..], b"pong");

    let (status, _, body) = get(app.clone(), "/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _, body) = get(app, "/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["event_log"]["component"], "event_log");
}

#[tokio::test]
async fn test_readiness_reports_broken_event_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = SqliteEventLog::new(dir.path().join("missing").join("events.sqlite3"));
    let state = AppState::new(
        Arc::new(InMemoryFastCache::new()),
        Arc::new(log),
        Arc::new(InMemoryObjectStore::new()),
        Arc::new(MockOriginClient::new()),
        fixtures::default_config(),
        TIMEOUT,
    );

    let (status, _, body) = get(create_router(state, &[]), "/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["details"]["event_log"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_metrics_endpoint_counts_lookups() {
    let stack = TestStack::new(fixtures::default_config());
    let app = app_for(&stack);
    let (status, _, _) = get(app.clone(), "/weather?city=krakow").await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).expect("request"))
        .await
        .expect("infallible");
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("weather_lookups_total{source=\"origin\"}"));
    assert!(text.contains("path=\"/weather\""));
}

#[tokio::test]
async fn test_openapi_json_served() {
    let stack = TestStack::new(fixtures::default_config());
    let (status, _, body) = get(app_for(&stack), "/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/weather"].is_object());
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let stack = TestStack::new(fixtures::default_config());
    let (status, _, _) = get(app_for(&stack), "/forecast").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
