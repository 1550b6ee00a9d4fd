//! OpenWeatherClient against a mock provider.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use weather_api::OpenWeatherClient;
use weather_core::{CityKey, OriginClient, OriginError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REQUESTED_TIME: &str = "2018-01-09 11:57:00";

fn client_for(server: &MockServer, timeout: Duration) -> OpenWeatherClient {
    OpenWeatherClient::new(
        format!("{}/data/2.5/weather?q={{city}}&appid={{api_key}}", server.uri()),
        SecretString::from("test-key".to_string()),
        timeout,
    )
    .expect("client builds")
}

fn warsaw_payload() -> serde_json::Value {
    json!({
        "coord": { "lon": 21.0118, "lat": 52.2298 },
        "weather": [{ "id": 802, "main": "Clouds" }],
        "main": { "temp": 290.15, "pressure": 1027, "humidity": 63 },
        "wind": { "speed": 3.6, "deg": 290 },
        "clouds": { "all": 40 },
        "sys": { "country": "PL", "sunrise": 1_515_474_420, "sunset": 1_515_513_600 },
        "timezone": 3600,
        "name": "Warsaw",
        "cod": 200
    })
}

fn city(name: &str) -> CityKey {
    CityKey::parse(name).expect("valid city")
}

#[tokio::test]
async fn test_fetch_maps_provider_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "warsaw"))
        .and(query_param("appid", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(warsaw_payload()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let snapshot = client
        .fetch(&city("Warsaw"), REQUESTED_TIME)
        .await
        .expect("fetch succeeds");

    assert_eq!(snapshot.location_name, "warsaw");
    assert_eq!(snapshot.temperature_celsius, "17 °C");
    assert_eq!(snapshot.wind, "Gentle breeze, 3.6 m/s, west-northwest");
    assert_eq!(snapshot.cloudiness, "Scattered clouds");
    assert_eq!(snapshot.pressure, "1027 hpa");
    assert_eq!(snapshot.sunrise, "06:07");
    assert_eq!(snapshot.requested_time, REQUESTED_TIME);
}

#[tokio::test]
async fn test_fetch_encodes_city_with_spaces() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", "são paulo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(warsaw_payload()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    assert!(client.fetch(&city("São Paulo"), REQUESTED_TIME).await.is_ok());
}

#[tokio::test]
async fn test_provider_404_is_city_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"cod": "404", "message": "city not found"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let err = client
        .fetch(&city("atlantis"), REQUESTED_TIME)
        .await
        .expect_err("unknown city");
    assert_eq!(
        err,
        OriginError::CityNotFound {
            city: "atlantis".to_string()
        }
    );
}

#[tokio::test]
async fn test_provider_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"cod": 401, "message": "Invalid API key"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let err = client
        .fetch(&city("warsaw"), REQUESTED_TIME)
        .await
        .expect_err("unauthorized");
    assert_eq!(
        err,
        OriginError::Status {
            status: 401,
            message: "Invalid API key".to_string()
        }
    );
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"main": {"temp": 290.0}})))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let err = client
        .fetch(&city("warsaw"), REQUESTED_TIME)
        .await
        .expect_err("missing fields");
    assert!(matches!(err, OriginError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_slow_provider_is_request_error_without_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(warsaw_payload())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_millis(100));
    let err = client
        .fetch(&city("warsaw"), REQUESTED_TIME)
        .await
        .expect_err("times out");
    match err {
        OriginError::Request { reason } => assert!(!reason.contains("test-key"), "{}", reason),
        other => panic!("expected a request error, got {:?}", other),
    }
}
