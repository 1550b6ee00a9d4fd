//! Axum middleware for HTTP request tracing and metrics.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::metrics::with_metrics;

/// Label used for requests that matched no route.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Route template for metrics and spans.
///
/// Uses the matched route rather than the raw URI so query strings and
/// unknown paths cannot blow up label cardinality.
fn route_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}

/// Wraps every request in an `http_request` span and records its latency
/// and status in Prometheus.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = route_label(&request);

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
        http.route = %route,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();
    with_metrics(|m| {
        m.record_http_request(method.as_str(), &route, status.as_u16(), duration.as_secs_f64())
    });

    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_route_label_without_match() {
        let request = Request::builder()
            .uri("/nowhere?city=warsaw")
            .body(Body::empty())
            .expect("request");
        assert_eq!(route_label(&request), UNMATCHED_ROUTE);
    }
}
