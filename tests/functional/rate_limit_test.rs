//! Functional tests for rate limiting

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use service_gateway::middleware::rate_limit::RateLimitLayer;
use tower::ServiceExt;

async fn create_test_app(rps: u32, burst: u32) -> Router {
    Router::new()
        .route("/test", axum::routing::get(|| async { "OK" }))
        .route("/health", axum::routing::get(|| async { "healthy" }))
        .route("/registry", axum::routing::get(|| async { "registry" }))
        .layer(RateLimitLayer::new(rps, burst))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_rate_limit_allows_within_limit() {
    let app = create_test_app(100, 100).await;

    let response = app.oneshot(get("/test")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_health_bypass() {
    let app = create_test_app(1, 1).await;

    for _ in 0..5 {
        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_rate_limit_registry_bypass() {
    let app = create_test_app(1, 1).await;

    for _ in 0..5 {
        let response = app.clone().oneshot(get("/registry")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_rate_limit_exceeded() {
    let app = create_test_app(1, 1).await;

    // First request should succeed
    let response = app.clone().oneshot(get("/test")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Rapid subsequent requests should eventually be rate limited
    let mut limited = None;
    for _ in 0..10 {
        let response = app.clone().oneshot(get("/test")).await.unwrap();
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            limited = Some(response);
            break;
        }
    }

    let response = limited.expect("Expected rate limiting to kick in");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "rate_limit_exceeded");
    assert_eq!(body["service"], "api-gateway");
}

#[tokio::test]
async fn test_rate_limit_burst_capacity() {
    let app = create_test_app(1, 5).await;

    // All 5 burst requests should succeed
    for _ in 0..5 {
        let response = app.clone().oneshot(get("/test")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
