//! Functional tests for the dashboard and search aggregates

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use service_gateway::{
    api::routes::create_router,
    backend::HttpUpstream,
    config::Settings,
    registry::{MemoryRegistry, Registration, ServiceRegistry},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_app(registry: Arc<MemoryRegistry>, settings: Settings) -> Router {
    let state = Arc::new(AppState::new(
        settings,
        registry,
        Arc::new(HttpUpstream::new().unwrap()),
    ));
    create_router(state)
}

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.rate_limit.enabled = false;
    settings
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Item service answering items and categories
async fn item_service() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "Milk"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "Dairy"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/items"))
        .and(query_param("q", "milk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "Milk"}])))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_dashboard_tolerates_missing_service() {
    let items = item_service().await;
    let users = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/profile"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"username": "ada"})))
        .expect(1)
        .mount(&users)
        .await;

    let registry = Arc::new(MemoryRegistry::new());
    registry
        .register(Registration::new("item-service", items.uri()))
        .await
        .unwrap();
    registry
        .register(Registration::new("user-service", users.uri()))
        .await
        .unwrap();
    let app = create_test_app(registry, test_settings());

    let request = Request::builder()
        .uri("/api/dashboard")
        .header("authorization", "Bearer abc")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["profile"]["available"], true);
    assert_eq!(data["profile"]["data"]["username"], "ada");
    assert_eq!(data["items"]["available"], true);
    assert_eq!(data["categories"]["data"][0]["name"], "Dairy");

    // list-service was never registered
    assert_eq!(data["lists"]["available"], false);
    assert!(data["lists"]["data"].is_null());
    assert!(data["lists"]["error"].as_str().unwrap().contains("list-service"));
}

#[tokio::test]
async fn test_dashboard_without_credentials_omits_private_labels() {
    let items = item_service().await;
    let registry = Arc::new(MemoryRegistry::new());
    registry
        .register(Registration::new("item-service", items.uri()))
        .await
        .unwrap();
    let app = create_test_app(registry, test_settings());

    let request = Request::builder()
        .uri("/api/dashboard")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    let data = body["data"].as_object().unwrap();
    assert!(data.get("profile").is_none());
    assert!(data.get("lists").is_none());
    assert_eq!(data["items"]["available"], true);
    assert_eq!(data["categories"]["available"], true);
}

#[tokio::test]
async fn test_upstream_rejection_is_local_to_label() {
    let items = item_service().await;
    let lists = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lists"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid token"})))
        .mount(&lists)
        .await;

    let registry = Arc::new(MemoryRegistry::new());
    registry
        .register(Registration::new("item-service", items.uri()))
        .await
        .unwrap();
    registry
        .register(Registration::new("list-service", lists.uri()))
        .await
        .unwrap();
    let app = create_test_app(registry, test_settings());

    let request = Request::builder()
        .uri("/api/dashboard")
        .header("authorization", "Bearer expired")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["lists"]["available"], false);
    assert!(body["data"]["lists"]["error"]
        .as_str()
        .unwrap()
        .contains("Invalid token"));
    assert_eq!(body["data"]["items"]["available"], true);
}

#[tokio::test]
async fn test_slow_constituent_times_out_without_blocking() {
    let items = item_service().await;
    let slow = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&slow)
        .await;

    let registry = Arc::new(MemoryRegistry::new());
    registry
        .register(Registration::new("item-service", items.uri()))
        .await
        .unwrap();
    registry
        .register(Registration::new("user-service", slow.uri()))
        .await
        .unwrap();

    let mut settings = test_settings();
    settings.proxy.aggregate_timeout_ms = 200;
    let app = create_test_app(registry, settings);

    let request = Request::builder()
        .uri("/api/dashboard")
        .header("authorization", "Bearer abc")
        .body(Body::empty())
        .unwrap();

    let started = std::time::Instant::now();
    let (status, body) = send(&app, request).await;
    assert!(started.elapsed() < Duration::from_secs(3));

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["profile"]["available"], false);
    assert!(body["data"]["profile"]["error"]
        .as_str()
        .unwrap()
        .contains("did not respond"));
    assert_eq!(body["data"]["items"]["available"], true);
}

#[tokio::test]
async fn test_search_requires_query() {
    let app = create_test_app(Arc::new(MemoryRegistry::new()), test_settings());

    let request = Request::builder()
        .uri("/api/search?q=%20")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["service"], "api-gateway");
}

#[tokio::test]
async fn test_search_merges_results() {
    let items = item_service().await;
    let registry = Arc::new(MemoryRegistry::new());
    registry
        .register(Registration::new("item-service", items.uri()))
        .await
        .unwrap();
    let app = create_test_app(registry, test_settings());

    let request = Request::builder()
        .uri("/api/search?q=milk")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "milk");
    assert_eq!(body["results"]["items"]["data"][0]["name"], "Milk");
    assert!(body["results"].get("lists").is_none());
}

#[tokio::test]
async fn test_search_encodes_query_and_forwards_request_id() {
    let items = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/items"))
        .and(query_param("q", "green apples & pears"))
        .and(header("x-request-id", "req-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}])))
        .expect(1)
        .mount(&items)
        .await;

    let registry = Arc::new(MemoryRegistry::new());
    registry
        .register(Registration::new("item-service", items.uri()))
        .await
        .unwrap();
    let app = create_test_app(registry, test_settings());

    let request = Request::builder()
        .uri("/api/search?q=green%20apples%20%26%20pears")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "green apples & pears");
    assert_eq!(body["results"]["items"]["available"], true);
    assert_eq!(body["results"]["items"]["data"][0]["id"], 7);
}
