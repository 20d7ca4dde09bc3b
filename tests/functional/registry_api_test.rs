//! Functional tests for the registry endpoints

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
    registry::{FileRegistry, ServiceRegistry},
    AppState,
};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_app(registry: Arc<dyn ServiceRegistry>) -> Router {
    let mut settings = Settings::default();
    settings.rate_limit.enabled = false;
    let state = Arc::new(AppState::new(
        settings,
        registry,
        Arc::new(HttpUpstream::new().unwrap()),
    ));
    create_router(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_register_list_unregister() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(FileRegistry::open(dir.path().join("registry.json")).unwrap());
    let app = create_test_app(registry);

    let (status, body) = send(
        &app,
        post_json(
            "/registry",
            json!({
                "name": "item-service",
                "url": "http://localhost:3003",
                "metadata": {"version": "1.0.0", "endpoints": ["/items", "/categories"]}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["service"]["name"], "item-service");
    assert_eq!(body["service"]["healthy"], true);

    let (status, body) = send(&app, request("GET", "/registry")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["services"]["item-service"]["url"], "http://localhost:3003");
    assert_eq!(
        body["services"]["item-service"]["metadata"]["version"],
        "1.0.0"
    );

    let (status, _) = send(&app, request("DELETE", "/registry/item-service")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request("DELETE", "/registry/item-service")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_malformed_registration_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(FileRegistry::open(dir.path().join("registry.json")).unwrap());
    let app = create_test_app(registry.clone());

    let (status, body) = send(&app, post_json("/registry", json!({"name": "item-service"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_registration");

    let bad_json = Request::builder()
        .method("POST")
        .uri("/registry")
        .body(Body::from("{oops"))
        .unwrap();
    let (status, body) = send(&app, bad_json).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_json");

    assert!(registry.list_services().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_registrations_survive_gateway_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");

    {
        let app = create_test_app(Arc::new(FileRegistry::open(&path).unwrap()));
        let (status, _) = send(
            &app,
            post_json(
                "/registry",
                json!({"name": "user-service", "url": "http://localhost:3001"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let app = create_test_app(Arc::new(FileRegistry::open(&path).unwrap()));
    let (_, body) = send(&app, request("GET", "/registry")).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["services"]["user-service"]["url"], "http://localhost:3001");
}

#[tokio::test]
async fn test_owner_scoped_unregister() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(FileRegistry::open(dir.path().join("registry.json")).unwrap());
    let app = create_test_app(registry.clone());

    // Without a pid the entry has no owner, not the gateway's
    let (status, body) = send(
        &app,
        post_json(
            "/registry",
            json!({"name": "list-service", "url": "http://localhost:3002"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["service"].get("pid").is_none());

    let (status, body) = send(
        &app,
        post_json(
            "/registry",
            json!({"name": "list-service", "url": "http://localhost:4002", "pid": 2222}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["service"]["pid"], 2222);

    let (status, body) = send(&app, request("DELETE", "/registry/list-service?pid=1111")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "owner_mismatch");
    let record = registry.discover("list-service").await.unwrap();
    assert_eq!(record.url, "http://localhost:4002");

    let (status, _) = send(&app, request("DELETE", "/registry/list-service?pid=2222")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(registry.list_services().await.unwrap().is_empty());
}
