//! Router construction

use axum::{
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::middleware::{RateLimitLayer, RequestIdLayer};
use crate::AppState;

/// Create the gateway router with the given application state
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/registry",
            get(handlers::registry_snapshot).post(handlers::register_service),
        )
        .route("/registry/:name", delete(handlers::unregister_service))
        .route("/api/dashboard", get(handlers::dashboard))
        .route("/api/search", get(handlers::search))
        // Proxied prefixes are resolved from the route table
        .fallback(handlers::proxy_request);

    let rate_limit = &state.settings.rate_limit;
    if rate_limit.enabled {
        router = router.layer(RateLimitLayer::new(
            rate_limit.requests_per_second,
            rate_limit.burst_size,
        ));
    }

    router
        .layer(RequestIdLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
