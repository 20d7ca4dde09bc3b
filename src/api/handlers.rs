//! HTTP handlers for the public gateway surface

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{UpstreamRequest, UpstreamResponse};
use crate::error::{GatewayError, Result, GATEWAY_SERVICE_NAME};
use crate::gateway::aggregator::{dashboard_calls, search_calls, Forwarded};
use crate::gateway::circuit_breaker::CircuitState;
use crate::registry::{Registration, Removal};
use crate::AppState;

/// Public endpoints served by the gateway itself
const GATEWAY_ROUTES: &[&str] = &["/health", "/registry", "/api/dashboard", "/api/search"];

/// `GET /health` - gateway status with the registry and breaker view
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let services = state
        .registry
        .list_services()
        .await
        .map_err(|e| GatewayError::RegistryUnavailable(e.to_string()))?;
    let breakers = state.breakers.snapshot();

    let mut degraded = false;
    let mut view = Map::new();
    for (name, record) in &services {
        let breaker = breakers.get(name);
        let circuit = breaker.map(|b| b.state).unwrap_or(CircuitState::Closed);
        degraded |= !record.healthy || circuit == CircuitState::Open;

        view.insert(
            name.clone(),
            json!({
                "url": record.url,
                "healthy": record.healthy,
                "registeredAt": record.registered_at,
                "lastHeartbeat": record.last_heartbeat,
                "uptimeSecs": record.uptime_secs,
                "circuit": circuit,
                "failureCount": breaker.map(|b| b.failure_count).unwrap_or(0),
            }),
        );
    }

    Ok(Json(json!({
        "success": true,
        "service": GATEWAY_SERVICE_NAME,
        "status": if degraded { "degraded" } else { "healthy" },
        "timestamp": Utc::now(),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "services": view,
    })))
}

/// `GET /registry` - raw registry snapshot
pub async fn registry_snapshot(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let services = state
        .registry
        .list_services()
        .await
        .map_err(|e| GatewayError::RegistryUnavailable(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "count": services.len(),
        "services": services,
    })))
}

/// `POST /registry` - registration handshake for out-of-process backends
pub async fn register_service(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>)> {
    let registration: Registration = serde_json::from_slice(&body)?;
    let record = state.registry.register(registration).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "service": record })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UnregisterParams {
    /// Only remove the entry when it is owned by this pid
    pid: Option<u32>,
}

/// `DELETE /registry/:name[?pid=]` - graceful unregister
pub async fn unregister_service(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<UnregisterParams>,
) -> Result<Response> {
    let removal = state.registry.unregister(&name, params.pid).await?;
    let (status, message, error) = match removal {
        Removal::Removed(_) => {
            return Ok(Json(json!({
                "success": true,
                "message": format!("Service '{}' unregistered", name),
            }))
            .into_response());
        }
        Removal::NotFound => (
            StatusCode::NOT_FOUND,
            format!("Service '{}' is not registered", name),
            "service_not_found",
        ),
        Removal::OwnerMismatch { .. } => (
            StatusCode::CONFLICT,
            format!("Service '{}' is registered by another owner", name),
            "owner_mismatch",
        ),
    };

    Ok((
        status,
        Json(json!({
            "success": false,
            "message": message,
            "service": name,
            "error": error,
        })),
    )
        .into_response())
}

/// `GET /api/dashboard` - profile, lists, items and categories in one response
pub async fn dashboard(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<Value> {
    let forwarded = Forwarded::from_headers(&headers);
    let data = state.aggregator.aggregate(dashboard_calls(), &forwarded).await;

    Json(json!({
        "success": true,
        "data": data,
        "timestamp": Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
}

/// `GET /api/search?q=` - item and list search in one response
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| GatewayError::InvalidRequest("search query 'q' is required".to_string()))?;

    let forwarded = Forwarded::from_headers(&headers);
    let results = state
        .aggregator
        .aggregate(search_calls(query), &forwarded)
        .await;

    Ok(Json(json!({
        "success": true,
        "query": query,
        "results": results,
        "timestamp": Utc::now(),
    })))
}

/// Everything else: forward through the route table or answer 404
pub async fn proxy_request(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(route) = state.routes.resolve(uri.path()) else {
        debug!(path = %uri.path(), "No route matched");
        let mut available = state.routes.prefixes();
        available.extend(GATEWAY_ROUTES.iter().map(|r| r.to_string()));
        return GatewayError::RouteNotFound {
            path: uri.path().to_string(),
            available,
        }
        .into_response();
    };

    let request = UpstreamRequest::from_inbound(
        method,
        route.upstream_path,
        uri.query().map(str::to_string),
        &headers,
        body,
    );

    match state.proxy.proxy(&route.service, request).await {
        Ok(response) => relay(response),
        Err(e) => {
            info!(service = %route.service, error = %e, "Proxy request failed");
            e.into_response()
        }
    }
}

/// Relay a backend response verbatim
fn relay(response: UpstreamResponse) -> Response {
    let mut builder = Response::builder().status(response.status);
    if let Some(content_type) = response.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    if let Some(location) = response.location {
        builder = builder.header(header::LOCATION, location);
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|e| GatewayError::Internal(e.to_string()).into_response())
}
