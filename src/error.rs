//! Gateway error taxonomy and the JSON error envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Name reported in error envelopes for faults that belong to the gateway itself
pub const GATEWAY_SERVICE_NAME: &str = "api-gateway";

/// Application-wide error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Service '{service}' is not registered")]
    ServiceNotFound {
        service: String,
        available: Vec<String>,
    },

    #[error("Service '{service}' is temporarily unavailable (circuit open)")]
    CircuitOpen { service: String, retry_after: Duration },

    #[error("Service '{service}' did not respond within {}ms", .timeout.as_millis())]
    UpstreamTimeout { service: String, timeout: Duration },

    #[error("Service '{service}' is unreachable: {reason}")]
    UpstreamConnection { service: String, reason: String },

    #[error("Service '{service}' responded with {status}: {message}")]
    UpstreamErrorResponse {
        service: String,
        status: StatusCode,
        message: String,
    },

    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("Service registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Route not found: {path}")]
    RouteNotFound {
        path: String,
        available: Vec<String>,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The backend this error is attributed to, or the gateway itself
    pub fn service(&self) -> &str {
        match self {
            GatewayError::ServiceNotFound { service, .. }
            | GatewayError::CircuitOpen { service, .. }
            | GatewayError::UpstreamTimeout { service, .. }
            | GatewayError::UpstreamConnection { service, .. }
            | GatewayError::UpstreamErrorResponse { service, .. } => service,
            _ => GATEWAY_SERVICE_NAME,
        }
    }

    /// HTTP status used when the error is rendered
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Config(_) | GatewayError::Io(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Json(_) => StatusCode::BAD_REQUEST,
            GatewayError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            GatewayError::ServiceNotFound { .. }
            | GatewayError::CircuitOpen { .. }
            | GatewayError::UpstreamTimeout { .. }
            | GatewayError::UpstreamConnection { .. }
            | GatewayError::RegistryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamErrorResponse { status, .. } => *status,
            GatewayError::InvalidRegistration(_) | GatewayError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "configuration_error",
            GatewayError::Io(_) | GatewayError::Internal(_) => "internal_error",
            GatewayError::Json(_) => "invalid_json",
            GatewayError::HttpClient(_) => "upstream_client_error",
            GatewayError::ServiceNotFound { .. } => "service_not_found",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::UpstreamTimeout { .. } => "upstream_timeout",
            GatewayError::UpstreamConnection { .. } => "upstream_unreachable",
            GatewayError::UpstreamErrorResponse { .. } => "upstream_error",
            GatewayError::InvalidRegistration(_) => "invalid_registration",
            GatewayError::RegistryUnavailable(_) => "registry_unavailable",
            GatewayError::RouteNotFound { .. } => "route_not_found",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::RateLimitExceeded => "rate_limit_exceeded",
        }
    }

    /// Render the `{success: false, message, service, error}` envelope
    pub fn to_envelope(&self) -> Value {
        let mut body = json!({
            "success": false,
            "message": self.to_string(),
            "service": self.service(),
            "error": self.code(),
        });

        match self {
            GatewayError::ServiceNotFound { available, .. } => {
                body["availableServices"] = json!(available);
            }
            GatewayError::CircuitOpen { retry_after, .. } => {
                body["retryAfterSecs"] = json!(retry_after.as_secs());
            }
            GatewayError::RouteNotFound { available, .. } => {
                body["availableRoutes"] = json!(available);
            }
            _ => {}
        }

        body
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_envelope())).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, GatewayError>;
