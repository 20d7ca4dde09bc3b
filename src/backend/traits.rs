//! Common traits and types for calling backend services

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::header::IntoHeaderName;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::fmt;
use std::time::Duration;

/// Hop-by-hop and framing headers that must not be forwarded
const STRIPPED_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

/// A request ready to be sent to a backend, with the path already rewritten
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Downstream path, always starting with `/`
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    /// Extra query parameters, encoded by the transport
    pub params: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl UpstreamRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            params: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Build a request from inbound parts: strips hop-by-hop headers and keeps
    /// the body only for methods that carry one
    pub fn from_inbound(
        method: Method,
        path: String,
        query: Option<String>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Self {
        let body = (is_mutating(&method) && !body.is_empty()).then_some(body);
        Self {
            method,
            path,
            query: query.filter(|q| !q.is_empty()),
            params: Vec::new(),
            headers: sanitize_headers(headers),
            body,
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params.extend(params);
        self
    }

    /// Attach a bearer credential exactly as received
    pub fn with_authorization(self, value: &str) -> Self {
        self.with_header(header::AUTHORIZATION, value)
    }

    /// Set `name` unless `value` is not a valid header value
    pub fn with_header(mut self, name: impl IntoHeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Target URL for a backend mounted at `base_url`, without `params`
    pub fn target_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match &self.query {
            Some(query) => format!("{}{}?{}", base, self.path, query),
            None => format!("{}{}", base, self.path),
        }
    }
}

/// Whether a method carries a JSON body downstream
pub fn is_mutating(method: &Method) -> bool {
    [Method::POST, Method::PUT, Method::PATCH, Method::DELETE].contains(method)
}

/// Copy `headers` without hop-by-hop entries
pub fn sanitize_headers(headers: &HeaderMap) -> HeaderMap {
    let mut sanitized = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) {
            sanitized.append(name.clone(), value.clone());
        }
    }
    sanitized
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    STRIPPED_HEADERS.contains(&name.as_str())
}

/// Response received from a backend
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    /// Redirect target of a 3xx, relayed unchanged
    pub location: Option<String>,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Decode the body as JSON, falling back to a JSON string of the raw text
    pub fn json_body(&self) -> serde_json::Value {
        if self.body.is_empty() {
            return serde_json::Value::Null;
        }
        serde_json::from_slice(&self.body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&self.body).into_owned())
        })
    }

    /// Best human-readable message carried by an error body
    pub fn error_message(&self) -> String {
        let body = self.json_body();
        body.get("message")
            .or_else(|| body.get("error"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| {
                self.status
                    .canonical_reason()
                    .unwrap_or("Upstream error")
                    .to_string()
            })
    }
}

/// Network-level failure; the backend never produced a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFailure {
    Timeout,
    Connection(String),
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamFailure::Timeout => write!(f, "timeout"),
            UpstreamFailure::Connection(reason) => write!(f, "connection failed: {}", reason),
        }
    }
}

/// Transport used to reach backend services
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Send `request` to the backend mounted at `base_url`
    async fn send(
        &self,
        base_url: &str,
        request: UpstreamRequest,
        timeout: Duration,
    ) -> std::result::Result<UpstreamResponse, UpstreamFailure>;

    /// Liveness probe: true when `url` answers with a 2xx status in time
    async fn probe(&self, url: &str, timeout: Duration) -> bool;
}
