//! HTTP client for backend services

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::StatusCode;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::backend::traits::{UpstreamClient, UpstreamFailure, UpstreamRequest, UpstreamResponse};
use crate::error::{GatewayError, Result};

/// reqwest-based transport shared by the proxy, aggregator and health monitor
#[derive(Clone)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    /// Create a new HTTP transport; timeouts are applied per request.
    ///
    /// Redirects are never followed: a backend's 3xx is relayed to the caller.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn classify(error: reqwest::Error) -> UpstreamFailure {
        if error.is_timeout() {
            UpstreamFailure::Timeout
        } else {
            UpstreamFailure::Connection(error.to_string())
        }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn send(
        &self,
        base_url: &str,
        request: UpstreamRequest,
        timeout: Duration,
    ) -> std::result::Result<UpstreamResponse, UpstreamFailure> {
        let url = request.target_url(base_url);
        // reqwest 0.11 speaks http 0.2 types; convert through their wire form
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| UpstreamFailure::Connection(format!("unsupported method: {}", e)))?;

        debug!(method = %method, url = %url, "Forwarding request");

        let mut builder = self.client.request(method, &url).timeout(timeout);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_bytes());
        }
        if let Some(body) = request.body {
            if !request.headers.contains_key(axum::http::header::CONTENT_TYPE) {
                builder = builder.header("content-type", "application/json");
            }
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await.map_err(Self::classify)?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let header_text = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header_text(reqwest::header::CONTENT_TYPE);
        let location = header_text(reqwest::header::LOCATION);
        let body = response.bytes().await.map_err(Self::classify)?;

        Ok(UpstreamResponse {
            status,
            content_type,
            location,
            body: Bytes::from(body.to_vec()),
        })
    }

    async fn probe(&self, url: &str, timeout: Duration) -> bool {
        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %url, "Health probe passed");
                true
            }
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "Health probe failed");
                false
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Health probe failed");
                false
            }
        }
    }
}
