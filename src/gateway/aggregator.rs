//! Fan-out aggregation with partial-failure tolerance
//!
//! Every constituent call runs concurrently through the proxy and settles on
//! its own; one failing backend only marks its own label unavailable.

use axum::http::{header, HeaderMap, Method};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::UpstreamRequest;
use crate::error::GatewayError;
use crate::gateway::proxy::ServiceProxy;
use crate::middleware::REQUEST_ID_HEADER;

/// One constituent call of an aggregate
#[derive(Debug, Clone)]
pub struct AggregateCall {
    pub label: String,
    pub service: String,
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Issued only when the inbound request carries a credential
    pub requires_auth: bool,
}

impl AggregateCall {
    pub fn get(label: &str, service: &str, path: &str) -> Self {
        Self {
            label: label.to_string(),
            service: service.to_string(),
            method: Method::GET,
            path: path.to_string(),
            query: Vec::new(),
            requires_auth: false,
        }
    }

    pub fn authenticated(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Downstream request for this call carrying the forwarded context
    pub fn request(&self, forwarded: &Forwarded) -> UpstreamRequest {
        let mut request = UpstreamRequest::new(self.method.clone(), self.path.clone())
            .with_params(self.query.clone());
        if let Some(token) = forwarded.authorization.as_deref() {
            request = request.with_authorization(token);
        }
        if let Some(id) = forwarded.request_id.as_deref() {
            request = request.with_header(REQUEST_ID_HEADER, id);
        }
        request
    }
}

/// Inbound values passed through to every constituent call
#[derive(Debug, Clone, Default)]
pub struct Forwarded {
    /// Credential, forwarded without interpretation
    pub authorization: Option<String>,
    pub request_id: Option<String>,
}

impl Forwarded {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            authorization: header_text(headers, header::AUTHORIZATION.as_str()),
            request_id: header_text(headers, REQUEST_ID_HEADER),
        }
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Settled result of one label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateOutcome {
    pub available: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl AggregateOutcome {
    fn success(data: Value) -> Self {
        Self {
            available: true,
            data: Some(data),
            error: None,
        }
    }

    fn failure(error: &GatewayError) -> Self {
        Self {
            available: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// Issues groups of calls through the proxy and folds their outcomes per label
pub struct Aggregator {
    proxy: Arc<ServiceProxy>,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(proxy: Arc<ServiceProxy>, timeout: Duration) -> Self {
        Self { proxy, timeout }
    }

    /// Run `calls` concurrently and wait for all of them to settle.
    ///
    /// Calls that need a credential are omitted entirely when the inbound
    /// request carried none.
    pub async fn aggregate(
        &self,
        calls: Vec<AggregateCall>,
        forwarded: &Forwarded,
    ) -> BTreeMap<String, AggregateOutcome> {
        let pending = calls
            .into_iter()
            .filter(|call| !call.requires_auth || forwarded.authorization.is_some())
            .map(|call| self.settle(call, forwarded));

        let outcomes: BTreeMap<String, AggregateOutcome> =
            join_all(pending).await.into_iter().collect();

        debug!(
            labels = outcomes.len(),
            unavailable = outcomes.values().filter(|o| !o.available).count(),
            "Aggregate settled"
        );
        outcomes
    }

    async fn settle(
        &self,
        call: AggregateCall,
        forwarded: &Forwarded,
    ) -> (String, AggregateOutcome) {
        let request = call.request(forwarded);

        let outcome = match self.proxy.call(&call.service, request, self.timeout).await {
            Ok(response) if response.status.is_success() => {
                AggregateOutcome::success(response.json_body())
            }
            Ok(response) => {
                let error = GatewayError::UpstreamErrorResponse {
                    service: call.service.clone(),
                    status: response.status,
                    message: response.error_message(),
                };
                warn!(label = %call.label, service = %call.service, error = %error, "Aggregate call rejected");
                AggregateOutcome::failure(&error)
            }
            Err(error) => {
                warn!(label = %call.label, service = %call.service, error = %error, "Aggregate call failed");
                AggregateOutcome::failure(&error)
            }
        };

        (call.label, outcome)
    }
}

/// Calls behind `GET /api/dashboard`
pub fn dashboard_calls() -> Vec<AggregateCall> {
    vec![
        AggregateCall::get("profile", "user-service", "/users/profile").authenticated(),
        AggregateCall::get("lists", "list-service", "/lists").authenticated(),
        AggregateCall::get("items", "item-service", "/items").param("limit", "10"),
        AggregateCall::get("categories", "item-service", "/categories"),
    ]
}

/// Calls behind `GET /api/search?q=`
pub fn search_calls(query: &str) -> Vec<AggregateCall> {
    vec![
        AggregateCall::get("items", "item-service", "/search/items").param("q", query),
        AggregateCall::get("lists", "list-service", "/lists/search")
            .param("q", query)
            .authenticated(),
    ]
}
