//! Request forwarding with circuit breaking

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::{UpstreamClient, UpstreamFailure, UpstreamRequest, UpstreamResponse};
use crate::error::{GatewayError, Result};
use crate::gateway::circuit_breaker::CircuitBreakerTable;
use crate::registry::ServiceRegistry;

/// Resolves a service, forwards one request to it and keeps its breaker current
pub struct ServiceProxy {
    registry: Arc<dyn ServiceRegistry>,
    breakers: Arc<CircuitBreakerTable>,
    upstream: Arc<dyn UpstreamClient>,
    timeout: Duration,
}

impl ServiceProxy {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        breakers: Arc<CircuitBreakerTable>,
        upstream: Arc<dyn UpstreamClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            breakers,
            upstream,
            timeout,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerTable> {
        &self.breakers
    }

    /// Forward with the default proxy timeout
    pub async fn proxy(&self, service: &str, request: UpstreamRequest) -> Result<UpstreamResponse> {
        self.call(service, request, self.timeout).await
    }

    /// Forward `request` to `service`.
    ///
    /// Responses below 500 close the breaker; 5xx responses are returned as-is
    /// but still count as failures. Network failures count as failures and
    /// surface as errors.
    pub async fn call(
        &self,
        service: &str,
        request: UpstreamRequest,
        timeout: Duration,
    ) -> Result<UpstreamResponse> {
        self.breakers.check(service)?;

        let record = match self.registry.discover(service).await {
            Ok(record) => record,
            Err(e @ GatewayError::ServiceNotFound { .. }) => {
                warn!(service = %service, "Service not found in registry");
                return Err(e);
            }
            Err(e) => {
                warn!(service = %service, error = %e, "Registry lookup failed");
                return Err(GatewayError::RegistryUnavailable(e.to_string()));
            }
        };

        if !record.healthy {
            debug!(service = %service, "Forwarding to service last reported unhealthy");
        }

        let method = request.method.clone();
        let path = request.path.clone();

        match self.upstream.send(&record.url, request, timeout).await {
            Ok(response) if response.status.is_server_error() => {
                warn!(
                    service = %service,
                    method = %method,
                    path = %path,
                    status = response.status.as_u16(),
                    "Upstream returned server error"
                );
                self.breakers.record_failure(service);
                Ok(response)
            }
            Ok(response) => {
                debug!(
                    service = %service,
                    method = %method,
                    path = %path,
                    status = response.status.as_u16(),
                    "Upstream responded"
                );
                self.breakers.record_success(service);
                Ok(response)
            }
            Err(failure) => {
                warn!(
                    service = %service,
                    method = %method,
                    path = %path,
                    error = %failure,
                    "Upstream call failed"
                );
                self.breakers.record_failure(service);
                Err(match failure {
                    UpstreamFailure::Timeout => GatewayError::UpstreamTimeout {
                        service: service.to_string(),
                        timeout,
                    },
                    UpstreamFailure::Connection(reason) => GatewayError::UpstreamConnection {
                        service: service.to_string(),
                        reason,
                    },
                })
            }
        }
    }
}
