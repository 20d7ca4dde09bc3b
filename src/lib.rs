//! Service Gateway
//!
//! A single public entry point for a set of independently deployed backend
//! services: services announce themselves in a shared registry, the gateway
//! routes and rewrites requests to them, isolates failing services behind
//! circuit breakers and aggregates several backends into one response.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod registry;

pub use error::{GatewayError, Result};

use std::sync::Arc;
use std::time::Instant;

use backend::UpstreamClient;
use gateway::{
    aggregator::Aggregator,
    circuit_breaker::{CircuitBreakerTable, Clock, SystemClock},
    health_check::HealthMonitor,
    proxy::ServiceProxy,
    router::RouteTable,
};
use registry::ServiceRegistry;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub registry: Arc<dyn ServiceRegistry>,
    pub breakers: Arc<CircuitBreakerTable>,
    pub routes: Arc<RouteTable>,
    pub proxy: Arc<ServiceProxy>,
    pub aggregator: Arc<Aggregator>,
    pub health_monitor: Arc<HealthMonitor>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every gateway component from settings
    pub fn new(
        settings: config::Settings,
        registry: Arc<dyn ServiceRegistry>,
        upstream: Arc<dyn UpstreamClient>,
    ) -> Self {
        Self::with_clock(settings, registry, upstream, Arc::new(SystemClock))
    }

    /// Same as [`AppState::new`] with an explicit breaker clock
    pub fn with_clock(
        settings: config::Settings,
        registry: Arc<dyn ServiceRegistry>,
        upstream: Arc<dyn UpstreamClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let breakers = Arc::new(CircuitBreakerTable::with_clock(
            &settings.circuit_breaker,
            clock,
        ));
        let routes = Arc::new(RouteTable::new(settings.routes.clone()));
        let proxy = Arc::new(ServiceProxy::new(
            registry.clone(),
            breakers.clone(),
            upstream.clone(),
            settings.proxy.timeout(),
        ));
        let aggregator = Arc::new(Aggregator::new(
            proxy.clone(),
            settings.proxy.aggregate_timeout(),
        ));
        let health_monitor = Arc::new(HealthMonitor::new(
            registry.clone(),
            upstream,
            settings.health_check.clone(),
            settings.registry.stale_after(),
        ));

        Self {
            settings: Arc::new(settings),
            registry,
            breakers,
            routes,
            proxy,
            aggregator,
            health_monitor,
            started_at: Instant::now(),
        }
    }
}
