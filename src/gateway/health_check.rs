//! Health monitor for probing registered services

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::UpstreamClient;
use crate::config::HealthCheckConfig;
use crate::error::Result;
use crate::registry::ServiceRegistry;

/// Outcome of one probe cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: Vec<String>,
    pub unhealthy: Vec<String>,
    pub removed: Vec<String>,
}

/// Periodically probes every registered service and writes the result back
pub struct HealthMonitor {
    registry: Arc<dyn ServiceRegistry>,
    upstream: Arc<dyn UpstreamClient>,
    config: HealthCheckConfig,
    stale_after: Option<Duration>,
    check_task: RwLock<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        upstream: Arc<dyn UpstreamClient>,
        config: HealthCheckConfig,
        stale_after: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            upstream,
            config,
            stale_after,
            check_task: RwLock::new(None),
        }
    }

    /// Probe every registered service once and update its health flag.
    ///
    /// Failing probes only mark a record unhealthy; removal is left to the
    /// stale-entry sweep.
    pub async fn perform_health_checks(&self) -> Result<HealthReport> {
        let services = self.registry.list_services().await?;
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let probes = services.values().map(|record| {
            let url = format!(
                "{}{}",
                record.url.trim_end_matches('/'),
                self.config.path
            );
            let name = record.name.clone();
            let was_healthy = record.healthy;
            async move {
                let healthy = self.upstream.probe(&url, timeout).await;
                (name, was_healthy, healthy)
            }
        });

        let mut report = HealthReport::default();
        for (name, was_healthy, healthy) in join_all(probes).await {
            if let Err(e) = self.registry.update_health(&name, healthy).await {
                warn!(service = %name, error = %e, "Failed to record health status");
            }

            match (was_healthy, healthy) {
                (false, true) => info!(service = %name, "Service recovered and marked healthy"),
                (true, false) => warn!(service = %name, "Service failed health check, marked unhealthy"),
                _ => debug!(service = %name, healthy = healthy, "Health check completed"),
            }

            if healthy {
                report.healthy.push(name);
            } else {
                report.unhealthy.push(name);
            }
        }

        if let Some(max_age) = self.stale_after {
            report.removed = self.registry.cleanup_stale(max_age).await?;
        }

        Ok(report)
    }

    /// Start the background probe loop
    pub async fn start(self: &Arc<Self>) {
        let monitor = Arc::clone(self);
        let initial_delay = Duration::from_secs(self.config.initial_delay_secs);
        let interval = Duration::from_secs(self.config.interval_secs);

        let handle = tokio::spawn(async move {
            // Give services started alongside the gateway time to register
            tokio::time::sleep(initial_delay).await;

            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match monitor.perform_health_checks().await {
                    Ok(report) => debug!(
                        healthy = report.healthy.len(),
                        unhealthy = report.unhealthy.len(),
                        removed = report.removed.len(),
                        "Health check cycle finished"
                    ),
                    Err(e) => warn!(error = %e, "Health check cycle failed, retrying next tick"),
                }
            }
        });

        if let Some(previous) = self.check_task.write().await.replace(handle) {
            previous.abort();
        }
        info!(
            interval_secs = self.config.interval_secs,
            initial_delay_secs = self.config.initial_delay_secs,
            "Started health check background task"
        );
    }

    /// Stop the health check background task
    pub async fn stop(&self) {
        if let Some(handle) = self.check_task.write().await.take() {
            handle.abort();
            info!("Stopped health check background task");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.check_task
            .read()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}
