//! Registration handshake for backend processes
//!
//! A backend announces itself once on startup, keeps its record fresh with a
//! heartbeat loop and removes it again on graceful shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Registration, Removal, ServiceRecord, ServiceRegistry};
use crate::error::Result;

/// Keeps one service's registry record alive for the lifetime of the process
pub struct ServiceAnnouncer {
    registry: Arc<dyn ServiceRegistry>,
    record: ServiceRecord,
    heartbeat_task: JoinHandle<()>,
}

impl ServiceAnnouncer {
    /// Register the service and start heartbeating every `interval`.
    ///
    /// The record is owned by this process unless the registration names a pid.
    pub async fn announce(
        registry: Arc<dyn ServiceRegistry>,
        mut registration: Registration,
        interval: Duration,
    ) -> Result<Self> {
        registration.pid.get_or_insert_with(std::process::id);
        let record = registry.register(registration.clone()).await?;
        let started = Instant::now();

        let heartbeat_registry = registry.clone();
        let name = record.name.clone();
        let heartbeat_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; registration already stamped us
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let uptime = started.elapsed().as_secs();
                match heartbeat_registry.heartbeat(&name, Some(uptime)).await {
                    Ok(true) => debug!(service = %name, uptime_secs = uptime, "Heartbeat sent"),
                    Ok(false) => {
                        warn!(service = %name, "Registry entry missing, re-registering");
                        if let Err(e) = heartbeat_registry.register(registration.clone()).await {
                            warn!(service = %name, error = %e, "Re-registration failed");
                        }
                    }
                    Err(e) => warn!(service = %name, error = %e, "Heartbeat failed"),
                }
            }
        });

        info!(service = %record.name, url = %record.url, "Service announced");

        Ok(Self {
            registry,
            record,
            heartbeat_task,
        })
    }

    pub fn record(&self) -> &ServiceRecord {
        &self.record
    }

    /// Stop heartbeating and remove the registry entry if it is still ours
    pub async fn shutdown(self) -> Result<()> {
        self.heartbeat_task.abort();
        match self
            .registry
            .unregister(&self.record.name, self.record.pid)
            .await?
        {
            Removal::Removed(_) => {
                info!(service = %self.record.name, "Service withdrawn from registry")
            }
            Removal::OwnerMismatch { .. } => {
                info!(service = %self.record.name, "Registry entry taken over, left in place")
            }
            Removal::NotFound => {
                debug!(service = %self.record.name, "Registry entry already gone")
            }
        }
        Ok(())
    }
}
