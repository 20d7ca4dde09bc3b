//! In-process registry, used by tests and single-process deployments

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use super::{Registration, RegistryTable, Removal, ServiceRecord, ServiceRegistry};
use crate::error::Result;

/// Registry kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    table: RwLock<RegistryTable>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fabricated record as-is, bypassing registration checks
    pub fn insert_record(&self, record: ServiceRecord) {
        self.table.write().upsert(record);
    }
}

#[async_trait]
impl ServiceRegistry for MemoryRegistry {
    async fn register(&self, registration: Registration) -> Result<ServiceRecord> {
        let record = registration.into_record(Utc::now())?;
        self.table.write().upsert(record.clone());
        info!(service = %record.name, url = %record.url, "Service registered");
        Ok(record)
    }

    async fn discover(&self, name: &str) -> Result<ServiceRecord> {
        self.table.read().discover(name)
    }

    async fn list_services(&self) -> Result<BTreeMap<String, ServiceRecord>> {
        Ok(self.table.read().clone().into_map())
    }

    async fn update_health(&self, name: &str, healthy: bool) -> Result<()> {
        self.table.write().mark_health(name, healthy, Utc::now());
        Ok(())
    }

    async fn heartbeat(&self, name: &str, uptime_secs: Option<u64>) -> Result<bool> {
        Ok(self.table.write().touch(name, uptime_secs, Utc::now()))
    }

    async fn unregister(&self, name: &str, owner: Option<u32>) -> Result<Removal> {
        Ok(self.table.write().remove(name, owner))
    }

    async fn cleanup_stale(&self, max_age: Duration) -> Result<Vec<String>> {
        Ok(self.table.write().remove_stale(max_age, Utc::now()))
    }
}
