//! Service registry - shared directory of backend name to location and health
//!
//! Every backend process registers itself on startup and unregisters on graceful
//! shutdown; the gateway reads the registry to resolve forwarding targets and its
//! health monitor writes liveness flags back. Exactly one record exists per name.

pub mod announcer;
pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{GatewayError, Result};

pub use announcer::ServiceAnnouncer;
pub use file::FileRegistry;
pub use memory::MemoryRegistry;

/// A registered backend service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub name: String,
    /// Base address (scheme, host and port) used to build forwarding targets
    pub url: String,
    /// Informational only, never consulted for routing
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub healthy: bool,
    pub registered_at: DateTime<Utc>,
    /// Last liveness signal, either a self-reported heartbeat or a passing probe
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,
    /// Owner process id; an owner-scoped unregister only removes a matching record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// Registration request sent by a backend on startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub pid: Option<u32>,
}

impl Registration {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Check the registration and build the record it produces
    pub fn into_record(self, now: DateTime<Utc>) -> Result<ServiceRecord> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(GatewayError::InvalidRegistration(
                "service name is required".to_string(),
            ));
        }

        let url = self.url.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(GatewayError::InvalidRegistration(format!(
                "service '{}' must provide a url",
                name
            )));
        }

        let parsed = reqwest::Url::parse(url).map_err(|e| {
            GatewayError::InvalidRegistration(format!("invalid url '{}': {}", url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(GatewayError::InvalidRegistration(format!(
                "url '{}' must be an http(s) address with a host",
                url
            )));
        }

        Ok(ServiceRecord {
            name: name.to_string(),
            url: url.to_string(),
            metadata: self.metadata,
            healthy: true,
            registered_at: now,
            last_heartbeat: now,
            last_checked: None,
            uptime_secs: None,
            pid: self.pid,
        })
    }
}

/// Result of an unregister
#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    Removed(ServiceRecord),
    NotFound,
    /// The name is held by another owner and was left in place
    OwnerMismatch { owner: Option<u32> },
}

impl Removal {
    pub fn is_removed(&self) -> bool {
        matches!(self, Removal::Removed(_))
    }
}

/// In-memory image of the registry, shared by every store implementation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryTable {
    services: BTreeMap<String, ServiceRecord>,
}

impl RegistryTable {
    /// Insert or replace the record for `record.name`
    pub fn upsert(&mut self, record: ServiceRecord) {
        self.services.insert(record.name.clone(), record);
    }

    pub fn get(&self, name: &str) -> Option<&ServiceRecord> {
        self.services.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, ServiceRecord> {
        self.services
    }

    /// Look up `name`, failing with the list of known services when absent
    pub fn discover(&self, name: &str) -> Result<ServiceRecord> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::ServiceNotFound {
                service: name.to_string(),
                available: self.names(),
            })
    }

    /// Record a probe outcome. Returns false when the name is unknown.
    ///
    /// Only a passing probe counts as a liveness signal for stale cleanup.
    pub fn mark_health(&mut self, name: &str, healthy: bool, now: DateTime<Utc>) -> bool {
        match self.services.get_mut(name) {
            Some(record) => {
                record.healthy = healthy;
                record.last_checked = Some(now);
                if healthy {
                    record.last_heartbeat = now;
                }
                true
            }
            None => false,
        }
    }

    /// Record a self-reported heartbeat. Returns false when the name is unknown.
    pub fn touch(&mut self, name: &str, uptime_secs: Option<u64>, now: DateTime<Utc>) -> bool {
        match self.services.get_mut(name) {
            Some(record) => {
                record.healthy = true;
                record.last_heartbeat = now;
                if uptime_secs.is_some() {
                    record.uptime_secs = uptime_secs;
                }
                true
            }
            None => false,
        }
    }

    /// Remove `name`. With an `owner`, the record is only removed when its
    /// pid matches, so a stale instance cannot drop its replacement.
    pub fn remove(&mut self, name: &str, owner: Option<u32>) -> Removal {
        let Some(holder) = self.services.get(name).map(|record| record.pid) else {
            return Removal::NotFound;
        };
        if owner.is_some() && holder != owner {
            return Removal::OwnerMismatch { owner: holder };
        }
        self.services
            .remove(name)
            .map_or(Removal::NotFound, Removal::Removed)
    }

    /// Drop every record whose last liveness signal is older than `max_age`
    pub fn remove_stale(&mut self, max_age: Duration, now: DateTime<Utc>) -> Vec<String> {
        let max_age = chrono::Duration::from_std(max_age)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let stale: Vec<String> = self
            .services
            .values()
            .filter(|record| now.signed_duration_since(record.last_heartbeat) > max_age)
            .map(|record| record.name.clone())
            .collect();

        for name in &stale {
            self.services.remove(name);
        }

        stale
    }
}

/// Contract shared by every registry store.
///
/// Mutations are applied atomically per call: a concurrent writer may win the
/// race for a key, but can never corrupt or drop unrelated entries.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Insert or replace the record for the registration's name
    async fn register(&self, registration: Registration) -> Result<ServiceRecord>;

    /// Current record for `name`, or `ServiceNotFound`
    async fn discover(&self, name: &str) -> Result<ServiceRecord>;

    /// Full snapshot keyed by service name
    async fn list_services(&self) -> Result<BTreeMap<String, ServiceRecord>>;

    /// Set the health flag of an existing record; unknown names are ignored
    async fn update_health(&self, name: &str, healthy: bool) -> Result<()>;

    /// Self-reported liveness; returns false when the name is not registered
    async fn heartbeat(&self, name: &str, uptime_secs: Option<u64>) -> Result<bool>;

    /// Remove the record, only when owned by `owner` if one is given
    async fn unregister(&self, name: &str, owner: Option<u32>) -> Result<Removal>;

    /// Remove records with no liveness signal for longer than `max_age`
    async fn cleanup_stale(&self, max_age: Duration) -> Result<Vec<String>>;
}
