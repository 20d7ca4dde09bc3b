//! File-backed registry shared between processes
//!
//! The table lives in a single JSON file. Every mutation takes an exclusive
//! advisory lock on a sidecar `.lock` file, re-reads the table, applies the
//! change and replaces the file through a rename, so readers never observe a
//! half-written table and concurrent writers never lose each other's keys.

use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Registration, RegistryTable, Removal, ServiceRecord, ServiceRegistry};
use crate::error::{GatewayError, Result};

/// Registry persisted to a JSON file with exclusive-write discipline
#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileRegistry {
    /// Open (creating if needed) the registry file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(".lock");

        let registry = Self {
            lock_path: PathBuf::from(lock_name),
            path,
        };

        info!(path = ?registry.path, "Opened service registry");
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the table without taking the lock; writes are rename-atomic
    fn read_table(path: &Path) -> Result<RegistryTable> {
        match fs::read(path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(RegistryTable::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RegistryTable::default()),
            Err(e) => Err(GatewayError::Io(e)),
        }
    }

    fn write_table(path: &Path, table: &RegistryTable) -> Result<()> {
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&serde_json::to_vec_pretty(table)?)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Apply `f` to the table under the cross-process write lock
    async fn mutate<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RegistryTable) -> T + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();

        tokio::task::spawn_blocking(move || -> Result<T> {
            let lock_file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?;
            lock_file.lock_exclusive()?;

            let outcome = Self::read_table(&path).and_then(|mut table| {
                let before = table.clone();
                let value = f(&mut table);
                if table != before {
                    Self::write_table(&path, &table)?;
                }
                Ok(value)
            });

            if let Err(e) = FileExt::unlock(&lock_file) {
                warn!(error = %e, "Failed to release registry lock");
            }
            outcome
        })
        .await
        .map_err(|e| GatewayError::Internal(format!("registry task failed: {}", e)))?
    }

    async fn snapshot(&self) -> Result<RegistryTable> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read_table(&path))
            .await
            .map_err(|e| GatewayError::Internal(format!("registry task failed: {}", e)))?
    }
}

#[async_trait]
impl ServiceRegistry for FileRegistry {
    async fn register(&self, registration: Registration) -> Result<ServiceRecord> {
        let record = registration.into_record(Utc::now())?;
        let stored = record.clone();
        self.mutate(move |table| table.upsert(stored)).await?;

        info!(service = %record.name, url = %record.url, pid = ?record.pid, "Service registered");
        Ok(record)
    }

    async fn discover(&self, name: &str) -> Result<ServiceRecord> {
        self.snapshot().await?.discover(name)
    }

    async fn list_services(&self) -> Result<BTreeMap<String, ServiceRecord>> {
        Ok(self.snapshot().await?.into_map())
    }

    async fn update_health(&self, name: &str, healthy: bool) -> Result<()> {
        let service = name.to_string();
        let found = self
            .mutate(move |table| table.mark_health(&service, healthy, Utc::now()))
            .await?;
        if !found {
            debug!(service = %name, "Health update for unregistered service ignored");
        }
        Ok(())
    }

    async fn heartbeat(&self, name: &str, uptime_secs: Option<u64>) -> Result<bool> {
        let service = name.to_string();
        self.mutate(move |table| table.touch(&service, uptime_secs, Utc::now()))
            .await
    }

    async fn unregister(&self, name: &str, owner: Option<u32>) -> Result<Removal> {
        let service = name.to_string();
        let removal = self
            .mutate(move |table| table.remove(&service, owner))
            .await?;
        match &removal {
            Removal::Removed(_) => info!(service = %name, "Service unregistered"),
            Removal::OwnerMismatch { owner: holder } => warn!(
                service = %name,
                requested_by = ?owner,
                held_by = ?holder,
                "Unregister skipped, entry belongs to another owner"
            ),
            Removal::NotFound => {}
        }
        Ok(removal)
    }

    async fn cleanup_stale(&self, max_age: Duration) -> Result<Vec<String>> {
        let removed = self
            .mutate(move |table| table.remove_stale(max_age, Utc::now()))
            .await?;
        for name in &removed {
            warn!(service = %name, "Removed stale registry entry");
        }
        Ok(removed)
    }
}
