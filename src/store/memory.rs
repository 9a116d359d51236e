//! In-process secret store.
//!
//! Keeps real version counters and lease bookkeeping so the broker can run
//! without Vault (`BROKER_STORE_BACKEND=memory`) and so tests can observe how
//! often leases were issued.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;

use crate::errors::{Error, Result};

use super::{
    Credential, EngineStatus, IssuedLease, SecretData, SecretStore, SecretVersion, StaticSecret,
};

#[derive(Debug, Clone)]
struct StoredPath {
    data: SecretData,
    version: SecretVersion,
}

/// In-memory [`SecretStore`].
#[derive(Debug)]
pub struct InMemoryStore {
    paths: DashMap<String, StoredPath>,
    leases: DashMap<String, String>,
    issue_calls: DashMap<String, u64>,
    lease_seq: AtomicU64,
    /// Issuable roles; `None` accepts any role
    roles: Option<HashSet<String>>,
    failing_roles: DashMap<String, String>,
    lease_duration: Duration,
    issue_delay: Option<Duration>,
    unavailable: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            paths: DashMap::new(),
            leases: DashMap::new(),
            issue_calls: DashMap::new(),
            lease_seq: AtomicU64::new(0),
            roles: None,
            failing_roles: DashMap::new(),
            lease_duration: Duration::from_secs(3600),
            issue_delay: None,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Only issue leases for these roles.
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    /// Lease duration reported for issued leases.
    pub fn with_lease_duration(mut self, duration: Duration) -> Self {
        self.lease_duration = duration;
        self
    }

    /// Delay every issuance, widening the window for concurrent callers.
    pub fn with_issue_delay(mut self, delay: Duration) -> Self {
        self.issue_delay = Some(delay);
        self
    }

    /// Seed a static path as if it had been written once.
    pub fn seed_static(&self, path: &str, data: SecretData) {
        let version = SecretVersion { version: 1, created_time: Utc::now() };
        self.paths.insert(path.to_string(), StoredPath { data, version });
    }

    /// Make issuance for `role` fail with [`Error::IssueFailed`].
    pub fn fail_role(&self, role: &str, message: &str) {
        self.failing_roles.insert(role.to_string(), message.to_string());
    }

    pub fn clear_failure(&self, role: &str) {
        self.failing_roles.remove(role);
    }

    /// Toggle simulated unavailability for every operation.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `issue_lease` calls made for `role`.
    pub fn issue_count(&self, role: &str) -> u64 {
        self.issue_calls.get(role).map(|c| *c).unwrap_or(0)
    }

    /// Whether a lease id is still outstanding.
    pub fn is_lease_active(&self, lease_id: &str) -> bool {
        self.leases.contains_key(lease_id)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::store_unavailable("in-memory store is marked unavailable"));
        }
        Ok(())
    }

    fn generate_password() -> String {
        let random_bytes: Vec<u8> = {
            let mut rng = rand::thread_rng();
            (0..24).map(|_| rng.gen()).collect()
        };
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&random_bytes)
    }
}

#[async_trait]
impl SecretStore for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn read_static(&self, path: &str) -> Result<StaticSecret> {
        self.check_available()?;
        let entry = self
            .paths
            .get(path)
            .ok_or_else(|| Error::not_found(format!("Secret path '{}' not found", path)))?;
        Ok(StaticSecret {
            path: path.to_string(),
            data: entry.data.clone(),
            metadata: entry.version.clone(),
        })
    }

    async fn write_static(&self, path: &str, data: &SecretData) -> Result<SecretVersion> {
        self.check_available()?;
        let mut entry = self.paths.entry(path.to_string()).or_insert_with(|| StoredPath {
            data: SecretData::new(),
            version: SecretVersion { version: 0, created_time: Utc::now() },
        });
        entry.data = data.clone();
        entry.version =
            SecretVersion { version: entry.version.version + 1, created_time: Utc::now() };
        Ok(entry.version.clone())
    }

    async fn delete_static_path(&self, path: &str) -> Result<()> {
        self.check_available()?;
        self.paths
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("Secret path '{}' not found", path)))
    }

    async fn list_static_paths(&self) -> Result<Vec<String>> {
        self.check_available()?;
        let mut paths: Vec<String> = self.paths.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        Ok(paths)
    }

    async fn issue_lease(&self, role: &str) -> Result<IssuedLease> {
        self.check_available()?;
        *self.issue_calls.entry(role.to_string()).or_insert(0) += 1;

        if let Some(delay) = self.issue_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failing_roles.get(role) {
            return Err(Error::issue_failed(role, message.value().clone()));
        }
        if let Some(roles) = &self.roles {
            if !roles.contains(role) {
                return Err(Error::issue_failed(role, format!("unknown role \"{}\"", role)));
            }
        }

        let seq = self.lease_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let lease_id = format!("database/creds/{}/{}", role, uuid::Uuid::new_v4());
        let credential: Credential = [
            ("username".to_string(), format!("v-memory-{}-{}", role, seq)),
            ("password".to_string(), Self::generate_password()),
        ]
        .into_iter()
        .collect();

        self.leases.insert(lease_id.clone(), role.to_string());

        Ok(IssuedLease {
            lease_id,
            credential,
            lease_duration: self.lease_duration,
            renewable: true,
        })
    }

    async fn revoke_lease(&self, lease_id: &str) -> Result<()> {
        self.check_available()?;
        self.leases
            .remove(lease_id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("Lease '{}' not found", lease_id)))
    }

    async fn engine_status(&self) -> Result<EngineStatus> {
        self.check_available()?;
        let mut database_roles: Vec<String> =
            self.roles.iter().flat_map(|r| r.iter().cloned()).collect();
        database_roles.sort();
        Ok(EngineStatus {
            mounts: vec!["database/".to_string(), "secret/".to_string()],
            database_mounted: true,
            database_roles,
            database_roles_error: None,
        })
    }
}
