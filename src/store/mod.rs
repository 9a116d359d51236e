//! Backing store abstraction for static and dynamic secrets.
//!
//! The broker talks to its secret store through the [`SecretStore`] trait:
//! - **Static secrets** live at flat KV paths holding string maps. Every write
//!   replaces the full map and the store assigns a new version.
//! - **Dynamic leases** are issued per database role and revoked by lease id.
//!
//! Two implementations exist: [`VaultStore`] (HashiCorp Vault KV v2 plus the
//! database secrets engine) and [`InMemoryStore`] for tests and local
//! development. Credentials issued by either can be checked against the target
//! database through a [`ConnectionTester`].
//!
//! Every fallible call distinguishes [`Error::NotFound`] from
//! [`Error::StoreUnavailable`] so callers can tell "absent" from "unreachable".
//!
//! [`Error::NotFound`]: crate::errors::Error::NotFound
//! [`Error::StoreUnavailable`]: crate::errors::Error::StoreUnavailable

pub mod connection;
pub mod memory;
pub mod types;
pub mod vault;

pub use connection::{ConnectionTester, FixedConnectionTester, PostgresConnectionTester};
pub use memory::InMemoryStore;
pub use types::{Credential, EngineStatus, IssuedLease, SecretData, SecretVersion, StaticSecret};
pub use vault::VaultStore;

use async_trait::async_trait;

use crate::errors::{Error, Result};

/// Operations the broker needs from a secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Short name used in logs and diagnostics (`vault`, `memory`).
    fn backend_name(&self) -> &'static str;

    /// Cheap reachability probe used at startup and by `/health`.
    async fn ping(&self) -> Result<()>;

    /// Reads the latest version of a static path.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the path does not exist
    /// - [`Error::StoreUnavailable`] if the store cannot be reached
    async fn read_static(&self, path: &str) -> Result<StaticSecret>;

    /// Replaces the full contents of a static path, creating it if needed.
    ///
    /// Returns the version the store assigned to this write.
    async fn write_static(&self, path: &str, data: &SecretData) -> Result<SecretVersion>;

    /// Removes one key by rewriting the remaining map.
    ///
    /// Removing the last key leaves the path in place with an empty map.
    /// Callers that need atomicity must serialize writes to `path` themselves.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the path or the key is absent
    async fn delete_static_key(&self, path: &str, key: &str) -> Result<StaticSecret> {
        let mut secret = self.read_static(path).await?;
        if secret.data.remove(key).is_none() {
            return Err(Error::not_found(format!("Key '{}' not found in {}", key, path)));
        }
        secret.metadata = self.write_static(path, &secret.data).await?;
        Ok(secret)
    }

    /// Removes a static path with all of its versions and metadata.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the path does not exist
    async fn delete_static_path(&self, path: &str) -> Result<()>;

    /// Lists top-level static paths.
    async fn list_static_paths(&self) -> Result<Vec<String>>;

    /// Issues a new lease for a database role.
    ///
    /// # Errors
    ///
    /// - [`Error::IssueFailed`] if the store rejects or fails the issuance
    /// - [`Error::StoreUnavailable`] if the store cannot be reached
    async fn issue_lease(&self, role: &str) -> Result<IssuedLease>;

    /// Revokes a previously issued lease.
    async fn revoke_lease(&self, lease_id: &str) -> Result<()>;

    /// Mounted engines and database roles, for diagnostics only.
    async fn engine_status(&self) -> Result<EngineStatus>;
}
