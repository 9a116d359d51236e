//! Static secret business logic
//!
//! CRUD over flat KV paths with create-vs-merge semantics. Every
//! read-modify-write holds the path's lock for its whole duration, so two
//! concurrent edits to the same path cannot lose each other's keys.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::errors::{Error, Result};
use crate::observability::MetricsRecorder;
use crate::store::{SecretData, SecretStore, StaticSecret};

use super::path_locks::KeyedLocks;

/// Reject empty or nested identifiers before they reach the store.
pub fn validate_identifier(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", kind)));
    }
    if value.contains('/') {
        return Err(Error::validation(format!("{} '{}' cannot contain '/'", kind, value)));
    }
    Ok(())
}

fn validate_path_and_key(path: &str, key: &str) -> Result<()> {
    validate_identifier("Secret path", path)?;
    if key.is_empty() {
        return Err(Error::validation("Secret key cannot be empty"));
    }
    Ok(())
}

/// Service for static secret paths
pub struct StaticSecretService {
    store: Arc<dyn SecretStore>,
    locks: KeyedLocks,
    known_paths: Vec<String>,
    metrics: MetricsRecorder,
}

impl StaticSecretService {
    /// `known_paths` are read even when the store cannot list its paths.
    pub fn new(store: Arc<dyn SecretStore>, known_paths: Vec<String>) -> Self {
        Self { store, locks: KeyedLocks::new(), known_paths, metrics: MetricsRecorder::new() }
    }

    pub fn known_paths(&self) -> &[String] {
        &self.known_paths
    }

    /// Get the latest version of a static path
    #[instrument(skip(self))]
    pub async fn get(&self, path: &str) -> Result<StaticSecret> {
        validate_identifier("Secret path", path)?;
        self.store.read_static(path).await
    }

    /// Paths discovered in the store plus the configured ones.
    ///
    /// Listing failures other than unavailability fall back to the
    /// configured paths.
    pub async fn discover_paths(&self) -> Result<Vec<String>> {
        let mut paths: BTreeSet<String> = self.known_paths.iter().cloned().collect();
        match self.store.list_static_paths().await {
            Ok(listed) => paths.extend(listed),
            Err(e) if e.is_store_unavailable() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Listing static secrets failed, using configured paths only");
            }
        }
        Ok(paths.into_iter().collect())
    }

    /// Every readable static secret.
    ///
    /// Paths that do not exist (configured but never written, or deleted
    /// between listing and reading) are skipped.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<StaticSecret>> {
        let paths = self.discover_paths().await?;

        let mut secrets = Vec::with_capacity(paths.len());
        for path in paths {
            match self.store.read_static(&path).await {
                Ok(secret) => secrets.push(secret),
                Err(Error::NotFound(_)) => continue,
                Err(e) if e.is_store_unavailable() => return Err(e),
                Err(e) => {
                    warn!(path = %path, error = %e, "Skipping unreadable static secret");
                }
            }
        }
        Ok(secrets)
    }

    /// Insert or overwrite one key, creating the path if it does not exist.
    #[instrument(skip(self, value))]
    pub async fn create_or_merge_key(
        &self,
        path: &str,
        key: &str,
        value: &str,
    ) -> Result<StaticSecret> {
        validate_path_and_key(path, key)?;
        let _guard = self.locks.lock(path).await;

        let mut data = match self.store.read_static(path).await {
            Ok(secret) => secret.data,
            Err(Error::NotFound(_)) => SecretData::new(),
            Err(e) => return Err(e),
        };
        data.insert(key.to_string(), value.to_string());

        let metadata = self.store.write_static(path, &data).await?;
        self.metrics.record_static_write("merge_key");
        info!(path = %path, key = %key, version = metadata.version, "Static secret key written");

        Ok(StaticSecret { path: path.to_string(), data, metadata })
    }

    /// Create a new path with its full initial contents.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyExists`] if the path exists, even with no keys
    #[instrument(skip(self, initial_data), fields(keys = initial_data.len()))]
    pub async fn create_path(&self, path: &str, initial_data: SecretData) -> Result<StaticSecret> {
        validate_identifier("Secret path", path)?;
        if initial_data.keys().any(|k| k.is_empty()) {
            return Err(Error::validation("Secret key cannot be empty"));
        }
        let _guard = self.locks.lock(path).await;

        match self.store.read_static(path).await {
            Ok(_) => {
                return Err(Error::already_exists(format!("Secret type '{}' already exists", path)));
            }
            Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let metadata = self.store.write_static(path, &initial_data).await?;
        self.metrics.record_static_write("create_path");
        info!(path = %path, version = metadata.version, "Static secret path created");

        Ok(StaticSecret { path: path.to_string(), data: initial_data, metadata })
    }

    /// Overwrite an existing key.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the path or the key is absent
    #[instrument(skip(self, value))]
    pub async fn update_key(&self, path: &str, key: &str, value: &str) -> Result<StaticSecret> {
        validate_path_and_key(path, key)?;
        let _guard = self.locks.lock(path).await;

        let mut data = self.store.read_static(path).await?.data;
        match data.get_mut(key) {
            Some(existing) => *existing = value.to_string(),
            None => {
                return Err(Error::not_found(format!("Key '{}' not found in {}", key, path)));
            }
        }

        let metadata = self.store.write_static(path, &data).await?;
        self.metrics.record_static_write("update_key");
        info!(path = %path, key = %key, version = metadata.version, "Static secret key updated");

        Ok(StaticSecret { path: path.to_string(), data, metadata })
    }

    /// Remove one key. Removing the last key leaves an empty path behind.
    #[instrument(skip(self))]
    pub async fn delete_key(&self, path: &str, key: &str) -> Result<StaticSecret> {
        validate_path_and_key(path, key)?;
        let _guard = self.locks.lock(path).await;

        let secret = self.store.delete_static_key(path, key).await?;
        self.metrics.record_static_write("delete_key");
        info!(
            path = %path,
            key = %key,
            remaining = secret.data.len(),
            version = secret.metadata.version,
            "Static secret key deleted"
        );
        Ok(secret)
    }

    /// Remove a path with all of its versions.
    #[instrument(skip(self))]
    pub async fn delete_path(&self, path: &str) -> Result<()> {
        validate_identifier("Secret path", path)?;
        let _guard = self.locks.lock(path).await;

        self.store.delete_static_path(path).await?;
        self.metrics.record_static_write("delete_path");
        info!(path = %path, "Static secret path deleted");
        Ok(())
    }
}
