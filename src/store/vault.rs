//! HashiCorp Vault secret store.
//!
//! Static secrets live in a KV v2 mount (default `secret`). Dynamic
//! credentials come from the database secrets engine (default `database`).
//!
//! KV and `sys` operations go through `vaultrs`. Credential issuance and lease
//! revocation call the HTTP API directly with `reqwest`, because the lease
//! envelope (`lease_id`, `lease_duration`, `renewable`) is needed and the typed
//! `vaultrs` database helper drops it.
//!
//! # Example
//!
//! ```rust,ignore
//! use secrets_broker::config::VaultConfig;
//! use secrets_broker::store::{SecretStore, VaultStore};
//!
//! let store = VaultStore::connect(VaultConfig::from_env()).await?;
//! let secret = store.read_static("api").await?;
//! let lease = store.issue_lease("readonly").await?;
//! ```
//!
//! # Errors
//!
//! - A Vault `404` maps to [`Error::NotFound`]
//! - Transport failures, `5xx` answers and per-call timeouts map to
//!   [`Error::StoreUnavailable`]
//! - Any other rejection of a credential request maps to [`Error::IssueFailed`]

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use crate::config::VaultConfig;
use crate::errors::{Error, Result};
use crate::observability::MetricsRecorder;

use super::{
    Credential, EngineStatus, IssuedLease, SecretData, SecretStore, SecretVersion, StaticSecret,
};

/// Vault-backed [`SecretStore`].
pub struct VaultStore {
    client: VaultClient,
    http: reqwest::Client,
    address: String,
    token: Option<String>,
    namespace: Option<String>,
    kv_mount: String,
    database_mount: String,
    timeout: Duration,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("address", &self.address)
            .field("kv_mount", &self.kv_mount)
            .field("database_mount", &self.database_mount)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Vault response envelope for `GET {mount}/creds/{role}`.
#[derive(Debug, Deserialize)]
struct LeaseEnvelope {
    #[serde(default)]
    lease_id: String,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
    data: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct VaultErrors {
    #[serde(default)]
    errors: Vec<String>,
}

impl VaultStore {
    /// Builds the client without contacting Vault.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the address or client settings are invalid
    pub fn new(config: VaultConfig) -> Result<Self> {
        if config.address.is_empty() {
            return Err(Error::config("Vault address cannot be empty"));
        }

        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.address);

        if let Some(ref token) = config.token {
            settings_builder.token(token);
        }

        if let Some(ref namespace) = config.namespace {
            settings_builder.namespace(Some(namespace.clone()));
        }

        let settings = settings_builder
            .build()
            .map_err(|e| Error::config(format!("Invalid Vault configuration: {}", e)))?;

        let client = VaultClient::new(settings)
            .map_err(|e| Error::config(format!("Failed to create Vault client: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            http,
            address: config.address.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            namespace: config.namespace.clone(),
            kv_mount: config.kv_mount.clone(),
            database_mount: config.database_mount.clone(),
            timeout: config.request_timeout(),
            metrics: MetricsRecorder::new(),
        })
    }

    /// Builds the client and waits until Vault answers its health endpoint,
    /// retrying `connect_attempts` times.
    ///
    /// # Errors
    ///
    /// - [`Error::StoreUnavailable`] if Vault never becomes reachable
    pub async fn connect(config: VaultConfig) -> Result<Self> {
        let attempts = config.connect_attempts.max(1);
        let delay = config.connect_retry_delay();
        let store = Self::new(config)?;

        for attempt in 1..=attempts {
            match store.ping().await {
                Ok(()) => {
                    tracing::info!(
                        address = %store.address,
                        attempt,
                        "Successfully connected to Vault"
                    );
                    return Ok(store);
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        error = %e,
                        address = %store.address,
                        attempt,
                        max_attempts = attempts,
                        "Vault not reachable yet, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        address = %store.address,
                        "Failed to connect to Vault"
                    );
                    return Err(Error::store_unavailable(format!(
                        "Vault not available after {} attempts: {}",
                        attempts, e
                    )));
                }
            }
        }

        Err(Error::store_unavailable("Vault not available"))
    }

    /// Runs one store call under the per-call timeout and records its outcome.
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::store_unavailable(format!(
                "Vault {} timed out after {}s",
                operation,
                self.timeout.as_secs()
            ))),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(Error::NotFound(_)) => "not_found",
            Err(_) => "error",
        };
        self.metrics.record_store_call(operation, outcome, start.elapsed().as_secs_f64());
        result
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, self.api_url(path));
        if let Some(ref token) = self.token {
            builder = builder.header("X-Vault-Token", token);
        }
        if let Some(ref namespace) = self.namespace {
            builder = builder.header("X-Vault-Namespace", namespace);
        }
        builder
    }

    async fn fetch_lease(&self, role: &str) -> Result<IssuedLease> {
        let path = format!("{}/creds/{}", self.database_mount, role);
        tracing::debug!(role = %role, path = %path, "Requesting dynamic credentials from Vault");

        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|e| {
                Error::store_unavailable(format!("Vault request to {} failed: {}", path, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            tracing::error!(
                role = %role,
                status = status.as_u16(),
                errors = %body,
                "Vault rejected credential request"
            );
            if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
                return Err(Error::store_unavailable(format!(
                    "Vault is sealed or in standby: {}",
                    body
                )));
            }
            return Err(Error::issue_failed(
                role,
                format!("Vault returned {}: {}", status.as_u16(), body),
            ));
        }

        let envelope: LeaseEnvelope = response
            .json()
            .await
            .map_err(|e| {
                Error::issue_failed(role, format!("Malformed credential response: {}", e))
            })?;

        let credential: Credential = envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect();

        if credential.is_empty() {
            return Err(Error::issue_failed(role, "Vault returned no credential data"));
        }

        Ok(IssuedLease {
            lease_id: envelope.lease_id,
            credential,
            lease_duration: Duration::from_secs(envelope.lease_duration),
            renewable: envelope.renewable,
        })
    }

    async fn put_revoke(&self, lease_id: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::PUT, "sys/leases/revoke")
            .json(&serde_json::json!({ "lease_id": lease_id }))
            .send()
            .await
            .map_err(|e| {
                Error::store_unavailable(format!("Vault lease revocation failed: {}", e))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status.is_server_error() {
            return Err(Error::store_unavailable(format!(
                "Vault returned {} revoking lease",
                status.as_u16()
            )));
        }
        let body = error_body(response).await;
        Err(Error::not_found(format!("Lease '{}' could not be revoked: {}", lease_id, body)))
    }
}

/// Joined `errors` array of a failed Vault response, or empty.
async fn error_body(response: reqwest::Response) -> String {
    response.json::<VaultErrors>().await.map(|b| b.errors.join("; ")).unwrap_or_default()
}

/// Map a `vaultrs` error for a KV operation on `path`.
fn map_kv_error(err: ClientError, path: &str, action: &str) -> Error {
    match err {
        ClientError::APIError { code: 404, .. } => {
            Error::not_found(format!("Secret path '{}' not found", path))
        }
        ClientError::APIError { code, errors } if code >= 500 => {
            tracing::error!(path = %path, code, errors = ?errors, "Vault failed to {}", action);
            Error::store_unavailable(format!(
                "Vault returned {} for {}: {}",
                code,
                path,
                errors.join("; ")
            ))
        }
        ClientError::APIError { code, errors } => {
            tracing::error!(path = %path, code, errors = ?errors, "Vault refused to {}", action);
            Error::internal(format!(
                "Vault refused to {} '{}' ({}): {}",
                action,
                path,
                code,
                errors.join("; ")
            ))
        }
        other => {
            tracing::error!(
                path = %path,
                error = %other,
                "Vault request failed while trying to {}",
                action
            );
            Error::store_unavailable(format!("Failed to {} '{}': {}", action, path, other))
        }
    }
}

/// RFC 3339 timestamp from Vault metadata. Falls back to now when Vault
/// sends something unparseable.
fn parse_vault_time(value: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            tracing::warn!(value = %value, error = %e, "Unparseable Vault timestamp, using now");
            Utc::now()
        }
    }
}

#[async_trait]
impl SecretStore for VaultStore {
    fn backend_name(&self) -> &'static str {
        "vault"
    }

    async fn ping(&self) -> Result<()> {
        self.call("ping", async {
            vaultrs::sys::health(&self.client)
                .await
                .map(|_| ())
                .map_err(|e| Error::store_unavailable(format!("Vault health check failed: {}", e)))
        })
        .await
    }

    async fn read_static(&self, path: &str) -> Result<StaticSecret> {
        self.call("read_static", async {
            // Pin the version from metadata so data and version always agree
            let metadata = kv2::read_metadata(&self.client, &self.kv_mount, path)
                .await
                .map_err(|e| map_kv_error(e, path, "read metadata of"))?;

            let data: HashMap<String, String> =
                kv2::read_version(&self.client, &self.kv_mount, path, metadata.current_version)
                    .await
                    .map_err(|e| map_kv_error(e, path, "read"))?;

            Ok(StaticSecret {
                path: path.to_string(),
                data: data.into_iter().collect(),
                metadata: SecretVersion {
                    version: metadata.current_version,
                    created_time: parse_vault_time(&metadata.updated_time),
                },
            })
        })
        .await
    }

    async fn write_static(&self, path: &str, data: &SecretData) -> Result<SecretVersion> {
        self.call("write_static", async {
            let written = kv2::set(&self.client, &self.kv_mount, path, data)
                .await
                .map_err(|e| map_kv_error(e, path, "write"))?;

            tracing::info!(
                path = %path,
                version = written.version,
                mount = %self.kv_mount,
                "Stored static secret in Vault"
            );
            Ok(SecretVersion {
                version: written.version,
                created_time: parse_vault_time(&written.created_time),
            })
        })
        .await
    }

    async fn delete_static_path(&self, path: &str) -> Result<()> {
        self.call("delete_static_path", async {
            // delete_metadata succeeds on absent paths, so check first
            kv2::read_metadata(&self.client, &self.kv_mount, path)
                .await
                .map_err(|e| map_kv_error(e, path, "read metadata of"))?;

            kv2::delete_metadata(&self.client, &self.kv_mount, path)
                .await
                .map_err(|e| map_kv_error(e, path, "delete"))?;

            tracing::info!(
                path = %path,
                mount = %self.kv_mount,
                "Deleted static secret and all versions from Vault"
            );
            Ok(())
        })
        .await
    }

    async fn list_static_paths(&self) -> Result<Vec<String>> {
        self.call("list_static_paths", async {
            match kv2::list(&self.client, &self.kv_mount, "").await {
                Ok(keys) => {
                    // Folders end in '/', static paths are flat
                    let mut paths: Vec<String> =
                        keys.into_iter().filter(|k| !k.ends_with('/')).collect();
                    paths.sort();
                    Ok(paths)
                }
                Err(ClientError::APIError { code: 404, .. }) => Ok(Vec::new()),
                Err(e) => Err(map_kv_error(e, "", "list")),
            }
        })
        .await
    }

    async fn issue_lease(&self, role: &str) -> Result<IssuedLease> {
        let lease = self.call("issue_lease", self.fetch_lease(role)).await?;
        tracing::info!(
            role = %role,
            lease_id = %lease.lease_id,
            lease_duration_secs = lease.lease_duration.as_secs(),
            "Issued dynamic credentials from Vault"
        );
        Ok(lease)
    }

    async fn revoke_lease(&self, lease_id: &str) -> Result<()> {
        self.call("revoke_lease", self.put_revoke(lease_id)).await?;
        tracing::info!(lease_id = %lease_id, "Revoked lease in Vault");
        Ok(())
    }

    async fn engine_status(&self) -> Result<EngineStatus> {
        let mounts = self
            .call("list_mounts", async {
                vaultrs::sys::mount::list(&self.client)
                    .await
                    .map_err(|e| map_kv_error(e, "sys/mounts", "list"))
            })
            .await?;

        let mut mount_names: Vec<String> = mounts.into_keys().collect();
        mount_names.sort();

        let database_mount = format!("{}/", self.database_mount);
        let database_mounted = mount_names.iter().any(|m| *m == database_mount);

        let mut status = EngineStatus {
            mounts: mount_names,
            database_mounted,
            ..Default::default()
        };

        if database_mounted {
            let roles = self
                .call("list_database_roles", async {
                    vaultrs::database::role::list(&self.client, &self.database_mount)
                        .await
                        .map_err(|e| map_kv_error(e, "database/roles", "list"))
                })
                .await;
            match roles {
                Ok(response) => status.database_roles = response.keys,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to list database roles");
                    status.database_roles_error = Some(e.to_string());
                }
            }
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn config(address: &str) -> VaultConfig {
        VaultConfig {
            address: address.to_string(),
            token: Some("root".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_rejects_empty_address() {
        let err = VaultStore::new(config("")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let store = VaultStore::new(config("http://127.0.0.1:8200")).unwrap();
        let rendered = format!("{:?}", store);
        assert!(!rendered.contains("root"));
        assert!(rendered.contains("127.0.0.1:8200"));
    }

    #[test]
    fn test_api_url_strips_trailing_slash() {
        let store = VaultStore::new(config("http://vault:8200/")).unwrap();
        assert_eq!(
            store.api_url("database/creds/readonly"),
            "http://vault:8200/v1/database/creds/readonly"
        );
    }

    #[test]
    fn test_map_kv_error() {
        let not_found =
            map_kv_error(ClientError::APIError { code: 404, errors: vec![] }, "db", "read");
        assert!(matches!(not_found, Error::NotFound(_)));

        let sealed = map_kv_error(
            ClientError::APIError { code: 503, errors: vec!["Vault is sealed".to_string()] },
            "db",
            "read",
        );
        assert!(sealed.is_store_unavailable());

        let denied = map_kv_error(
            ClientError::APIError { code: 403, errors: vec!["permission denied".to_string()] },
            "db",
            "read",
        );
        assert!(matches!(denied, Error::Internal(_)));
    }

    #[test]
    fn test_parse_vault_time() {
        let parsed = parse_vault_time("2018-03-22T02:24:06.945319214Z");
        assert_eq!(parsed.to_rfc3339(), "2018-03-22T02:24:06.945319214+00:00");
    }

    #[test]
    #[traced_test]
    fn test_unparseable_vault_time_is_logged() {
        let before = Utc::now();
        let parsed = parse_vault_time("not-a-time");
        assert!(parsed >= before);
        assert!(logs_contain("Unparseable Vault timestamp"));
    }
}
