//! Aggregation across static and dynamic secrets
//!
//! Read-only composites recomputed on every request. Nothing here owns state;
//! each section of a composite fails on its own and reports its own error.

use std::sync::Arc;

use serde::Serialize;
use tracing::{instrument, warn};

use crate::config::RoleConfig;
use crate::errors::Result;
use crate::leases::{LeaseSummary, LeaseView};
use crate::store::{EngineStatus, SecretStore, StaticSecret};

use super::dynamic_credential_service::DynamicCredentialService;
use super::static_secret_service::StaticSecretService;

/// One discoverable secret and where to fetch it.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    pub endpoint: String,
    pub secret_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ttl_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub available_dynamic_secrets: Vec<CatalogEntry>,
    pub available_static_secrets: Vec<CatalogEntry>,
    /// Set when the store could not be asked for its paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_error: Option<String>,
}

/// Every static secret plus one result per configured role.
#[derive(Debug)]
pub struct AggregatedSecrets {
    pub static_secrets: Result<Vec<StaticSecret>>,
    pub dynamic_secrets: Vec<(RoleConfig, Result<LeaseView>)>,
}

/// Role configuration without anything secret, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct RoleSummary {
    pub name: String,
    pub alias: String,
    pub description: String,
    pub default_ttl_seconds: u64,
    pub max_ttl_seconds: u64,
    pub secret_type: String,
    pub rotation: String,
    pub test_connection: bool,
}

impl From<&RoleConfig> for RoleSummary {
    fn from(role: &RoleConfig) -> Self {
        Self {
            name: role.name.clone(),
            alias: role.alias.clone(),
            description: role.description.clone(),
            default_ttl_seconds: role.default_ttl.as_secs(),
            max_ttl_seconds: role.max_ttl.as_secs(),
            secret_type: role.secret_type(),
            rotation: role.rotation(),
            test_connection: role.test_connection,
        }
    }
}

/// Store and cache diagnostics. Never carries credential values.
#[derive(Debug, Clone, Serialize)]
pub struct DebugReport {
    pub backend: &'static str,
    pub vault_connected: bool,
    pub secrets_engines: Vec<String>,
    pub database_mounted: bool,
    pub database_roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_roles_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_error: Option<String>,
    pub static_secrets_count: usize,
    pub static_secrets_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_secrets_error: Option<String>,
    pub configured_roles: Vec<RoleSummary>,
    pub leases: Vec<LeaseSummary>,
}

pub struct AggregationService {
    store: Arc<dyn SecretStore>,
    static_secrets: Arc<StaticSecretService>,
    dynamic_credentials: Arc<DynamicCredentialService>,
}

impl AggregationService {
    pub fn new(
        store: Arc<dyn SecretStore>,
        static_secrets: Arc<StaticSecretService>,
        dynamic_credentials: Arc<DynamicCredentialService>,
    ) -> Self {
        Self { store, static_secrets, dynamic_credentials }
    }

    /// Catalog of every configured role and every known static path.
    #[instrument(skip(self))]
    pub async fn list_available(&self) -> Catalog {
        let available_dynamic_secrets = self
            .dynamic_credentials
            .roles()
            .iter()
            .map(|role| CatalogEntry {
                name: role.alias.clone(),
                description: role.description.clone(),
                endpoint: format!("/secrets/{}", role.alias),
                secret_type: role.secret_type(),
                role: Some(role.name.clone()),
                default_ttl_seconds: Some(role.default_ttl.as_secs()),
                max_ttl_seconds: Some(role.max_ttl.as_secs()),
            })
            .collect();

        let (paths, discovery_error) = match self.static_secrets.discover_paths().await {
            Ok(paths) => (paths, None),
            Err(e) => {
                warn!(error = %e, "Static path discovery failed");
                (self.static_secrets.known_paths().to_vec(), Some(e.to_string()))
            }
        };

        let available_static_secrets = paths
            .into_iter()
            .map(|path| {
                let endpoint = if self.dynamic_credentials.role(&path).is_some() {
                    format!("/secrets/static/{}", path)
                } else {
                    format!("/secrets/{}", path)
                };
                CatalogEntry {
                    description: format!("Static {} secrets", path),
                    secret_type: static_secret_type(&path),
                    name: path,
                    endpoint,
                    role: None,
                    default_ttl_seconds: None,
                    max_ttl_seconds: None,
                }
            })
            .collect();

        Catalog { available_dynamic_secrets, available_static_secrets, discovery_error }
    }

    /// One lease result per configured role, fetched concurrently.
    pub async fn dynamic_all(&self) -> Vec<(RoleConfig, Result<LeaseView>)> {
        let roles = self.dynamic_credentials.roles();
        let views = futures::future::join_all(
            roles.iter().map(|role| self.dynamic_credentials.get(&role.name)),
        )
        .await;
        roles.iter().cloned().zip(views).collect()
    }

    /// Static and dynamic secrets together. A failing section or role does
    /// not hide the others.
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> AggregatedSecrets {
        let (static_secrets, dynamic_secrets) =
            futures::join!(self.static_secrets.list_all(), self.dynamic_all());

        if let Err(e) = &static_secrets {
            warn!(error = %e, "Static section of aggregate failed");
        }
        AggregatedSecrets { static_secrets, dynamic_secrets }
    }

    #[instrument(skip(self))]
    pub async fn debug(&self) -> DebugReport {
        let vault_connected = self.store.ping().await.is_ok();

        let (engine, engine_error) = match self.store.engine_status().await {
            Ok(status) => (status, None),
            Err(e) => {
                warn!(error = %e, "Could not read engine status");
                (EngineStatus::default(), Some(e.to_string()))
            }
        };

        let (static_secrets_types, static_secrets_error) =
            match self.static_secrets.list_all().await {
                Ok(secrets) => (secrets.into_iter().map(|s| s.path).collect::<Vec<_>>(), None),
                Err(e) => (Vec::new(), Some(e.to_string())),
            };

        DebugReport {
            backend: self.store.backend_name(),
            vault_connected,
            secrets_engines: engine.mounts,
            database_mounted: engine.database_mounted,
            database_roles: engine.database_roles,
            database_roles_error: engine.database_roles_error,
            engine_error,
            static_secrets_count: static_secrets_types.len(),
            static_secrets_types,
            static_secrets_error,
            configured_roles: self
                .dynamic_credentials
                .roles()
                .iter()
                .map(RoleSummary::from)
                .collect(),
            leases: self.dynamic_credentials.summaries().await,
        }
    }
}

/// Label reported for a static path, e.g. `static_db_secrets`.
pub fn static_secret_type(path: &str) -> String {
    format!("static_{}_secrets", path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::leases::{CacheStatus, ConnectionTest};
    use crate::store::{FixedConnectionTester, InMemoryStore, SecretData};
    use std::time::Duration;

    fn data(pairs: &[(&str, &str)]) -> SecretData {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn build(store: Arc<InMemoryStore>) -> AggregationService {
        let roles = vec![
            RoleConfig::new("readonly", "db", Duration::from_secs(3600)),
            RoleConfig::new("admin", "db-admin", Duration::from_secs(3600)),
        ];
        let known = vec!["api".to_string(), "app".to_string(), "db".to_string()];
        let static_secrets = Arc::new(StaticSecretService::new(store.clone(), known));
        let dynamic = Arc::new(DynamicCredentialService::new(
            store.clone(),
            Arc::new(FixedConnectionTester(ConnectionTest::Untested)),
            roles,
        ));
        AggregationService::new(store, static_secrets, dynamic)
    }

    #[tokio::test]
    async fn test_catalog_lists_roles_and_paths() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_static("payments", data(&[("k", "v")]));
        let service = build(store);

        let catalog = service.list_available().await;
        let dynamic: Vec<&str> =
            catalog.available_dynamic_secrets.iter().map(|e| e.endpoint.as_str()).collect();
        assert_eq!(dynamic, vec!["/secrets/db", "/secrets/db-admin"]);
        assert_eq!(catalog.available_dynamic_secrets[0].default_ttl_seconds, Some(3600));

        let statics: Vec<(&str, &str)> = catalog
            .available_static_secrets
            .iter()
            .map(|e| (e.name.as_str(), e.endpoint.as_str()))
            .collect();
        assert_eq!(
            statics,
            vec![
                ("api", "/secrets/api"),
                ("app", "/secrets/app"),
                ("db", "/secrets/static/db"),
                ("payments", "/secrets/payments"),
            ]
        );
        assert!(catalog.discovery_error.is_none());
    }

    #[tokio::test]
    async fn test_catalog_falls_back_when_store_is_down() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let service = build(store);

        let catalog = service.list_available().await;
        assert_eq!(catalog.available_static_secrets.len(), 3);
        assert!(catalog.discovery_error.is_some());
    }

    #[tokio::test]
    async fn test_get_all_isolates_failing_role() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_static("api", data(&[("stripe", "sk")]));
        store.fail_role("admin", "permission denied");
        let service = build(store);

        let all = service.get_all().await;
        assert_eq!(all.static_secrets.as_ref().unwrap().len(), 1);

        let (readonly, ok) = &all.dynamic_secrets[0];
        assert_eq!(readonly.name, "readonly");
        assert_eq!(ok.as_ref().unwrap().cache_status, CacheStatus::Fresh);

        let (admin, failed) = &all.dynamic_secrets[1];
        assert_eq!(admin.name, "admin");
        assert!(matches!(failed, Err(Error::IssueFailed { .. })));
    }

    #[tokio::test]
    async fn test_debug_report_has_no_credentials() {
        let store = Arc::new(InMemoryStore::new().with_roles(["readonly", "admin"]));
        store.seed_static("db", data(&[("password", "dev_pass")]));
        let service = build(store);

        let view = service.dynamic_credentials.get("readonly").await.unwrap();
        let password = view.lease.credential.password().unwrap().to_string();

        let report = service.debug().await;
        assert!(report.vault_connected);
        assert!(report.database_mounted);
        assert_eq!(report.database_roles, vec!["admin", "readonly"]);
        assert_eq!(report.static_secrets_types, vec!["db"]);
        assert_eq!(report.configured_roles.len(), 2);

        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains(&password));
        assert!(!json.contains("dev_pass"));
    }

    #[tokio::test]
    async fn test_debug_reports_errors_instead_of_failing() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let service = build(store);

        let report = service.debug().await;
        assert!(!report.vault_connected);
        assert!(report.engine_error.is_some());
        assert!(report.static_secrets_error.is_some());
        assert_eq!(report.static_secrets_count, 0);
    }
}
