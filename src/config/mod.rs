//! # Configuration Management
//!
//! Broker configuration is assembled from environment variables (after
//! `dotenvy` has loaded any `.env` file) plus an optional TOML roles file.

pub mod roles;
pub mod settings;

pub use roles::{default_roles, load_roles_file, parse_roles, validate_roles, RoleConfig};
pub use settings::{
    ApiServerConfig, ObservabilityConfig, StoreBackend, TargetDatabaseConfig, VaultConfig,
};

use std::path::PathBuf;

use validator::Validate;

use crate::errors::{Error, Result};

/// Static paths probed when listing the KV mount is not possible.
pub const DEFAULT_STATIC_PATHS: [&str; 3] = ["api", "app", "db"];

/// Complete broker configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiServerConfig,
    pub vault: VaultConfig,
    pub target_database: TargetDatabaseConfig,
    pub roles: Vec<RoleConfig>,
    /// Static paths always present in the catalog, whether or not listing works
    pub known_static_paths: Vec<String>,
    pub store_backend: StoreBackend,
}

impl Default for Config {
    fn default() -> Self {
        let target_database = TargetDatabaseConfig::default();
        Self {
            api: ApiServerConfig::default(),
            vault: VaultConfig::default(),
            roles: default_roles(&target_database),
            target_database,
            known_static_paths: DEFAULT_STATIC_PATHS.iter().map(|p| p.to_string()).collect(),
            store_backend: StoreBackend::default(),
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let target_database = TargetDatabaseConfig::from_env();

        let roles = match std::env::var("BROKER_ROLES_FILE") {
            Ok(path) => load_roles_file(&PathBuf::from(path))?,
            Err(_) => default_roles(&target_database),
        };

        let known_static_paths = std::env::var("BROKER_STATIC_PATHS")
            .map(|s| {
                s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect()
            })
            .unwrap_or_else(|_| DEFAULT_STATIC_PATHS.iter().map(|p| p.to_string()).collect());

        let store_backend = match std::env::var("BROKER_STORE_BACKEND") {
            Ok(value) => value.parse::<StoreBackend>().map_err(Error::config)?,
            Err(_) => StoreBackend::default(),
        };

        let config = Self {
            api: ApiServerConfig::from_env(),
            vault: VaultConfig::from_env(),
            target_database,
            roles,
            known_static_paths,
            store_backend,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate every section plus cross-section rules
    pub fn validate(&self) -> Result<()> {
        Validate::validate(&self.api)?;
        Validate::validate(&self.vault)?;
        Validate::validate(&self.target_database)?;
        validate_roles(&self.roles)?;

        if self.store_backend == StoreBackend::Vault && self.vault.token.is_none() {
            return Err(Error::config("VAULT_TOKEN must be set when using the vault store backend"));
        }

        for path in &self.known_static_paths {
            if path.is_empty() || path.contains('/') {
                return Err(Error::config(format!("Invalid static path '{}'", path)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.roles.len(), 2);
        assert_eq!(config.known_static_paths, vec!["api", "app", "db"]);
        assert_eq!(config.store_backend, StoreBackend::Vault);
    }

    #[test]
    fn test_vault_backend_requires_token() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.vault.token = Some("root".to_string());
        assert!(config.validate().is_ok());

        let config = Config { store_backend: StoreBackend::Memory, ..Config::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_nested_static_path() {
        let config = Config {
            store_backend: StoreBackend::Memory,
            known_static_paths: vec!["api".to_string(), "team/db".to_string()],
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("team/db"));
    }

    #[test]
    fn test_config_from_env() {
        std::env::set_var("BROKER_STORE_BACKEND", "memory");
        std::env::set_var("BROKER_API_PORT", "8100");
        std::env::set_var("BROKER_STATIC_PATHS", "api, app");

        let config = Config::from_env().unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.api.port, 8100);
        assert_eq!(config.known_static_paths, vec!["api", "app"]);

        std::env::remove_var("BROKER_STORE_BACKEND");
        std::env::remove_var("BROKER_API_PORT");
        std::env::remove_var("BROKER_STATIC_PATHS");
    }
}
