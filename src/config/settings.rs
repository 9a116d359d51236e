//! # Configuration Settings
//!
//! Configuration sections for the broker. Each section has sane defaults and a
//! `from_env` constructor that falls back to them when a variable is missing or
//! unparsable.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok()).unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name).map(|s| s.to_lowercase() == "true" || s == "1").unwrap_or(default)
}

/// HTTP API server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiServerConfig {
    #[validate(length(min = 1, message = "Bind address cannot be empty"))]
    pub bind_address: String,

    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Dashboard origins allowed by CORS
    pub cors_origins: Vec<String>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl ApiServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("BROKER_CORS_ORIGINS")
            .map(|s| {
                s.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect()
            })
            .unwrap_or(defaults.cors_origins);

        Self {
            bind_address: std::env::var("BROKER_API_BIND_ADDRESS")
                .unwrap_or(defaults.bind_address),
            port: env_or("BROKER_API_PORT", defaults.port),
            cors_origins,
        }
    }

    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Which backing store implementation serves requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Vault,
    /// In-process store for local development without Vault
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vault" => Ok(Self::Vault),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// HashiCorp Vault connection configuration
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct VaultConfig {
    #[validate(length(min = 1, message = "Vault address cannot be empty"))]
    pub address: String,

    pub token: Option<String>,

    pub namespace: Option<String>,

    /// KV v2 mount holding static secrets
    #[validate(length(min = 1, message = "KV mount cannot be empty"))]
    pub kv_mount: String,

    /// Database secrets engine mount issuing dynamic credentials
    #[validate(length(min = 1, message = "Database mount cannot be empty"))]
    pub database_mount: String,

    /// Per-call timeout in seconds
    #[validate(range(
        min = 1,
        max = 120,
        message = "Request timeout must be between 1 and 120 seconds"
    ))]
    pub request_timeout_seconds: u64,

    /// Health-check attempts at startup before giving up
    #[validate(range(min = 1, max = 100, message = "Connect attempts must be between 1 and 100"))]
    pub connect_attempts: u32,

    pub connect_retry_delay_seconds: u64,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("namespace", &self.namespace)
            .field("kv_mount", &self.kv_mount)
            .field("database_mount", &self.database_mount)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("connect_attempts", &self.connect_attempts)
            .finish()
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://vault:8200".to_string(),
            token: None,
            namespace: None,
            kv_mount: "secret".to_string(),
            database_mount: "database".to_string(),
            request_timeout_seconds: 10,
            connect_attempts: 20,
            connect_retry_delay_seconds: 2,
        }
    }
}

impl VaultConfig {
    /// Reads `VAULT_ADDR`, `VAULT_TOKEN`, `VAULT_NAMESPACE`, `VAULT_KV_MOUNT`,
    /// `VAULT_DATABASE_MOUNT` and the `BROKER_VAULT_*` tuning knobs.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            address: std::env::var("VAULT_ADDR").unwrap_or(defaults.address),
            token: std::env::var("VAULT_TOKEN").ok(),
            namespace: std::env::var("VAULT_NAMESPACE").ok(),
            kv_mount: std::env::var("VAULT_KV_MOUNT").unwrap_or(defaults.kv_mount),
            database_mount: std::env::var("VAULT_DATABASE_MOUNT")
                .unwrap_or(defaults.database_mount),
            request_timeout_seconds: env_or(
                "BROKER_VAULT_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            connect_attempts: env_or("BROKER_VAULT_CONNECT_ATTEMPTS", defaults.connect_attempts),
            connect_retry_delay_seconds: env_or(
                "BROKER_VAULT_CONNECT_RETRY_DELAY_SECONDS",
                defaults.connect_retry_delay_seconds,
            ),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_secs(self.connect_retry_delay_seconds)
    }
}

/// Database that issued credentials are validated against
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct TargetDatabaseConfig {
    #[validate(length(min = 1, message = "Database host cannot be empty"))]
    pub host: String,

    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    #[validate(length(min = 1, message = "Database name cannot be empty"))]
    pub database: String,

    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Static login used by `/health` to check the database is reachable.
    /// The check is skipped when either half is unset.
    pub health_username: Option<String>,

    pub health_password: Option<String>,
}

impl Default for TargetDatabaseConfig {
    fn default() -> Self {
        Self {
            host: "postgres".to_string(),
            port: 5432,
            database: "devdb".to_string(),
            connect_timeout_seconds: 5,
            health_username: None,
            health_password: None,
        }
    }
}

impl std::fmt::Debug for TargetDatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetDatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("health_username", &self.health_username)
            .field("health_password", &self.health_password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl TargetDatabaseConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("BROKER_TARGET_DB_HOST").unwrap_or(defaults.host),
            port: env_or("BROKER_TARGET_DB_PORT", defaults.port),
            database: std::env::var("BROKER_TARGET_DB_NAME").unwrap_or(defaults.database),
            connect_timeout_seconds: env_or(
                "BROKER_TARGET_DB_CONNECT_TIMEOUT_SECONDS",
                defaults.connect_timeout_seconds,
            ),
            health_username: std::env::var("BROKER_TARGET_DB_USER").ok(),
            health_password: std::env::var("BROKER_TARGET_DB_PASSWORD").ok(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus exporter
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,

    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: 9090,
            service_name: "secrets-broker".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enable_metrics: env_flag("BROKER_ENABLE_METRICS", defaults.enable_metrics),
            metrics_port: env_or("BROKER_METRICS_PORT", defaults.metrics_port),
            service_name: std::env::var("BROKER_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: std::env::var("BROKER_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: env_flag("BROKER_JSON_LOGGING", defaults.json_logging),
        }
    }

    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}
