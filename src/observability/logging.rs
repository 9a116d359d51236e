//! # Structured Logging
//!
//! Sets up the global `tracing` subscriber. `RUST_LOG` wins over the configured
//! level, and JSON output is used when `BROKER_JSON_LOGGING` is enabled.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Build the filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{level},tower_http=info,sqlx=warn,hyper=warn",
            level = config.log_level
        ))
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true).with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| Error::config(format!("Failed to initialize logging: {}", e)))
}

/// Log the effective configuration without any secret material.
pub fn log_config_info(config: &crate::config::Config) {
    tracing::info!(
        api_address = %config.api.socket_address(),
        store_backend = ?config.store_backend,
        vault_address = %config.vault.address,
        kv_mount = %config.vault.kv_mount,
        database_mount = %config.vault.database_mount,
        roles = ?config.roles.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        static_paths = ?config.known_static_paths,
        "Loaded broker configuration"
    );
}
