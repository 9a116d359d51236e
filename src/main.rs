use std::sync::Arc;

use secrets_broker::{
    api::{start_api_server, ApiState},
    config::{ObservabilityConfig, StoreBackend},
    leases::ConnectionTest,
    observability::{init_observability, log_config_info},
    store::{
        ConnectionTester, FixedConnectionTester, InMemoryStore, PostgresConnectionTester,
        SecretStore, VaultStore,
    },
    Config, Result, APP_NAME, VERSION,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    // This must happen before any config is read from environment
    if let Err(e) = dotenvy::dotenv() {
        // Only warn if the error is NOT "file not found"
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let observability_config = ObservabilityConfig::from_env();
    init_observability(&observability_config)?;

    info!(app_name = APP_NAME, version = VERSION, "Starting secrets broker");

    let config = Config::from_env()?;
    log_config_info(&config);

    let (store, tester): (Arc<dyn SecretStore>, Arc<dyn ConnectionTester>) =
        match config.store_backend {
            StoreBackend::Vault => {
                let store = VaultStore::connect(config.vault.clone()).await.map_err(|e| {
                    error!(error = %e, vault_addr = %config.vault.address, "Vault not available");
                    e
                })?;
                let tester = PostgresConnectionTester::new(config.target_database.clone());
                (Arc::new(store), Arc::new(tester))
            }
            StoreBackend::Memory => {
                let roles = config.roles.iter().map(|r| r.name.clone());
                let store = InMemoryStore::new().with_roles(roles);
                (Arc::new(store), Arc::new(FixedConnectionTester(ConnectionTest::Untested)))
            }
        };

    info!(backend = store.backend_name(), roles = config.roles.len(), "Secret store ready");

    let state = ApiState::new(store, tester, &config);

    if let Err(e) = start_api_server(config.api.clone(), state).await {
        error!(error = %e, "API server terminated with error");
        return Err(e);
    }

    info!("Secrets broker shutdown completed");
    Ok(())
}
