//! # Secrets Broker
//!
//! A single read/write HTTP API over two classes of secrets:
//!
//! - long-lived **static** key/value secrets stored at versioned KV paths
//! - short-lived **dynamic** database credentials issued with a TTL
//!
//! ## Architecture
//!
//! ```text
//! REST API Layer → Services → Secret Store (Vault KV v2 + database engine)
//!      ↓              ↓
//!  Observability  Lease Cache
//! ```
//!
//! ## Core Components
//!
//! - **REST API**: Axum-based HTTP server consumed by the operator dashboard
//! - **Static secrets**: versioned CRUD with per-path write serialization
//! - **Dynamic credentials**: per-role lease cache with single-flight issuance
//!   and lazy expiry, plus connection testing of issued credentials
//! - **Secret store**: Vault through `vaultrs`/`reqwest`, or an in-memory store
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use secrets_broker::{api::{start_api_server, ApiState}, store::*, Config, Result};
//! use secrets_broker::leases::ConnectionTest;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_env()?;
//!     let store = Arc::new(InMemoryStore::new());
//!     let tester = Arc::new(FixedConnectionTester(ConnectionTest::Untested));
//!     let state = ApiState::new(store, tester, &config);
//!     start_api_server(config.api.clone(), state).await
//! }
//! ```

pub mod api;
pub mod config;
pub mod errors;
pub mod leases;
pub mod observability;
pub mod services;
pub mod store;

// Re-export commonly used types and traits
pub use config::Config;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
