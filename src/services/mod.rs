//! Business logic services
//!
//! This module contains service layer components that encapsulate
//! business logic, separated from HTTP concerns.

pub mod aggregation_service;
pub mod dynamic_credential_service;
pub mod path_locks;
pub mod static_secret_service;

pub use aggregation_service::{
    static_secret_type, AggregatedSecrets, AggregationService, Catalog, CatalogEntry, DebugReport,
    RoleSummary,
};
pub use dynamic_credential_service::DynamicCredentialService;
pub use path_locks::{KeyGuard, KeyedLocks};
pub use static_secret_service::{validate_identifier, StaticSecretService};
