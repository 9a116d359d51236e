//! Dynamic credential leases and the cache that owns them.

pub mod cache;
pub mod types;

pub use cache::{LeaseCache, RoleGuard};
pub use types::{CacheStatus, ConnectionTest, DynamicLease, LeaseState, LeaseSummary, LeaseView};
