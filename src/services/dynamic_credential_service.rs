//! Dynamic credential business logic
//!
//! Resolves role names and aliases, hands out cached leases while they are
//! valid and asks the store for a new one otherwise. Issuance, connection
//! testing and publication all happen while the role's gate is held.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::config::RoleConfig;
use crate::errors::{Error, Result};
use crate::leases::{CacheStatus, ConnectionTest, DynamicLease, LeaseCache, LeaseSummary, LeaseView};
use crate::observability::MetricsRecorder;
use crate::store::{ConnectionTester, SecretStore};

/// Service for dynamic database credentials
pub struct DynamicCredentialService {
    store: Arc<dyn SecretStore>,
    tester: Arc<dyn ConnectionTester>,
    cache: Arc<LeaseCache>,
    roles: Vec<RoleConfig>,
    metrics: MetricsRecorder,
}

impl DynamicCredentialService {
    pub fn new(
        store: Arc<dyn SecretStore>,
        tester: Arc<dyn ConnectionTester>,
        roles: Vec<RoleConfig>,
    ) -> Self {
        Self {
            store,
            tester,
            cache: Arc::new(LeaseCache::new()),
            roles,
            metrics: MetricsRecorder::new(),
        }
    }

    /// Configured roles in declaration order.
    pub fn roles(&self) -> &[RoleConfig] {
        &self.roles
    }

    /// Look up a role by name or alias without failing.
    pub fn role(&self, name: &str) -> Option<&RoleConfig> {
        self.roles.iter().find(|r| r.matches(name))
    }

    /// Look up a role by name or alias.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if no role has that name or alias
    pub fn resolve_role(&self, name: &str) -> Result<&RoleConfig> {
        self.role(name).ok_or_else(|| Error::not_found(format!("Unknown role: {}", name)))
    }

    /// Current lease for a role, issuing a new one if none is valid.
    #[instrument(skip(self), fields(role = %name))]
    pub async fn get(&self, name: &str) -> Result<LeaseView> {
        let role = self.resolve_role(name)?;

        let issuance = Issuance {
            store: self.store.clone(),
            tester: self.tester.clone(),
            metrics: self.metrics,
            role: role.clone(),
        };
        let view = self.cache.get_or_issue(&role.name, move || issuance.run()).await;
        match &view {
            Ok(v) if v.cache_status == CacheStatus::Cached => {
                self.metrics.record_lease_cache_hit(&role.name);
            }
            Ok(_) => {}
            Err(e) => {
                self.metrics.record_lease_issue_failure(&role.name);
                warn!(role = %role.name, error = %e, "Dynamic credential issuance failed");
            }
        }
        view
    }

    /// Leases currently cached and unexpired.
    pub async fn list_active(&self) -> Vec<DynamicLease> {
        self.cache.list_active().await
    }

    /// Credential-free lifecycle state of every role the cache has seen.
    pub async fn summaries(&self) -> Vec<LeaseSummary> {
        self.cache.summaries().await
    }

    /// Revoke a role's cached lease at the store and forget it.
    ///
    /// A lease the store no longer knows is still dropped from the cache. Any
    /// other store failure leaves the cached lease in place.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the role is unknown or has no cached lease
    #[instrument(skip(self), fields(role = %name))]
    pub async fn revoke(&self, name: &str) -> Result<DynamicLease> {
        let role = self.resolve_role(name)?;
        let guard = self.cache.lock_role(&role.name).await;

        let lease = guard
            .current()
            .await
            .ok_or_else(|| Error::not_found(format!("No active lease for role: {}", role.name)))?;

        match self.store.revoke_lease(&lease.lease_id).await {
            Ok(()) => {}
            Err(Error::NotFound(_)) => {
                warn!(
                    role = %role.name,
                    lease_id = %lease.lease_id,
                    "Lease already gone from store"
                );
            }
            Err(e) => return Err(e),
        }

        guard.clear().await;
        self.metrics.record_lease_revoked(&role.name);
        info!(role = %role.name, lease_id = %lease.lease_id, "Revoked dynamic credential");
        Ok(lease)
    }
}

/// One issuance for one role. Owns its handles so it can finish on its own
/// task after the requesting caller has gone away.
struct Issuance {
    store: Arc<dyn SecretStore>,
    tester: Arc<dyn ConnectionTester>,
    metrics: MetricsRecorder,
    role: RoleConfig,
}

impl Issuance {
    async fn run(self) -> Result<DynamicLease> {
        let role = &self.role;
        // Taken before the store call so expiry never trails the grant
        let generated_at = Utc::now();

        let issued = self.store.issue_lease(&role.name).await.map_err(|e| match e {
            Error::NotFound(message) => Error::issue_failed(&role.name, message),
            other => other,
        })?;

        if issued.credential.is_empty() {
            return Err(Error::issue_failed(&role.name, "store returned an empty credential"));
        }

        let connection_test = if role.test_connection {
            let result = self.tester.test_connection(role, &issued.credential).await;
            self.metrics.record_connection_test(&role.name, result.as_str());
            result
        } else {
            ConnectionTest::Untested
        };

        let lifetime = lease_lifetime(role.default_ttl, issued.lease_duration);
        let expires_at = generated_at
            + chrono::Duration::from_std(lifetime)
                .map_err(|e| Error::internal(format!("Lease lifetime out of range: {}", e)))?;

        self.metrics.record_lease_issued(&role.name);
        info!(
            role = %role.name,
            lease_id = %issued.lease_id,
            username = issued.credential.username().unwrap_or_default(),
            expires_at = %expires_at,
            connection_test = connection_test.as_str(),
            "Issued dynamic credential"
        );

        Ok(DynamicLease {
            role: role.name.clone(),
            lease_id: issued.lease_id,
            credential: issued.credential,
            generated_at,
            expires_at,
            lease_duration: issued.lease_duration,
            renewable: issued.renewable,
            connection_test,
        })
    }
}

/// The role's TTL, capped by what the store actually granted.
fn lease_lifetime(default_ttl: Duration, granted: Duration) -> Duration {
    if granted.is_zero() {
        default_ttl
    } else {
        default_ttl.min(granted)
    }
}
