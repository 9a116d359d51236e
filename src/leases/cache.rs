//! Per-role lease cache with single-flight issuance.
//!
//! Each role owns one slot. A slot holds the published lease behind an
//! `RwLock` and an issuance gate behind a `Mutex`. Readers that find an
//! unexpired lease never touch the gate. Everyone else queues on the gate,
//! so at most one issuance per role is in flight and the callers that waited
//! receive the lease the winner published.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::Instrument;

use crate::errors::{Error, Result};

use super::types::{DynamicLease, LeaseState, LeaseSummary, LeaseView};

#[derive(Debug, Default)]
struct LeaseSlot {
    gate: Arc<Mutex<()>>,
    lease: RwLock<Option<DynamicLease>>,
}

/// Exclusive hold on one role's slot. Dropping it releases the gate.
pub struct RoleGuard {
    slot: Arc<LeaseSlot>,
    _gate: OwnedMutexGuard<()>,
}

impl RoleGuard {
    /// The published lease, expired or not.
    pub async fn current(&self) -> Option<DynamicLease> {
        self.slot.lease.read().await.clone()
    }

    pub async fn install(&self, lease: DynamicLease) {
        *self.slot.lease.write().await = Some(lease);
    }

    pub async fn clear(&self) -> Option<DynamicLease> {
        self.slot.lease.write().await.take()
    }
}

/// Cache of the most recently issued lease per role.
#[derive(Debug, Default)]
pub struct LeaseCache {
    slots: DashMap<String, Arc<LeaseSlot>>,
}

impl LeaseCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, role: &str) -> Arc<LeaseSlot> {
        // Clone the Arc out so no shard lock is held across an await
        self.slots.entry(role.to_string()).or_default().clone()
    }

    /// Takes the role's issuance gate, waiting for any in-flight issuance.
    pub async fn lock_role(&self, role: &str) -> RoleGuard {
        let slot = self.slot(role);
        let gate = slot.gate.clone().lock_owned().await;
        RoleGuard { slot, _gate: gate }
    }

    /// Returns the cached lease for `role` if it has not expired, otherwise
    /// runs `issue` and publishes its result.
    ///
    /// Concurrent callers for the same role share one issuance: late callers
    /// wait for the gate, find the fresh lease and get it back as `cached`.
    /// Issuance and publication run on their own task holding the gate, so a
    /// lease the store has handed out is cached even if the caller is dropped
    /// mid-request. If `issue` fails, the slot keeps whatever it held before
    /// and the error is returned.
    pub async fn get_or_issue<F, Fut>(&self, role: &str, issue: F) -> Result<LeaseView>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DynamicLease>> + Send + 'static,
    {
        let slot = self.slot(role);

        if let Some(lease) = slot.lease.read().await.as_ref() {
            if !lease.is_expired_at(Utc::now()) {
                return Ok(LeaseView::cached(lease.clone()));
            }
        }

        let guard = self.lock_role(role).await;

        if let Some(lease) = guard.current().await {
            if !lease.is_expired_at(Utc::now()) {
                return Ok(LeaseView::cached(lease));
            }
            tracing::debug!(
                role = %role,
                lease_id = %lease.lease_id,
                expired_at = %lease.expires_at,
                "Re-issuing expired lease"
            );
        }

        let pending = issue();
        let task = tokio::spawn(
            async move {
                let lease = pending.await?;
                guard.install(lease.clone()).await;
                Ok::<_, Error>(lease)
            }
            .instrument(tracing::Span::current()),
        );

        let lease = task
            .await
            .map_err(|e| Error::internal(format!("Lease issuance task failed: {}", e)))??;
        Ok(LeaseView::fresh(lease))
    }

    /// Leases that are published and unexpired. Expired entries are skipped
    /// here and replaced on their next access.
    pub async fn list_active(&self) -> Vec<DynamicLease> {
        let slots: Vec<Arc<LeaseSlot>> = self.slots.iter().map(|e| e.value().clone()).collect();
        let now = Utc::now();

        let mut active = Vec::new();
        for slot in slots {
            if let Some(lease) = slot.lease.read().await.as_ref() {
                if !lease.is_expired_at(now) {
                    active.push(lease.clone());
                }
            }
        }
        active.sort_by(|a, b| a.role.cmp(&b.role));
        active
    }

    /// Credential-free state of every slot the cache has seen.
    pub async fn summaries(&self) -> Vec<LeaseSummary> {
        let slots: Vec<(String, Arc<LeaseSlot>)> =
            self.slots.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        let now = Utc::now();

        let mut summaries = Vec::with_capacity(slots.len());
        for (role, slot) in slots {
            let issuing = slot.gate.try_lock().is_err();
            let lease = slot.lease.read().await.clone();

            let state = match &lease {
                Some(l) if !l.is_expired_at(now) => LeaseState::Active,
                _ if issuing => LeaseState::Issuing,
                Some(_) => LeaseState::Expired,
                None => LeaseState::Absent,
            };

            summaries.push(LeaseSummary {
                role,
                state,
                generated_at: lease.as_ref().map(|l| l.generated_at),
                expires_at: lease.as_ref().map(|l| l.expires_at),
                connection_test: lease.as_ref().map(|l| l.connection_test),
            });
        }
        summaries.sort_by(|a, b| a.role.cmp(&b.role));
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leases::{CacheStatus, ConnectionTest};
    use crate::store::Credential;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn lease(role: &str, username: &str, ttl: Duration) -> DynamicLease {
        let generated_at = Utc::now();
        DynamicLease {
            role: role.to_string(),
            lease_id: format!("database/creds/{}/{}", role, username),
            credential: [("username".to_string(), username.to_string())]
                .into_iter()
                .collect::<Credential>(),
            generated_at,
            expires_at: generated_at + chrono::Duration::from_std(ttl).unwrap(),
            lease_duration: ttl,
            renewable: true,
            connection_test: ConnectionTest::Untested,
        }
    }

    #[tokio::test]
    async fn test_second_get_is_cached() {
        let cache = LeaseCache::new();
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();

        let issue = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(lease("readonly", "u1", Duration::from_secs(60)))
        };

        let first = cache.get_or_issue("readonly", issue).await.unwrap();
        assert_eq!(first.cache_status, CacheStatus::Fresh);

        let second = cache
            .get_or_issue("readonly", || async {
                Ok::<_, Error>(lease("readonly", "u2", Duration::from_secs(60)))
            })
            .await
            .unwrap();
        assert_eq!(second.cache_status, CacheStatus::Cached);
        assert_eq!(second.lease.credential, first.lease.credential);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_lease_is_reissued() {
        let cache = LeaseCache::new();
        cache
            .get_or_issue("readonly", || async {
                Ok::<_, Error>(lease("readonly", "u1", Duration::from_millis(50)))
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.list_active().await.is_empty());

        let view = cache
            .get_or_issue("readonly", || async {
                Ok::<_, Error>(lease("readonly", "u2", Duration::from_secs(60)))
            })
            .await
            .unwrap();
        assert_eq!(view.cache_status, CacheStatus::Fresh);
        assert_eq!(view.lease.credential.username(), Some("u2"));
    }

    #[tokio::test]
    async fn test_failed_issue_leaves_slot_empty() {
        let cache = LeaseCache::new();
        let err = cache
            .get_or_issue("admin", || async {
                Err::<DynamicLease, _>(Error::issue_failed("admin", "denied"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IssueFailed { .. }));
        assert!(cache.list_active().await.is_empty());

        let summaries = cache.summaries().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].state, LeaseState::Absent);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_issuance() {
        let cache = Arc::new(LeaseCache::new());
        let calls = Arc::new(AtomicU32::new(0));

        let tasks = (0..8).map(|i| {
            let cache = cache.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                cache
                    .get_or_issue("readonly", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        let username = format!("u{}", i);
                        Ok::<_, Error>(lease("readonly", &username, Duration::from_secs(60)))
                    })
                    .await
                    .unwrap()
            })
        });

        let views = futures::future::join_all(tasks).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let first = &views[0].as_ref().unwrap().lease.credential;
        for view in &views {
            assert_eq!(&view.as_ref().unwrap().lease.credential, first);
        }
        let fresh = views
            .iter()
            .filter(|v| v.as_ref().unwrap().cache_status == CacheStatus::Fresh)
            .count();
        assert_eq!(fresh, 1);
    }

    #[tokio::test]
    async fn test_summaries_report_issuing_while_gate_is_held() {
        let cache = LeaseCache::new();
        let guard = cache.lock_role("readonly").await;

        let summaries = cache.summaries().await;
        assert_eq!(summaries[0].state, LeaseState::Issuing);

        guard.install(lease("readonly", "u1", Duration::from_secs(60))).await;
        drop(guard);

        let summaries = cache.summaries().await;
        assert_eq!(summaries[0].state, LeaseState::Active);
        assert_eq!(cache.list_active().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_reissue_keeps_expired_lease() {
        let cache = LeaseCache::new();
        cache
            .get_or_issue("readonly", || async {
                Ok::<_, Error>(lease("readonly", "u1", Duration::from_millis(50)))
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let err = cache
            .get_or_issue("readonly", || async {
                Err::<DynamicLease, _>(Error::store_unavailable("vault sealed"))
            })
            .await
            .unwrap_err();
        assert!(err.is_store_unavailable());

        let summaries = cache.summaries().await;
        assert_eq!(summaries[0].state, LeaseState::Expired);
        assert!(cache.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_caller_still_publishes_lease() {
        let cache = LeaseCache::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counted = calls.clone();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            cache.get_or_issue("readonly", || async move {
                counted.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, Error>(lease("readonly", "u1", Duration::from_secs(60)))
            }),
        )
        .await;
        assert!(abandoned.is_err());

        let counted = calls.clone();
        let view = cache
            .get_or_issue("readonly", || async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(lease("readonly", "u2", Duration::from_secs(60)))
            })
            .await
            .unwrap();

        assert_eq!(view.cache_status, CacheStatus::Cached);
        assert_eq!(view.lease.credential.username(), Some("u1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_returns_lease() {
        let cache = LeaseCache::new();
        cache
            .get_or_issue("admin", || async {
                Ok::<_, Error>(lease("admin", "a1", Duration::from_secs(60)))
            })
            .await
            .unwrap();

        let guard = cache.lock_role("admin").await;
        let removed = guard.clear().await.unwrap();
        assert_eq!(removed.credential.username(), Some("a1"));
        assert!(guard.current().await.is_none());
    }
}
