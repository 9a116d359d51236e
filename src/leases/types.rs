//! Lease records and the status enums reported to the dashboard.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Credential;

/// Result of trying an issued credential against the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionTest {
    Untested,
    Successful,
    Failed,
}

impl ConnectionTest {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untested => "untested",
            Self::Successful => "successful",
            Self::Failed => "failed",
        }
    }
}

/// How a lease handed to a caller was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Issued by the store for this request
    Fresh,
    /// Served from the lease cache
    Cached,
}

/// Per-role lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseState {
    Absent,
    Issuing,
    Active,
    Expired,
}

/// A credential lease owned by the lease cache.
#[derive(Debug, Clone)]
pub struct DynamicLease {
    pub role: String,
    pub lease_id: String,
    pub credential: Credential,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Lifetime the store granted, which may outlive `expires_at`
    pub lease_duration: Duration,
    pub renewable: bool,
    pub connection_test: ConnectionTest,
}

impl DynamicLease {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A lease as returned to a caller, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct LeaseView {
    pub lease: DynamicLease,
    pub cache_status: CacheStatus,
}

impl LeaseView {
    pub fn fresh(lease: DynamicLease) -> Self {
        Self { lease, cache_status: CacheStatus::Fresh }
    }

    pub fn cached(lease: DynamicLease) -> Self {
        Self { lease, cache_status: CacheStatus::Cached }
    }
}

/// Credential-free summary of one cache slot, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct LeaseSummary {
    pub role: String,
    pub state: LeaseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_test: Option<ConnectionTest>,
}
