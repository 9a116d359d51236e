//! Value types exchanged with the backing store.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Key/value contents of a static path, ordered for stable output.
pub type SecretData = BTreeMap<String, String>;

/// Version metadata the store assigns on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVersion {
    pub version: u64,
    pub created_time: DateTime<Utc>,
}

/// Latest version of a static path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticSecret {
    pub path: String,
    pub data: SecretData,
    pub metadata: SecretVersion,
}

/// Credential payload of a dynamic lease.
///
/// Values are wiped on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(BTreeMap<String, String>);

impl Credential {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self(values)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn username(&self) -> Option<&str> {
        self.get("username")
    }

    pub fn password(&self) -> Option<&str> {
        self.get("password")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        for value in self.0.values_mut() {
            value.zeroize();
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.keys().map(|k| (k, "[REDACTED]"))).finish()
    }
}

impl FromIterator<(String, String)> for Credential {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A lease as returned by the store, before the broker decides its expiry.
#[derive(Debug, Clone)]
pub struct IssuedLease {
    pub lease_id: String,
    pub credential: Credential,
    /// Lease lifetime reported by the store
    pub lease_duration: Duration,
    pub renewable: bool,
}

/// Diagnostic view of the store's engines. Contains no secret values.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStatus {
    /// Mount paths, e.g. `secret/`, `database/`
    pub mounts: Vec<String>,
    pub database_mounted: bool,
    pub database_roles: Vec<String>,
    /// Set when the role listing failed while the mount itself exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_roles_error: Option<String>,
}
