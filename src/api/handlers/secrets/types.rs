//! Request and response types for the secrets API

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RoleConfig;
use crate::leases::{CacheStatus, ConnectionTest, LeaseView};
use crate::services::static_secret_type;
use crate::store::{SecretData, SecretVersion, StaticSecret};

/// Path parameters for `/secrets/static/{secret_type}`
#[derive(Debug, Deserialize)]
pub struct SecretTypePath {
    pub secret_type: String,
}

/// Path parameters for `/secrets/static/{secret_type}/{key}`
#[derive(Debug, Deserialize)]
pub struct SecretKeyPath {
    pub secret_type: String,
    pub key: String,
}

/// Body of a single-key write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretValueRequest {
    pub value: String,
}

/// Body of a new static path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSecretTypeRequest {
    pub secrets: SecretData,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaticSecretResponse {
    pub secret_type: String,
    pub rotation: &'static str,
    pub data: SecretData,
    pub metadata: SecretVersion,
}

impl From<StaticSecret> for StaticSecretResponse {
    fn from(secret: StaticSecret) -> Self {
        Self {
            secret_type: static_secret_type(&secret.path),
            rotation: "manual",
            data: secret.data,
            metadata: secret.metadata,
        }
    }
}

/// Result of a static write
#[derive(Debug, Clone, Serialize)]
pub struct StaticMutationResponse {
    pub status: &'static str,
    pub message: String,
    pub data: SecretData,
    pub metadata: SecretVersion,
}

impl StaticMutationResponse {
    pub fn new(message: String, secret: StaticSecret) -> Self {
        Self { status: "success", message, data: secret.data, metadata: secret.metadata }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteKeyResponse {
    pub status: &'static str,
    pub message: String,
    pub remaining_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DynamicMetadata {
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub connection_test: ConnectionTest,
    pub cache_status: CacheStatus,
    pub lease_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DynamicSecretResponse {
    pub secret_type: String,
    pub rotation: String,
    pub data: BTreeMap<String, Value>,
    pub metadata: DynamicMetadata,
}

impl DynamicSecretResponse {
    /// Credential fields, then the role's connection info, then lease facts.
    pub fn new(role: &RoleConfig, view: LeaseView) -> Self {
        let LeaseView { lease, cache_status } = view;

        let mut data: BTreeMap<String, Value> = role
            .connection_info
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        for (k, v) in lease.credential.iter() {
            data.insert(k.to_string(), Value::String(v.to_string()));
        }
        data.insert("lease_duration".to_string(), Value::from(lease.lease_duration.as_secs()));
        data.insert("renewable".to_string(), Value::Bool(lease.renewable));

        Self {
            secret_type: role.secret_type(),
            rotation: role.rotation(),
            data,
            metadata: DynamicMetadata {
                generated_at: lease.generated_at,
                expires_at: lease.expires_at,
                connection_test: lease.connection_test,
                cache_status,
                lease_id: lease.lease_id.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RevokeResponse {
    pub status: &'static str,
    pub message: String,
    pub lease_id: String,
}
