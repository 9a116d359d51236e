//! Dynamic credential HTTP handlers

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::api::{error::ApiError, routes::ApiState};
use crate::config::RoleConfig;
use crate::errors;
use crate::leases::LeaseView;
use crate::services::Catalog;

use super::secrets::{DynamicSecretResponse, RevokeResponse};

#[derive(Debug, Serialize)]
pub struct DynamicSecretsResponse {
    pub dynamic_secrets: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Catalog of every role and static path the broker knows about.
#[instrument(skip(state))]
pub async fn list_available_handler(State(state): State<ApiState>) -> Json<Catalog> {
    Json(state.aggregation.list_available().await)
}

/// Current lease of every configured role. A failing role is reported as
/// `{error}` in place of its lease.
#[instrument(skip(state))]
pub async fn list_dynamic_secrets_handler(
    State(state): State<ApiState>,
) -> Json<DynamicSecretsResponse> {
    let dynamic_secrets = dynamic_section(state.aggregation.dynamic_all().await).0;
    Json(DynamicSecretsResponse { dynamic_secrets, timestamp: Utc::now() })
}

/// Revoke the cached lease of a role; the next read issues a new one.
#[instrument(skip(state))]
pub async fn revoke_dynamic_secret_handler(
    State(state): State<ApiState>,
    Path(role): Path<String>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let lease = state.dynamic_credentials.revoke(&role).await?;

    Ok(Json(RevokeResponse {
        status: "success",
        message: format!("Lease for role '{}' revoked", lease.role),
        lease_id: lease.lease_id.clone(),
    }))
}

/// Render per-role results, collecting the failures separately.
pub(crate) fn dynamic_section(
    results: Vec<(RoleConfig, errors::Result<LeaseView>)>,
) -> (BTreeMap<String, Value>, BTreeMap<String, String>) {
    let mut secrets = BTreeMap::new();
    let mut failures = BTreeMap::new();

    for (role, result) in results {
        let entry = match result {
            Ok(view) => {
                serde_json::to_value(DynamicSecretResponse::new(&role, view)).unwrap_or_else(|e| {
                    json!({ "error": format!("Failed to render lease: {}", e) })
                })
            }
            Err(e) => {
                let detail = ApiError::from(e).detail().to_string();
                failures.insert(role.name.clone(), detail.clone());
                json!({ "error": detail })
            }
        };
        secrets.insert(role.name, entry);
    }
    (secrets, failures)
}
