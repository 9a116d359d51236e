//! Combined views across static and dynamic secrets

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use crate::api::{error::ApiError, routes::ApiState};
use crate::services::DebugReport;

use super::dynamic::dynamic_section;
use super::secrets::StaticSecretResponse;

#[derive(Debug, Serialize)]
pub struct AllSecretsResponse {
    pub static_secrets: BTreeMap<String, StaticSecretResponse>,
    pub dynamic_secrets: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
    /// Failed sections (`static`) and roles, keyed by name
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct DebugResponse {
    #[serde(flatten)]
    pub report: DebugReport,
    pub timestamp: DateTime<Utc>,
}

/// Everything at once. Always 200; failures are listed under `errors`.
#[instrument(skip(state))]
pub async fn all_secrets_handler(State(state): State<ApiState>) -> Json<AllSecretsResponse> {
    let aggregated = state.aggregation.get_all().await;

    let (dynamic_secrets, mut errors) = dynamic_section(aggregated.dynamic_secrets);

    let static_secrets = match aggregated.static_secrets {
        Ok(secrets) => secrets
            .into_iter()
            .map(|secret| (secret.path.clone(), StaticSecretResponse::from(secret)))
            .collect(),
        Err(e) => {
            errors.insert("static".to_string(), ApiError::from(e).detail().to_string());
            BTreeMap::new()
        }
    };

    Json(AllSecretsResponse { static_secrets, dynamic_secrets, timestamp: Utc::now(), errors })
}

#[instrument(skip(state))]
pub async fn debug_vault_handler(State(state): State<ApiState>) -> Json<DebugResponse> {
    let report = state.aggregation.debug().await;
    Json(DebugResponse { report, timestamp: Utc::now() })
}
