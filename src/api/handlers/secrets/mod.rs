//! Secret HTTP handlers
//!
//! `/secrets/{name}` dispatches to a dynamic role or a static path. Everything
//! under `/secrets/static` is static CRUD.

pub mod types;

pub use types::{
    CreateSecretTypeRequest, DeleteKeyResponse, DynamicMetadata, DynamicSecretResponse,
    MessageResponse, RevokeResponse, SecretKeyPath, SecretTypePath, SecretValueRequest,
    StaticMutationResponse, StaticSecretResponse,
};

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::api::{error::ApiError, routes::ApiState, target::SecretTarget};

#[derive(Debug, Serialize)]
pub struct StaticSecretsResponse {
    pub static_secrets: BTreeMap<String, StaticSecretResponse>,
    pub timestamp: DateTime<Utc>,
}

#[instrument(skip(state))]
pub async fn get_secret_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    match SecretTarget::resolve(&name, &state.dynamic_credentials)? {
        SecretTarget::Dynamic(role) => {
            let view = state.dynamic_credentials.get(&role.name).await?;
            Ok(Json(DynamicSecretResponse::new(&role, view)).into_response())
        }
        SecretTarget::Static(path) => {
            let secret = state.static_secrets.get(&path).await?;
            Ok(Json(StaticSecretResponse::from(secret)).into_response())
        }
    }
}

#[instrument(skip(state))]
pub async fn list_static_secrets_handler(
    State(state): State<ApiState>,
) -> Result<Json<StaticSecretsResponse>, ApiError> {
    let secrets = state.static_secrets.list_all().await?;
    let static_secrets = secrets
        .into_iter()
        .map(|secret| (secret.path.clone(), StaticSecretResponse::from(secret)))
        .collect();

    Ok(Json(StaticSecretsResponse { static_secrets, timestamp: Utc::now() }))
}

#[instrument(skip(state), fields(path = %secret_type))]
pub async fn get_static_secret_handler(
    State(state): State<ApiState>,
    Path(SecretTypePath { secret_type }): Path<SecretTypePath>,
) -> Result<Json<StaticSecretResponse>, ApiError> {
    let secret = state.static_secrets.get(&secret_type).await?;
    Ok(Json(secret.into()))
}

#[instrument(skip(state, payload), fields(path = %secret_type))]
pub async fn create_secret_type_handler(
    State(state): State<ApiState>,
    Path(SecretTypePath { secret_type }): Path<SecretTypePath>,
    payload: Result<Json<CreateSecretTypeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StaticMutationResponse>), ApiError> {
    let Json(payload) = payload?;

    let secret = state.static_secrets.create_path(&secret_type, payload.secrets).await?;
    let message = format!("New secret type '{}' created", secret_type);

    Ok((StatusCode::CREATED, Json(StaticMutationResponse::new(message, secret))))
}

#[instrument(skip(state, payload), fields(path = %secret_type, key = %key))]
pub async fn create_secret_key_handler(
    State(state): State<ApiState>,
    Path(SecretKeyPath { secret_type, key }): Path<SecretKeyPath>,
    payload: Result<Json<SecretValueRequest>, JsonRejection>,
) -> Result<Json<StaticMutationResponse>, ApiError> {
    let Json(payload) = payload?;

    let secret =
        state.static_secrets.create_or_merge_key(&secret_type, &key, &payload.value).await?;
    let message = format!("Key '{}' written to {}", key, secret_type);

    Ok(Json(StaticMutationResponse::new(message, secret)))
}

#[instrument(skip(state, payload), fields(path = %secret_type, key = %key))]
pub async fn update_secret_key_handler(
    State(state): State<ApiState>,
    Path(SecretKeyPath { secret_type, key }): Path<SecretKeyPath>,
    payload: Result<Json<SecretValueRequest>, JsonRejection>,
) -> Result<Json<StaticMutationResponse>, ApiError> {
    let Json(payload) = payload?;

    let secret = state.static_secrets.update_key(&secret_type, &key, &payload.value).await?;
    let message = format!("Key '{}' updated in {}", key, secret_type);

    Ok(Json(StaticMutationResponse::new(message, secret)))
}

#[instrument(skip(state), fields(path = %secret_type, key = %key))]
pub async fn delete_secret_key_handler(
    State(state): State<ApiState>,
    Path(SecretKeyPath { secret_type, key }): Path<SecretKeyPath>,
) -> Result<Json<DeleteKeyResponse>, ApiError> {
    let remaining = state.static_secrets.delete_key(&secret_type, &key).await?;

    Ok(Json(DeleteKeyResponse {
        status: "success",
        message: format!("Key '{}' deleted from {}", key, secret_type),
        remaining_keys: remaining.data.into_keys().collect(),
    }))
}

#[instrument(skip(state), fields(path = %secret_type))]
pub async fn delete_secret_type_handler(
    State(state): State<ApiState>,
    Path(SecretTypePath { secret_type }): Path<SecretTypePath>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.static_secrets.delete_path(&secret_type).await?;

    Ok(Json(MessageResponse {
        status: "success",
        message: format!("Entire secret '{}' deleted successfully", secret_type),
    }))
}
