//! Health check and service index endpoints

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::routes::ApiState;
use crate::leases::ConnectionTest;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` when the store answers, `degraded` otherwise
    pub status: String,
    pub store_connected: bool,
    pub store_backend: String,
    /// Target database reachability; false when unchecked
    pub database_connected: bool,
    pub timestamp: DateTime<Utc>,
    pub services: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceIndex {
    pub message: &'static str,
    pub version: &'static str,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

/// Health check endpoint
///
/// Returns 200 whenever the API server is running. A store outage shows up
/// as `status: degraded` rather than a failing probe, so the dashboard can
/// keep polling and render it. Target database reachability is reported
/// under `services.database` and does not affect `status`.
pub async fn health_handler(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let (ping, database) = tokio::join!(state.store.ping(), state.tester.check_database());

    let store_connected = match ping {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the secret store");
            false
        }
    };
    let database_status = match database {
        ConnectionTest::Successful => "connected",
        ConnectionTest::Failed => "disconnected",
        ConnectionTest::Untested => "unchecked",
    };

    let services = BTreeMap::from([
        (
            "store".to_string(),
            if store_connected { "connected" } else { "disconnected" }.to_string(),
        ),
        ("database".to_string(), database_status.to_string()),
        ("backend".to_string(), "running".to_string()),
    ]);

    let response = HealthResponse {
        status: if store_connected { "healthy" } else { "degraded" }.to_string(),
        store_connected,
        store_backend: state.store.backend_name().to_string(),
        database_connected: database == ConnectionTest::Successful,
        timestamp: Utc::now(),
        services,
    };
    (StatusCode::OK, Json(response))
}

pub async fn root_handler() -> Json<ServiceIndex> {
    Json(ServiceIndex {
        message: "Secrets broker for static and dynamic credentials",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: BTreeMap::from([
            ("health", "/health"),
            ("all_secrets", "/secrets/all"),
            ("static_secrets", "/secrets/static"),
            ("dynamic_secrets", "/secrets/dynamic-all"),
            ("catalog", "/secrets/dynamic"),
            ("debug", "/debug/vault"),
        ]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_root_lists_endpoints() {
        let Json(index) = root_handler().await;
        assert_eq!(index.endpoints.get("health"), Some(&"/health"));
        assert_eq!(index.version, env!("CARGO_PKG_VERSION"));
    }
}
