//! Common test utilities for all integration tests.
//!
//! Builds the full router over an [`InMemoryStore`] so API tests run without
//! Vault or PostgreSQL.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, Response},
    Router,
};
use secrets_broker::{
    api::{build_router, ApiState},
    config::{Config, RoleConfig, StoreBackend},
    leases::ConnectionTest,
    store::{FixedConnectionTester, InMemoryStore, SecretData},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower::ServiceExt;

pub struct BrokerApp {
    pub store: Arc<InMemoryStore>,
    pub state: ApiState,
    pub config: Config,
}

impl BrokerApp {
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &self.config.api.cors_origins)
    }

    pub fn seed(&self, path: &str, pairs: &[(&str, &str)]) {
        self.store.seed_static(path, data(pairs));
    }
}

pub fn data(pairs: &[(&str, &str)]) -> SecretData {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub fn test_config(ttl: Duration) -> Config {
    let mut config = Config { store_backend: StoreBackend::Memory, ..Config::default() };
    for role in &mut config.roles {
        role.default_ttl = ttl;
        role.max_ttl = ttl * 24;
    }
    config
}

pub fn setup_app() -> BrokerApp {
    setup_app_with(InMemoryStore::new(), test_config(Duration::from_secs(3600)))
}

pub fn setup_app_with(store: InMemoryStore, config: Config) -> BrokerApp {
    setup_app_with_tester(store, config, ConnectionTest::Successful)
}

/// App whose connection tester always reports `outcome`.
pub fn setup_app_with_tester(
    store: InMemoryStore,
    config: Config,
    outcome: ConnectionTest,
) -> BrokerApp {
    let roles: Vec<String> = config.roles.iter().map(|r: &RoleConfig| r.name.clone()).collect();
    let store = Arc::new(store.with_roles(roles));
    let state = ApiState::new(store.clone(), Arc::new(FixedConnectionTester(outcome)), &config);
    BrokerApp { store, state, config }
}

pub async fn send_request(
    app: &BrokerApp,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> Response<Body> {
    let builder = Request::builder().method(method).uri(path);

    let request = if let Some(json) = body {
        let bytes = serde_json::to_vec(&json).expect("serialize body");
        builder
            .header("content-type", "application/json")
            .body(Body::from(bytes))
            .expect("build request")
    } else {
        builder.body(Body::empty()).expect("build request")
    };

    app.router().oneshot(request).await.expect("request")
}

pub async fn send_raw(app: &BrokerApp, method: Method, path: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request");
    app.router().oneshot(request).await.expect("request")
}

pub async fn read_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes =
        to_bytes(response.into_body(), usize::MAX).await.expect("read response body as bytes");
    serde_json::from_slice(&bytes).expect("parse json response")
}
