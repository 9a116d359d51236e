use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::Config;
use crate::observability::trace_http_requests;
use crate::services::{AggregationService, DynamicCredentialService, StaticSecretService};
use crate::store::{ConnectionTester, SecretStore};

use super::handlers::{
    all_secrets_handler, create_secret_key_handler, create_secret_type_handler,
    debug_vault_handler, delete_secret_key_handler, delete_secret_type_handler,
    get_secret_handler, get_static_secret_handler, health_handler, list_available_handler,
    list_dynamic_secrets_handler, list_static_secrets_handler, revoke_dynamic_secret_handler,
    root_handler, update_secret_key_handler,
};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn SecretStore>,
    pub tester: Arc<dyn ConnectionTester>,
    pub static_secrets: Arc<StaticSecretService>,
    pub dynamic_credentials: Arc<DynamicCredentialService>,
    pub aggregation: Arc<AggregationService>,
}

impl ApiState {
    /// Wire the services around one store and connection tester.
    pub fn new(
        store: Arc<dyn SecretStore>,
        tester: Arc<dyn ConnectionTester>,
        config: &Config,
    ) -> Self {
        let static_secrets =
            Arc::new(StaticSecretService::new(store.clone(), config.known_static_paths.clone()));
        let dynamic_credentials = Arc::new(DynamicCredentialService::new(
            store.clone(),
            tester.clone(),
            config.roles.clone(),
        ));
        let aggregation = Arc::new(AggregationService::new(
            store.clone(),
            static_secrets.clone(),
            dynamic_credentials.clone(),
        ));

        Self { store, tester, static_secrets, dynamic_credentials, aggregation }
    }
}

pub fn build_router(state: ApiState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/secrets/all", get(all_secrets_handler))
        .route("/secrets/static", get(list_static_secrets_handler))
        .route(
            "/secrets/static/{secret_type}",
            get(get_static_secret_handler)
                .post(create_secret_type_handler)
                .delete(delete_secret_type_handler),
        )
        .route(
            "/secrets/static/{secret_type}/{key}",
            axum::routing::post(create_secret_key_handler)
                .put(update_secret_key_handler)
                .delete(delete_secret_key_handler),
        )
        .route("/secrets/dynamic", get(list_available_handler))
        .route("/secrets/dynamic-all", get(list_dynamic_secrets_handler))
        .route("/secrets/dynamic/{role}", delete(revoke_dynamic_secret_handler))
        .route("/secrets/{name}", get(get_secret_handler))
        .route("/debug/vault", get(debug_vault_handler))
        .layer(middleware::from_fn(trace_http_requests))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .allow_credentials(true)
}
