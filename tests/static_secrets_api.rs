//! Integration tests for static secret CRUD over HTTP

mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{read_json, send_raw, send_request, setup_app};

#[tokio::test]
async fn static_secret_lifecycle() {
    let app = setup_app();

    let response = send_request(
        &app,
        Method::POST,
        "/secrets/static/payments",
        Some(json!({"secrets": {"username": "dev_user", "password": "dev_pass"}})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = read_json(response).await;
    assert_eq!(body["metadata"]["version"], 1);

    let response = send_request(
        &app,
        Method::PUT,
        "/secrets/static/payments/password",
        Some(json!({"value": "rotated"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert_eq!(body["metadata"]["version"], 2);
    assert_eq!(body["data"]["username"], "dev_user");

    let response =
        send_request(&app, Method::DELETE, "/secrets/static/payments/username", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert_eq!(body["remaining_keys"], json!(["password"]));

    let response = send_request(&app, Method::GET, "/secrets/payments", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert_eq!(body["secret_type"], "static_payments_secrets");
    assert_eq!(body["rotation"], "manual");
    assert_eq!(body["data"], json!({"password": "rotated"}));
    assert_eq!(body["metadata"]["version"], 3);

    let response = send_request(&app, Method::DELETE, "/secrets/static/payments", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send_request(&app, Method::GET, "/secrets/payments", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = read_json(response).await;
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn post_key_merges_into_existing_path() {
    let app = setup_app();
    app.seed("api", &[("stripe", "sk_test"), ("github", "ghp")]);

    let response = send_request(
        &app,
        Method::POST,
        "/secrets/static/api/sendgrid",
        Some(json!({"value": "SG.x"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert_eq!(body["data"], json!({"stripe": "sk_test", "github": "ghp", "sendgrid": "SG.x"}));
}

#[tokio::test]
async fn create_existing_path_conflicts() {
    let app = setup_app();
    app.seed("app", &[]);

    let response = send_request(
        &app,
        Method::POST,
        "/secrets/static/app",
        Some(json!({"secrets": {"k": "v"}})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn update_missing_key_is_not_found() {
    let app = setup_app();
    app.seed("app", &[("debug", "false")]);

    let response = send_request(
        &app,
        Method::PUT,
        "/secrets/static/app/missing",
        Some(json!({"value": "x"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn second_key_delete_is_not_found() {
    let app = setup_app();
    app.seed("api", &[("a", "1"), ("b", "2")]);

    let first = send_request(&app, Method::DELETE, "/secrets/static/api/a", None).await;
    assert_eq!(first.status(), StatusCode::OK);
    let second = send_request(&app, Method::DELETE, "/secrets/static/api/a", None).await;
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_absent_path_is_not_found() {
    let app = setup_app();
    let response = send_request(&app, Method::DELETE, "/secrets/static/ghost", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = setup_app();

    let response = send_raw(&app, Method::POST, "/secrets/static/api/key", "{not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = read_json(response).await;
    assert!(body["detail"].is_string());

    let response =
        send_raw(&app, Method::PUT, "/secrets/static/api/key", r#"{"wrong": "field"}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_static_secrets_includes_seeded_paths() {
    let app = setup_app();
    app.seed("api", &[("stripe", "sk")]);
    app.seed("db", &[("username", "dev_user")]);

    let response = send_request(&app, Method::GET, "/secrets/static", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;

    let secrets = body["static_secrets"].as_object().unwrap();
    assert_eq!(secrets.len(), 2);
    assert_eq!(secrets["db"]["secret_type"], "static_db_secrets");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn static_db_is_reachable_despite_role_alias() {
    let app = setup_app();
    app.seed("db", &[("username", "dev_user")]);

    let response = send_request(&app, Method::GET, "/secrets/static/db", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert_eq!(body["data"]["username"], "dev_user");

    let response = send_request(&app, Method::GET, "/secrets/db", None).await;
    let body: Value = read_json(response).await;
    assert_eq!(body["secret_type"], "dynamic_database_credentials");
}

#[tokio::test]
async fn store_outage_is_service_unavailable() {
    let app = setup_app();
    app.store.set_unavailable(true);

    let response = send_request(&app, Method::GET, "/secrets/static", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = send_request(&app, Method::GET, "/secrets/api", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
