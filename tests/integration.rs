use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use eats_tracker::api::rest::router;
use eats_tracker::config::Config;
use eats_tracker::gateway::session::SessionTokens;
use eats_tracker::state::{AccountContext, AppState, register_account};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

fn test_config() -> Config {
    Config {
        http_port: 0,
        log_level: "info".to_string(),
        // points at a closed port so no test ever leaves the machine
        api_base_url: "http://127.0.0.1:9".to_string(),
        geocoder_url: "http://127.0.0.1:9".to_string(),
        poll_interval: Duration::from_secs(3600),
        event_buffer_size: 16,
        message_prefix: "Message from Uber Eats".to_string(),
        interval_updates: false,
        interval_minutes: 10,
        nearby_distance_feet: 200.0,
        nearby_trigger_url: None,
        home: None,
        cache_dir: PathBuf::from(".cache-test"),
        sinks: Vec::new(),
        bootstrap: None,
    }
}

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(test_config()).unwrap());
    (router(state.clone()), state)
}

fn test_tokens() -> SessionTokens {
    SessionTokens {
        sid: "QA.fedcba9876543210fedcba9876543210".to_string(),
        session_id: "1234abcd-5678-90ef-aaaa-bbbbccccdddd".to_string(),
        full_cookie: String::new(),
    }
}

fn register_test_account(state: &Arc<AppState>) -> Uuid {
    let context = register_account(
        state,
        AccountContext::new("Alex".to_string(), "America/New_York".to_string(), test_tokens()),
    );
    context.id
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delete_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["accounts"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let _body = body_string(response).await;
}

#[tokio::test]
async fn list_accounts_initially_empty() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/accounts")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn create_account_rejects_short_cookie() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/accounts",
            json!({ "cookie": "sid=QA.x", "account_name": "Alex" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_account_rejects_cookie_without_sid() {
    let (app, _state) = setup();
    let cookie = "uev2.id.session=1234abcd-5678-90ef-aaaa-bbbbccccdddd; other=value; pad=000000";
    let response = app
        .oneshot(json_request("POST", "/accounts", json!({ "cookie": cookie })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("sid"));
}

#[tokio::test]
async fn snapshot_of_unknown_account_is_404() {
    let (app, _state) = setup();
    let uri = format!("/accounts/{}/snapshot", Uuid::new_v4());
    let response = app.oneshot(get_request(&uri)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn registered_account_serves_sentinel_snapshot() {
    let (app, state) = setup();
    let id = register_test_account(&state);

    let response = app
        .oneshot(get_request(&format!("/accounts/{id}/snapshot")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["active"], false);
    assert_eq!(body["orders"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn field_projection_returns_sentinel_for_inactive_account() {
    let (app, state) = setup();
    let id = register_test_account(&state);

    let response = app
        .oneshot(get_request(&format!("/accounts/{id}/snapshot/driver_name")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["value"], "No Driver Assigned");
}

#[tokio::test]
async fn unknown_field_name_is_400() {
    let (app, state) = setup();
    let id = register_test_account(&state);

    let response = app
        .oneshot(get_request(&format!("/accounts/{id}/snapshot/bogus")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn history_starts_empty() {
    let (app, state) = setup();
    let id = register_test_account(&state);

    let response = app
        .oneshot(get_request(&format!("/accounts/{id}/history")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn delete_account_removes_it() {
    let (app, state) = setup();
    let id = register_test_account(&state);
    assert_eq!(state.accounts.len(), 1);

    let response = app
        .clone()
        .oneshot(delete_request(&format!("/accounts/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.accounts.len(), 0);

    let response = app
        .oneshot(delete_request(&format!("/accounts/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn replace_session_on_unknown_account_is_404() {
    let (app, _state) = setup();
    let uri = format!("/accounts/{}/session", Uuid::new_v4());
    let response = app
        .oneshot(json_request("PUT", &uri, json!({ "cookie": "whatever" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn replace_session_validates_cookie_before_any_round_trip() {
    let (app, state) = setup();
    let id = register_test_account(&state);

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/accounts/{id}/session"),
            json!({ "cookie": "sid=notqa" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
