//! Integration tests for REST API endpoints
//!
//! Tests health, panel login, the panel VPS endpoints, and the command
//! dispatcher endpoint against the mock hypervisor.

mod common;

use axum::http::StatusCode;
use common::{extract_json_body, TestClient, DISPATCH_TOKEN, PANEL_URL};
use serde_json::{json, Value};
use vps_hypervisor::mock::MockOp;
use vps_orchestrator::test_utils::ROOT_ADMIN;
use vps_orchestrator::{VmRecord, VmStatus};

#[tokio::test]
async fn test_health_endpoints() {
    let client = TestClient::new();

    let response = client.get("/health", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = extract_json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "vps-api");

    let response = client.get("/health/ready", &[]).await;
    let body: Value = extract_json_body(response).await;
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_login_with_issued_password() {
    let client = TestClient::new();
    let password = client.provision("42").await.unwrap();

    let response = client
        .post(
            "/api/v1/login",
            &json!({ "username": "user42", "password": password }),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = extract_json_body(response).await;
    assert_eq!(body["username"], "user42");
    assert!(body["session"].as_str().is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let client = TestClient::new();
    client.provision("42").await.unwrap();

    for (username, password) in [("user42", "wrong-password"), ("user99", "anything")] {
        let response = client
            .post(
                "/api/v1/login",
                &json!({ "username": username, "password": password }),
                &[],
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = extract_json_body(response).await;
        assert_eq!(body["error"], "Invalid credentials");
    }
}

#[tokio::test]
async fn test_list_own_vps() {
    let client = TestClient::new();
    let session = client.session_for("42").await;
    client.provision("42").await;
    client.provision("43").await;

    let response = client
        .get("/api/v1/vps", &[("x-session", session.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let records: Vec<VmRecord> = extract_json_body(response).await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.vm_name.starts_with("vps-42-")));
}

#[tokio::test]
async fn test_stop_and_start_by_index() {
    let client = TestClient::new();
    let session = client.session_for("42").await;
    let headers = [("x-session", session.as_str())];

    let response = client.post("/api/v1/vps/0/stop", &json!({}), &headers).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = extract_json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["record"]["status"], "stopped");

    let response = client.post("/api/v1/vps/0/start", &json!({}), &headers).await;
    assert_eq!(response.status(), StatusCode::OK);

    let records = client.fleet.coordinator.list("42").await.unwrap();
    assert_eq!(records[0].status, VmStatus::Running);
}

#[tokio::test]
async fn test_missing_index_is_404() {
    let client = TestClient::new();
    let session = client.session_for("42").await;

    let response = client
        .post(
            "/api/v1/vps/3/start",
            &json!({}),
            &[("x-session", session.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_driver_failure_is_502() {
    let client = TestClient::new();
    let session = client.session_for("42").await;
    client
        .fleet
        .driver
        .fail_on(MockOp::Stop, "error: Failed to destroy domain");

    let response = client
        .post(
            "/api/v1/vps/0/stop",
            &json!({}),
            &[("x-session", session.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = extract_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Failed to destroy domain"));

    let records = client.fleet.coordinator.list("42").await.unwrap();
    assert_eq!(records[0].status, VmStatus::Running);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let client = TestClient::new();
    let session = client.session_for("42").await;
    let headers = [("x-session", session.as_str())];

    let response = client.post("/api/v1/logout", &json!({}), &headers).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.get("/api/v1/vps", &headers).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invoke_create_returns_credentials() {
    let client = TestClient::new();

    let response = client
        .post(
            "/api/v1/invoke",
            &json!({
                "operation": "create",
                "caller_id": ROOT_ADMIN,
                "args": ["2", "1", "20"],
                "target": "42"
            }),
            &[("x-dispatch-token", DISPATCH_TOKEN)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = extract_json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["record"]["status"], "running");
    assert_eq!(body["credentials"]["username"], "user42");
    assert_eq!(body["credentials"]["url"], PANEL_URL);

    // The returned password opens a panel session
    let password = body["credentials"]["password"].as_str().unwrap();
    let session = client.login("user42", password).await;
    assert!(!session.is_empty());
}

#[tokio::test]
async fn test_invoke_failures_are_replies() {
    let client = TestClient::new();

    let response = client
        .post(
            "/api/v1/invoke",
            &json!({ "operation": "create", "caller_id": "42", "args": ["2", "1", "20"], "target": "43" }),
            &[("x-dispatch-token", DISPATCH_TOKEN)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = extract_json_body(response).await;
    assert_eq!(body["ok"], false);
    assert!(body.get("credentials").is_none());
    assert!(client.fleet.driver.calls().is_empty());
}

#[tokio::test]
async fn test_invoke_ping_without_args() {
    let client = TestClient::new();

    let response = client
        .post(
            "/api/v1/invoke",
            &json!({ "operation": "ping", "caller_id": "42" }),
            &[("x-dispatch-token", DISPATCH_TOKEN)],
        )
        .await;
    let body: Value = extract_json_body(response).await;
    assert_eq!(body, json!({ "ok": true, "message": "Pong!" }));
}
