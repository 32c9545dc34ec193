//! Common test utilities and helpers for vps-api tests
//!
//! Builds the real router on top of an in-memory store and the mock
//! hypervisor, plus helpers to log in and send requests.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use vps_api::{create_app, AppState};
use vps_hypervisor::VmSpecs;
use vps_orchestrator::test_utils::{TestFleet, ROOT_ADMIN};

pub const DISPATCH_TOKEN: &str = "test-dispatch-token";
pub const PANEL_URL: &str = "http://panel.test:3001";

/// TestClient to encapsulate API interaction logic
pub struct TestClient {
    pub app: Router,
    pub fleet: TestFleet,
}

impl TestClient {
    pub fn new() -> Self {
        Self::with_dispatch_token(Some(DISPATCH_TOKEN))
    }

    pub fn with_dispatch_token(token: Option<&str>) -> Self {
        let fleet = TestFleet::new();
        let state = AppState::new(
            fleet.coordinator.clone(),
            fleet.store.clone(),
            Some(PANEL_URL.to_string()),
            token.map(str::to_string),
        );
        Self {
            app: create_app(state),
            fleet,
        }
    }

    /// Send a request to the API
    pub async fn send_request(&self, request: Request<Body>) -> Response<Body> {
        // Router is cheap to clone
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Post JSON to an endpoint
    pub async fn post(&self, uri: &str, body: &Value, headers: &[(&str, &str)]) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }

        let request = builder.body(Body::from(body.to_string())).unwrap();
        self.send_request(request).await
    }

    /// Get request to an endpoint
    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }

        let request = builder.body(Body::empty()).unwrap();
        self.send_request(request).await
    }

    /// Provision a VM for `tenant_id` as the root admin and return its
    /// one-time panel password, if the account was new.
    pub async fn provision(&self, tenant_id: &str) -> Option<String> {
        let outcome = self
            .fleet
            .coordinator
            .create(
                ROOT_ADMIN,
                tenant_id,
                VmSpecs {
                    ram_gib: 2,
                    vcpu: 1,
                    disk_gib: 20,
                },
            )
            .await
            .expect("Failed to create fixture VM");
        outcome.credentials.secret
    }

    /// Log in and return the session token.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .post(
                "/api/v1/login",
                &json!({ "username": username, "password": password }),
                &[],
            )
            .await;
        let body: Value = extract_json_body(response).await;
        body["session"]
            .as_str()
            .expect("login should return a session")
            .to_string()
    }

    /// Provision a tenant and log in as it.
    pub async fn session_for(&self, tenant_id: &str) -> String {
        let password = self
            .provision(tenant_id)
            .await
            .expect("tenant should be new");
        self.login(&format!("user{}", tenant_id), &password).await
    }
}

/// Helper to extract JSON body from axum response
pub async fn extract_json_body<T>(response: Response<Body>) -> T
where
    T: serde::de::DeserializeOwned,
{
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}
