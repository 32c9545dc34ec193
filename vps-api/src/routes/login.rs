use crate::{
    auth::{PanelUser, SESSION_HEADER},
    error::{ApiError, ApiResult},
    state::AppState,
};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub session: String,
    pub username: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/login", post(login))
}

/// Routes that require a session
pub fn session_routes() -> Router<AppState> {
    Router::new().route("/api/v1/logout", post(logout))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let account = state
        .coordinator
        .credentials()
        .authenticate(&req.username, &req.password)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    let session = state.sessions.open(&account).await;
    info!(username = %account.panel_username, "panel login");

    Ok(Json(LoginResponse {
        session,
        username: account.panel_username,
    }))
}

async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<PanelUser>,
    headers: HeaderMap,
) -> Json<Value> {
    if let Some(token) = headers.get(SESSION_HEADER).and_then(|h| h.to_str().ok()) {
        state.sessions.close(token).await;
    }
    info!(username = %user.username, "panel logout");
    Json(json!({ "message": "Logged out" }))
}
