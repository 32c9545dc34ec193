use crate::state::AppState;
use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use vps_orchestrator::UserFacingResult;

/// One chat command, already split by the front end.
#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub operation: String,
    pub caller_id: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Tenant mentioned in the command, if any
    #[serde(default)]
    pub target: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/invoke", post(invoke))
}

/// Command failures are part of the reply (`ok: false`), not HTTP errors.
async fn invoke(
    State(state): State<AppState>,
    Json(req): Json<InvokeRequest>,
) -> Json<UserFacingResult> {
    let result = state
        .dispatcher
        .invoke(&req.operation, &req.caller_id, &req.args, req.target.as_deref())
        .await;
    Json(result)
}
