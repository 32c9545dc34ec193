use crate::{auth::PanelUser, error::ApiResult, state::AppState};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use vps_orchestrator::{UserFacingResult, VmRecord};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/vps", get(list_vps))
        .route("/api/v1/vps/{index}/start", post(start_vps))
        .route("/api/v1/vps/{index}/stop", post(stop_vps))
}

async fn list_vps(
    State(state): State<AppState>,
    Extension(user): Extension<PanelUser>,
) -> ApiResult<Json<Vec<VmRecord>>> {
    let records = state.coordinator.list(&user.tenant_id).await?;
    Ok(Json(records))
}

async fn start_vps(
    State(state): State<AppState>,
    Extension(user): Extension<PanelUser>,
    Path(index): Path<usize>,
) -> ApiResult<Json<UserFacingResult>> {
    let record = state.coordinator.start(&user.tenant_id, index).await?;
    Ok(Json(
        UserFacingResult::ok(format!("{} started", record.vm_name)).with_record(record),
    ))
}

async fn stop_vps(
    State(state): State<AppState>,
    Extension(user): Extension<PanelUser>,
    Path(index): Path<usize>,
) -> ApiResult<Json<UserFacingResult>> {
    let record = state.coordinator.stop(&user.tenant_id, index).await?;
    Ok(Json(
        UserFacingResult::ok(format!("{} stopped", record.vm_name)).with_record(record),
    ))
}
