use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "vps-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check(State(state): State<AppState>) -> Json<Value> {
    // Check that the document store is readable
    let store_ok = state.store.list_documents("").is_ok();

    Json(json!({
        "status": if store_ok { "ready" } else { "not_ready" },
        "service": "vps-api",
        "version": env!("CARGO_PKG_VERSION"),
        "store": if store_ok { "available" } else { "unavailable" }
    }))
}
