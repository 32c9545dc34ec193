pub mod health;
pub mod invoke;
pub mod login;
pub mod vps;

use crate::{
    auth::{dispatch_token_middleware, session_middleware},
    state::AppState,
};
use axum::{middleware, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_app(state: AppState) -> Router {
    // Allow CORS for the panel frontend served from another origin
    let cors = CorsLayer::permissive();

    Router::new()
        .merge(health::routes()) // Health and login routes don't need a session
        .merge(login::routes())
        .merge(
            vps::routes()
                .merge(login::session_routes())
                .layer(middleware::from_fn_with_state(state.clone(), session_middleware)),
        )
        .merge(
            invoke::routes().layer(middleware::from_fn_with_state(
                state.clone(),
                dispatch_token_middleware,
            )),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
