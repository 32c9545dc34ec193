use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use vps_core::secrets::{constant_time_eq, generate_token};
use vps_orchestrator::TenantAccount;

use crate::state::AppState;

/// Header carrying the panel session token
pub const SESSION_HEADER: &str = "x-session";

/// Header carrying the dispatcher's shared secret
pub const DISPATCH_TOKEN_HEADER: &str = "x-dispatch-token";

/// Tenant behind an authenticated panel session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelUser {
    pub tenant_id: String,
    pub username: String,
}

/// In-memory panel sessions. Sessions do not survive a restart.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, PanelUser>>>,
}

impl SessionStore {
    /// Open a session for `account` and return its token.
    pub async fn open(&self, account: &TenantAccount) -> String {
        let token = generate_token();
        let user = PanelUser {
            tenant_id: account.tenant_id.clone(),
            username: account.panel_username.clone(),
        };
        self.sessions.write().await.insert(token.clone(), user);
        token
    }

    pub async fn get(&self, token: &str) -> Option<PanelUser> {
        self.sessions.read().await.get(token).cloned()
    }

    /// `true` if a session was closed.
    pub async fn close(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }
}

/// Session middleware - resolves the `x-session` header to a [`PanelUser`]
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let Some(user) = state.sessions.get(token).await else {
        debug!("rejected unknown session");
        return Err(StatusCode::UNAUTHORIZED);
    };

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Dispatcher middleware - requires the configured shared secret
///
/// Without a configured token the dispatcher endpoint is closed.
pub async fn dispatch_token_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.dispatch_token.as_deref() else {
        warn!("dispatch request rejected: no dispatch token configured");
        return Err(StatusCode::FORBIDDEN);
    };

    let presented = req
        .headers()
        .get(DISPATCH_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        debug!("rejected wrong dispatch token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(tenant_id: &str) -> TenantAccount {
        serde_json::from_value(serde_json::json!({
            "tenant_id": tenant_id,
            "panel_username": format!("user{}", tenant_id),
            "panel_password_hash": "pbkdf2-sha256$1$AA$AA",
            "created_at": "2024-01-01T00:00:00Z",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let sessions = SessionStore::default();
        let token = sessions.open(&account("42")).await;

        let user = sessions.get(&token).await.unwrap();
        assert_eq!(user.tenant_id, "42");
        assert_eq!(user.username, "user42");

        assert!(sessions.close(&token).await);
        assert!(sessions.get(&token).await.is_none());
        assert!(!sessions.close(&token).await);
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let sessions = SessionStore::default();
        let a = sessions.open(&account("1")).await;
        let b = sessions.open(&account("1")).await;
        assert_ne!(a, b);
    }
}
