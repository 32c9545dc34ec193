use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use vps_orchestrator::FleetError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    /// The hypervisor reported a failure
    #[error("{0}")]
    BadGateway(String),
    /// The hypervisor did not answer; the VM state is unknown
    #[error("{0}")]
    GatewayTimeout(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let pending = matches!(self, ApiError::GatewayTimeout(_));
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = if pending {
            json!({ "error": message, "pending": true })
        } else {
            json!({ "error": message })
        };
        (status, Json(body)).into_response()
    }
}

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        let message = err.to_string();
        match err {
            FleetError::Validation(_) => ApiError::BadRequest(message),
            FleetError::Authorization(_) => ApiError::Forbidden(message),
            FleetError::NotFound(_) => ApiError::NotFound(message),
            FleetError::Provision(_) | FleetError::Driver(_) => ApiError::BadGateway(message),
            FleetError::Timeout(_) => ApiError::GatewayTimeout(message),
            FleetError::Storage(_) => ApiError::Internal(message),
        }
    }
}
