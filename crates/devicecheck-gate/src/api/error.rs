//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use devicecheck_core::DeviceCheckError;
use serde::Serialize;
use thiserror::Error;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream rejected the request: {0}")]
    BadGateway(String),

    #[error("Upstream unavailable: {0}")]
    GatewayTimeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_REJECTED", msg),
            ApiError::GatewayTimeout(msg) => {
                (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_UNAVAILABLE", msg)
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<DeviceCheckError> for ApiError {
    fn from(err: DeviceCheckError) -> Self {
        match err {
            DeviceCheckError::MisconfiguredRequest(msg) => ApiError::BadRequest(msg),
            DeviceCheckError::BitStateNotFound(msg) => ApiError::NotFound(msg),
            DeviceCheckError::Conflict { description, .. } => ApiError::Conflict(description),
            DeviceCheckError::AppleRejection {
                status_code,
                description,
            } => ApiError::BadGateway(format!("{} {}", status_code, description)),
            DeviceCheckError::TransportFailure(msg) => ApiError::GatewayTimeout(msg),
            DeviceCheckError::InvalidKeyMaterial(_) | DeviceCheckError::Config(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}
