//! `AppError`: the HTTP-facing aggregate of every domain error, mapped onto
//! the status families from §7.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use authz_core::error::{PapError, PdpError, SeederError, StoreError, SubjectError};

/// The HTTP-facing error type every route handler returns.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    ServiceUnavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
        };
        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<PdpError> for AppError {
    fn from(err: PdpError) -> Self {
        match err {
            PdpError::InvalidRequest(msg) => Self::BadRequest(msg),
            PdpError::Cancelled => Self::ServiceUnavailable("operation was cancelled".to_string()),
            PdpError::Store(err) => Self::from(err),
        }
    }
}

impl From<PapError> for AppError {
    fn from(err: PapError) -> Self {
        match err {
            PapError::InvalidRequest(msg) => Self::BadRequest(msg),
            PapError::RoleNotFound(msg) | PapError::MappingNotFound(msg) => Self::NotFound(msg),
            PapError::RoleAlreadyExists(msg) | PapError::MappingAlreadyExists(msg) => Self::Conflict(msg),
            PapError::SystemMappingImmutable(msg) => Self::BadRequest(msg),
            PapError::AuthzDisabled => Self::BadRequest("authorization subsystem is disabled".to_string()),
            PapError::Internal(msg) => Self::Internal(msg),
            PapError::Store(err) => Self::from(err),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<SeederError> for AppError {
    fn from(err: SeederError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<SubjectError> for AppError {
    fn from(err: SubjectError) -> Self {
        match err {
            SubjectError::InvalidConfig(msg) => Self::Internal(msg),
            SubjectError::MalformedToken(msg) => Self::BadRequest(msg),
            SubjectError::NoMatch => Self::BadRequest("no valid user type detected".to_string()),
        }
    }
}
