use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::model::OperationResult;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the entity engine.
///
/// Batch operations never surface these directly: per-item failures are
/// folded into the outcome envelope's error map instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid identifier '{raw}': {reason}")]
    InvalidIdentifier { raw: String, reason: String },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("{0}")]
    PreconditionRejected(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("the form has already been processed")]
    DuplicateSubmission,
    #[error("referenced {entity_type} '{id}' no longer exists")]
    StaleReference { entity_type: String, id: String },
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Store(anyhow::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::InvalidIdentifier { .. }
            | Self::PreconditionRejected(_)
            | Self::UnsupportedOperation(_) => StatusCode::BAD_REQUEST,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::DuplicateSubmission => StatusCode::CONFLICT,
            Self::StaleReference { .. } | Self::Configuration(_) | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Marker error a store returns when an optimistic version check fails.
#[derive(Debug, Error)]
#[error("{entity_type} '{id}' was modified concurrently (expected version {expected}, found {found})")]
pub struct VersionConflict {
    pub entity_type: String,
    pub id: String,
    pub expected: i32,
    pub found: i32,
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<EngineError>() {
            Ok(engine) => return engine,
            Err(err) => err,
        };
        match err.downcast::<VersionConflict>() {
            Ok(conflict) => Self::Conflict(conflict.to_string()),
            Err(err) => Self::Store(err),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(err.into())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {:#}", self);
        }
        (status, Json(OperationResult::failure(self.to_string()))).into_response()
    }
}
