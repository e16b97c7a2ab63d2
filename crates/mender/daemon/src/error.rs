//! Error types for mender-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mender_engine::{EngineError, StoreError as EvaluationStoreError};
use mender_monitor::MonitorError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("Query error: {0}")]
    Query(String),
}

impl From<StorageError> for EvaluationStoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidData(msg) => EvaluationStoreError::Serialization(msg),
            other => EvaluationStoreError::Backend(other.to_string()),
        }
    }
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Another fix workflow holds the orchestrator
    #[error("Fix already in progress")]
    FixInProgress { fix_id: Option<String> },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Evaluation store error
    #[error("Storage error: {0}")]
    Storage(#[from] EvaluationStoreError),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::FixInProgress { fix_id } => ApiError::FixInProgress {
                fix_id: fix_id.map(|id| id.to_string()),
            },
            EngineError::Store(e) => ApiError::Storage(e),
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::ResourceNotFound(id) => {
                ApiError::NotFound(format!("Resource {} not found", id))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::FixInProgress { .. } => (StatusCode::CONFLICT, "FIX_IN_PROGRESS"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Storage(EvaluationStoreError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        };

        let details = match &self {
            ApiError::FixInProgress { fix_id: Some(id) } => {
                Some(serde_json::json!({ "fix_id": id }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;
    use mender_types::FixId;

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::NotFound("fix".to_string()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::BadRequest("limit".to_string()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Storage(EvaluationStoreError::NotFound(FixId::new("fix_00000000")))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_fix_in_progress_is_conflict() {
        let err: ApiError = EngineError::FixInProgress {
            fix_id: Some(FixId::new("fix_0badcafe")),
        }
        .into();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
