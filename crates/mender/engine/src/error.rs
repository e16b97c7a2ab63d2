//! Error types for mender-engine.

use mender_types::{ErrorKind, EvaluationError, FixId};
use thiserror::Error;

/// Evaluation store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("evaluation not found: {0}")]
    NotFound(FixId),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Orchestrator errors surfaced to callers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another workflow holds the orchestrator slot.
    #[error("a fix is already in progress{}", .fix_id.as_ref().map(|id| format!(": {}", id)).unwrap_or_default())]
    FixInProgress { fix_id: Option<FixId> },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            EngineError::FixInProgress { .. } => Some(ErrorKind::FixInProgress),
            EngineError::Store(_) => None,
        }
    }
}

/// Result type for orchestrator operations.
pub type EngineResult<T> = Result<T, EngineError>;
