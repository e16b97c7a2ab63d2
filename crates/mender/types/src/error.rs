//! Error kinds shared across the fix pipeline

use crate::ids::FixId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of failures recorded on tool results, attempts and evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A metric or tool adapter could not be reached.
    AdapterUnavailable,
    /// A plan step named a tool that is not registered.
    ToolNotFound,
    /// A plan step's parameters did not match the tool schema.
    InvalidParameters,
    /// The reasoning provider failed or returned an unusable reply.
    AnalysisError,
    /// A caller deadline expired.
    Cancelled,
    /// Another fix workflow was already running.
    FixInProgress,
    /// All attempts ran without resolving the failure.
    RetryExhausted,
    /// The workflow stopped before it could record its outcome.
    Interrupted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::AdapterUnavailable => "AdapterUnavailable",
            ErrorKind::ToolNotFound => "ToolNotFound",
            ErrorKind::InvalidParameters => "InvalidParameters",
            ErrorKind::AnalysisError => "AnalysisError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::FixInProgress => "FixInProgress",
            ErrorKind::RetryExhausted => "RetryExhausted",
            ErrorKind::Interrupted => "Interrupted",
        };
        f.write_str(name)
    }
}

/// Violations of the append-only evaluation lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// The evaluation was already sealed.
    #[error("evaluation {0} is sealed")]
    Sealed(FixId),

    /// Attempt numbers must increase by one.
    #[error("evaluation {id} expected attempt {expected}, got {actual}")]
    AttemptOutOfOrder { id: FixId, expected: u32, actual: u32 },
}
