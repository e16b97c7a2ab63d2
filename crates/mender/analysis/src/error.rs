//! Error types for mender-analysis.

use mender_types::InteractionId;
use thiserror::Error;

/// Failure reported by an LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Failure of one analysis call.
///
/// Every variant that reached the provider carries the id of the recorded
/// interaction so callers can link the failure to its audit entry.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis provider error: {source}")]
    Provider {
        interaction_id: InteractionId,
        #[source]
        source: ProviderError,
    },

    #[error("analysis timed out after {timeout_secs}s")]
    Timeout {
        interaction_id: InteractionId,
        timeout_secs: u64,
    },

    #[error("analysis cancelled: deadline expired")]
    Cancelled { interaction_id: InteractionId },

    #[error("unparsable analysis reply: {reason}")]
    Malformed {
        interaction_id: InteractionId,
        reason: String,
    },
}

impl AnalysisError {
    pub fn interaction_id(&self) -> &InteractionId {
        match self {
            AnalysisError::Provider { interaction_id, .. }
            | AnalysisError::Timeout { interaction_id, .. }
            | AnalysisError::Cancelled { interaction_id }
            | AnalysisError::Malformed { interaction_id, .. } => interaction_id,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, AnalysisError::Malformed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Cancelled { .. })
    }
}

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;
