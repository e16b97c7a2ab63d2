//! Error types for mender-monitor.

use mender_types::ResourceId;
use thiserror::Error;

/// Errors raised by metric adapters, log sources and the monitor itself.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Metric adapter could not be reached or returned an error.
    #[error("adapter unavailable for resource {resource_id}: {reason}")]
    AdapterUnavailable {
        resource_id: ResourceId,
        reason: String,
    },

    /// Metric adapter did not answer in time.
    #[error("adapter timed out for resource {resource_id} after {timeout_ms}ms")]
    AdapterTimeout {
        resource_id: ResourceId,
        timeout_ms: u64,
    },

    /// No adapter is registered for the resource's kind.
    #[error("no metric adapter registered for kind {0}")]
    NoAdapter(mender_types::ResourceKind),

    /// Resource is not configured.
    #[error("resource not found: {0}")]
    ResourceNotFound(ResourceId),

    /// Log source failure.
    #[error("log source error: {0}")]
    LogSource(String),
}

impl MonitorError {
    pub fn unavailable(resource_id: &ResourceId, reason: impl Into<String>) -> Self {
        MonitorError::AdapterUnavailable {
            resource_id: resource_id.clone(),
            reason: reason.into(),
        }
    }
}

/// Result type for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;
