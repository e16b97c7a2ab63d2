//! Error types for mender-tools.

use mender_types::{ErrorKind, ToolResult};
use thiserror::Error;

/// Errors raised while dispatching a tool call.
///
/// None of these escape [`ToolRegistry::execute`](crate::ToolRegistry::execute):
/// they are rendered into a failed [`ToolResult`] instead.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid parameters for {tool}: {reason}")]
    InvalidParameters { tool: String, reason: String },

    #[error("tool backend unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("tool {tool} timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    #[error("tool backend error: {0}")]
    Backend(String),
}

impl ToolError {
    pub fn invalid(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolError::InvalidParameters {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Pipeline error kind recorded on the resulting tool result.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ToolError::ToolNotFound(_) => Some(ErrorKind::ToolNotFound),
            ToolError::InvalidParameters { .. } => Some(ErrorKind::InvalidParameters),
            ToolError::AdapterUnavailable(_) | ToolError::Timeout { .. } => {
                Some(ErrorKind::AdapterUnavailable)
            }
            ToolError::Backend(_) => None,
        }
    }

    /// Render into a failed tool result.
    pub fn into_result(self, tool_name: &str) -> ToolResult {
        let result = ToolResult::failure(tool_name, self.to_string());
        match self.kind() {
            Some(kind) => result.with_error(kind),
            None => result,
        }
    }
}

/// Result type for tool operations.
pub type ToolCallResult<T> = Result<T, ToolError>;
