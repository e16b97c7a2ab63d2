//! Tool backend contract.
//!
//! A backend performs the actual infrastructure operation (a container
//! restart, a cache flush, a cloud API call). Adapters validate arguments
//! and then hand the operation to a backend by name.

use async_trait::async_trait;
use mender_types::ToolParams;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolCallResult;

/// What a backend reports after running one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl BackendOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            metadata: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Executes named infrastructure operations.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Run `operation` with already validated `params`.
    ///
    /// Returns `Err` only when the backend itself could not be reached;
    /// an operation that ran and failed is an `Ok` outcome with `success = false`.
    async fn invoke(&self, operation: &str, params: &ToolParams) -> ToolCallResult<BackendOutcome>;
}
