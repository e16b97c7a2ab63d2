//! Tool adapters.

use std::sync::Arc;

use async_trait::async_trait;
use mender_types::{ToolDescriptor, ToolParams};

use crate::backend::{BackendOutcome, ToolBackend};
use crate::error::{ToolCallResult, ToolError};
use crate::families;
use crate::family::{ToolDefaults, ToolFamily};

/// Executes the tools of one resource family.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    fn family(&self) -> ToolFamily;

    /// Tools this adapter can run.
    fn catalog(&self) -> Vec<ToolDescriptor>;

    /// Run `tool` with arguments already validated against its schema.
    async fn execute(&self, tool: &ToolDescriptor, params: &ToolParams) -> ToolCallResult<BackendOutcome>;
}

/// Adapter backed by a [`ToolBackend`], with the family's catalog and range checks.
pub struct FamilyAdapter {
    family: ToolFamily,
    defaults: ToolDefaults,
    backend: Arc<dyn ToolBackend>,
}

impl FamilyAdapter {
    pub fn new(family: ToolFamily, defaults: ToolDefaults, backend: Arc<dyn ToolBackend>) -> Self {
        Self {
            family,
            defaults,
            backend,
        }
    }
}

#[async_trait]
impl ToolAdapter for FamilyAdapter {
    fn family(&self) -> ToolFamily {
        self.family
    }

    fn catalog(&self) -> Vec<ToolDescriptor> {
        families::catalog(self.family, &self.defaults)
    }

    async fn execute(&self, tool: &ToolDescriptor, params: &ToolParams) -> ToolCallResult<BackendOutcome> {
        families::check(self.family, &tool.name, params)
            .map_err(|reason| ToolError::invalid(&tool.name, reason))?;
        self.backend.invoke(&tool.name, params).await
    }
}
