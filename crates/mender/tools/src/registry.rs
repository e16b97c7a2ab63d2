//! Name-keyed tool registry.
//!
//! The registry is built once at startup from a set of family adapters.
//! [`ToolRegistry::execute`] never fails: unknown tools, invalid arguments,
//! backend outages and timeouts all come back as a failed [`ToolResult`] so
//! a bad step cannot abort the rest of a plan.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mender_types::{ToolDescriptor, ToolParams, ToolResult};
use tracing::{debug, info, instrument, warn};

use crate::adapter::{FamilyAdapter, ToolAdapter};
use crate::backend::ToolBackend;
use crate::error::ToolError;
use crate::family::{ToolDefaults, ToolFamily};
use crate::schema;

struct RegisteredTool {
    descriptor: ToolDescriptor,
    adapter: Arc<dyn ToolAdapter>,
}

/// Registry of executable tools.
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Registry with every family routed to `backend`.
    pub fn standard(backend: Arc<dyn ToolBackend>, defaults: ToolDefaults) -> Self {
        let mut registry = Self::new();
        for family in ToolFamily::ALL {
            registry.register(Arc::new(FamilyAdapter::new(
                family,
                defaults.clone(),
                backend.clone(),
            )));
        }
        info!(tools = registry.len(), backend = backend.name(), "Registered tools");
        registry
    }

    /// Per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register every tool in `adapter`'s catalog. Later registrations win on name clashes.
    pub fn register(&mut self, adapter: Arc<dyn ToolAdapter>) {
        for descriptor in adapter.catalog() {
            debug!(tool = %descriptor.name, family = %adapter.family(), "Registered tool");
            self.tools.insert(
                descriptor.name.clone(),
                RegisteredTool {
                    descriptor,
                    adapter: adapter.clone(),
                },
            );
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|t| &t.descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All descriptors, ordered by name.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor.clone()).collect()
    }

    /// Descriptors whose family matches `resource_type`, or whose name contains it.
    pub fn list_for(&self, resource_type: Option<&str>) -> Vec<ToolDescriptor> {
        let Some(filter) = resource_type.map(str::to_ascii_lowercase) else {
            return self.list();
        };
        self.tools
            .values()
            .map(|t| &t.descriptor)
            .filter(|d| d.resource_type == filter || d.name.to_ascii_lowercase().contains(&filter))
            .cloned()
            .collect()
    }

    /// Validate and run one tool.
    #[instrument(skip(self, params))]
    pub async fn execute(&self, name: &str, params: &ToolParams) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "Tool not found");
            return ToolError::ToolNotFound(name.to_string()).into_result(name);
        };

        let args = match schema::prepare(&tool.descriptor, params) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = name, error = %e, "Rejected tool call");
                return e.into_result(name);
            }
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, tool.adapter.execute(&tool.descriptor, &args)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(outcome)) => {
                info!(tool = name, success = outcome.success, elapsed_ms, "Tool executed");
                let result = if outcome.success {
                    ToolResult::success(name, outcome.message)
                } else {
                    ToolResult::failure(name, outcome.message)
                };
                match outcome.metadata {
                    Some(metadata) => result.with_metadata(metadata),
                    None => result,
                }
            }
            Ok(Err(e)) => {
                warn!(tool = name, error = %e, elapsed_ms, "Tool failed");
                e.into_result(name)
            }
            Err(_) => {
                let e = ToolError::Timeout {
                    tool: name.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                };
                warn!(tool = name, error = %e, "Tool timed out");
                e.into_result(name)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
