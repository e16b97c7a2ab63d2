//! Failure context handed to the analysis client

use crate::evaluation::FailedResource;
use crate::ids::ResourceId;
use crate::log::LogEntry;
use crate::resource::ResourceStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-supplied scope of a fix workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// Restrict the workflow to these resources. All configured resources otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_ids: Option<Vec<ResourceId>>,

    /// Relative log window such as `15m` or `1h`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<String>,
}

/// Feedback about an attempt that did not resolve the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviousAttempt {
    pub attempt_number: u32,
    pub tools_used: Vec<String>,
    pub failed_resources: Vec<FailedResource>,
    pub message: String,
}

/// Immutable snapshot of the world at the start of an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureContext {
    pub captured_at: DateTime<Utc>,
    pub resources: Vec<ResourceStatus>,
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub application: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attempt: Option<PreviousAttempt>,
}

impl FailureContext {
    pub fn new(
        resources: Vec<ResourceStatus>,
        logs: Vec<LogEntry>,
        application: serde_json::Value,
    ) -> Self {
        Self {
            captured_at: Utc::now(),
            resources,
            logs,
            application,
            previous_attempt: None,
        }
    }

    pub fn with_previous_attempt(mut self, previous: PreviousAttempt) -> Self {
        self.previous_attempt = Some(previous);
        self
    }

    /// Resources currently degraded or failed.
    pub fn unhealthy(&self) -> impl Iterator<Item = &ResourceStatus> {
        self.resources.iter().filter(|r| r.is_unhealthy())
    }

    /// True when nothing in the context needs fixing.
    pub fn is_failure_free(&self) -> bool {
        self.unhealthy().next().is_none()
    }

    pub fn resource_ids(&self) -> Vec<ResourceId> {
        self.resources.iter().map(|r| r.id.clone()).collect()
    }
}
