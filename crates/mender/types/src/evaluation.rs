//! Fix attempts and the persisted evaluation record
//!
//! A [`FixEvaluation`] is created when a trigger begins, receives one
//! [`FixAttempt`] per analyze/execute/verify cycle and is sealed once the
//! workflow reaches a terminal state. The aggregate status and attempt count
//! are derived from the attempt list and cannot be set directly.

use crate::context::{FailureContext, TriggerRequest};
use crate::error::{ErrorKind, EvaluationError};
use crate::ids::{FixId, InteractionId, ResourceId};
use crate::plan::FixPlan;
use crate::resource::{HealthStatus, ResourceStatus};
use crate::tool::ToolResult;
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Status of an attempt or of a whole evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Failed,
    /// Nothing was unhealthy when the workflow started.
    NoActionNeeded,
    /// The workflow has not been sealed yet.
    InProgress,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "SUCCESS"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
            ExecutionStatus::NoActionNeeded => write!(f, "NO_ACTION_NEEDED"),
            ExecutionStatus::InProgress => write!(f, "IN_PROGRESS"),
        }
    }
}

/// How a workflow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    Success,
    FailedAfterRetries,
    NoActionNeeded,
    /// Terminated early by an analysis error or cancellation.
    Failed,
}

impl FinalStatus {
    pub fn execution_status(&self) -> ExecutionStatus {
        match self {
            FinalStatus::Success => ExecutionStatus::Success,
            FinalStatus::NoActionNeeded => ExecutionStatus::NoActionNeeded,
            FinalStatus::FailedAfterRetries | FinalStatus::Failed => ExecutionStatus::Failed,
        }
    }
}

/// A resource still unhealthy after an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedResource {
    pub resource_id: ResourceId,
    pub name: String,
    pub before_status: HealthStatus,
    pub after_status: HealthStatus,
    pub reason: String,
}

/// Error that terminated an attempt before verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AttemptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One analyze/execute/verify cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixAttempt {
    pub attempt_number: u32,
    #[serde(default)]
    pub fix_plan: Option<FixPlan>,
    /// Ordered exactly like the plan's steps.
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
    #[serde(default)]
    pub before: Vec<ResourceStatus>,
    #[serde(default)]
    pub after: Vec<ResourceStatus>,
    pub execution_status: ExecutionStatus,
    pub issues_resolved: bool,
    #[serde(default)]
    pub failed_resources: Vec<FailedResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<InteractionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AttemptError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl FixAttempt {
    /// Tool names that were actually executed, in order.
    pub fn tools_used(&self) -> Vec<String> {
        self.tool_results.iter().map(|r| r.tool_name.clone()).collect()
    }
}

/// Query filter for stored evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationFilter {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
}

impl Default for EvaluationFilter {
    fn default() -> Self {
        Self {
            limit: default_list_limit(),
            status: None,
        }
    }
}

fn default_list_limit() -> usize {
    100
}

impl EvaluationFilter {
    pub fn matches(&self, evaluation: &FixEvaluation) -> bool {
        self.status
            .map_or(true, |status| evaluation.execution_status() == status)
    }
}

/// Persisted record of one fix workflow across all of its attempts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FixEvaluation {
    id: FixId,
    timestamp: DateTime<Utc>,
    trigger: TriggerRequest,
    /// Before-state captured once when the workflow started.
    failure_context: FailureContext,
    #[serde(default)]
    attempts: Vec<FixAttempt>,
    #[serde(default)]
    final_status: Option<FinalStatus>,
    #[serde(default)]
    sealed_at: Option<DateTime<Utc>>,
}

impl FixEvaluation {
    pub fn new(id: FixId, trigger: TriggerRequest, failure_context: FailureContext) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            trigger,
            failure_context,
            attempts: Vec::new(),
            final_status: None,
            sealed_at: None,
        }
    }

    pub fn id(&self) -> &FixId {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn trigger(&self) -> &TriggerRequest {
        &self.trigger
    }

    pub fn failure_context(&self) -> &FailureContext {
        &self.failure_context
    }

    pub fn attempts(&self) -> &[FixAttempt] {
        &self.attempts
    }

    pub fn final_status(&self) -> Option<FinalStatus> {
        self.final_status
    }

    pub fn sealed_at(&self) -> Option<DateTime<Utc>> {
        self.sealed_at
    }

    pub fn is_sealed(&self) -> bool {
        self.final_status.is_some()
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts.len()
    }

    /// Aggregate status, derived from the seal and the last attempt.
    pub fn execution_status(&self) -> ExecutionStatus {
        match self.final_status {
            None => ExecutionStatus::InProgress,
            Some(FinalStatus::NoActionNeeded) => ExecutionStatus::NoActionNeeded,
            Some(_) => self
                .attempts
                .last()
                .map(|a| a.execution_status)
                .unwrap_or(ExecutionStatus::Failed),
        }
    }

    /// Error kind that explains a failed terminal state.
    pub fn terminal_error(&self) -> Option<ErrorKind> {
        match self.final_status? {
            FinalStatus::FailedAfterRetries => Some(ErrorKind::RetryExhausted),
            FinalStatus::Failed => Some(
                self.attempts
                    .last()
                    .and_then(|a| a.error.as_ref())
                    .map_or(ErrorKind::Interrupted, |e| e.kind),
            ),
            _ => None,
        }
    }

    /// Root cause from the most recent attempt that produced a plan.
    pub fn root_cause(&self) -> Option<&str> {
        self.attempts
            .iter()
            .rev()
            .find_map(|a| a.fix_plan.as_ref())
            .map(|p| p.root_cause.as_str())
    }

    /// Distinct tools executed across all attempts, in first-use order.
    pub fn tools_used(&self) -> Vec<String> {
        let mut tools: Vec<String> = Vec::new();
        for name in self.attempts.iter().flat_map(|a| a.tools_used()) {
            if !tools.contains(&name) {
                tools.push(name);
            }
        }
        tools
    }

    pub fn interaction_ids(&self) -> Vec<InteractionId> {
        self.attempts
            .iter()
            .filter_map(|a| a.interaction_id.clone())
            .collect()
    }

    /// Append the next attempt. Numbers start at 1 and increase by one.
    pub fn append_attempt(&mut self, attempt: FixAttempt) -> Result<(), EvaluationError> {
        if self.is_sealed() {
            return Err(EvaluationError::Sealed(self.id.clone()));
        }
        let expected = self.attempts.len() as u32 + 1;
        if attempt.attempt_number != expected {
            return Err(EvaluationError::AttemptOutOfOrder {
                id: self.id.clone(),
                expected,
                actual: attempt.attempt_number,
            });
        }
        self.attempts.push(attempt);
        Ok(())
    }

    /// Mark the evaluation terminal. No further changes are accepted.
    pub fn seal(&mut self, final_status: FinalStatus) -> Result<(), EvaluationError> {
        if self.is_sealed() {
            return Err(EvaluationError::Sealed(self.id.clone()));
        }
        self.final_status = Some(final_status);
        self.sealed_at = Some(Utc::now());
        Ok(())
    }
}

impl Serialize for FixEvaluation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FixEvaluation", 13)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("trigger", &self.trigger)?;
        state.serialize_field("failure_context", &self.failure_context)?;
        state.serialize_field("attempts", &self.attempts)?;
        state.serialize_field("final_status", &self.final_status)?;
        state.serialize_field("sealed_at", &self.sealed_at)?;
        state.serialize_field("execution_status", &self.execution_status())?;
        state.serialize_field("total_attempts", &self.total_attempts())?;
        state.serialize_field("root_cause", &self.root_cause())?;
        state.serialize_field("tools_used", &self.tools_used())?;
        state.serialize_field("interaction_ids", &self.interaction_ids())?;
        state.serialize_field("terminal_error", &self.terminal_error())?;
        state.end()
    }
}
