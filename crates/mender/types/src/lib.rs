//! Mender shared types
//!
//! The data model of the fix pipeline:
//! - resources and their health snapshots
//! - log entries and failure contexts
//! - tool descriptors, plans and tool results
//! - fix attempts, evaluations and analysis interactions

pub mod context;
pub mod error;
pub mod evaluation;
pub mod ids;
pub mod interaction;
pub mod log;
pub mod plan;
pub mod resource;
pub mod tool;

pub use context::{FailureContext, PreviousAttempt, TriggerRequest};
pub use error::{ErrorKind, EvaluationError};
pub use evaluation::{
    AttemptError, EvaluationFilter, ExecutionStatus, FailedResource, FinalStatus, FixAttempt,
    FixEvaluation,
};
pub use ids::{FixId, InteractionId, ResourceId};
pub use interaction::{DroppedStep, LlmInteraction, TokenUsage};
pub use log::{LogEntry, Severity, TimeRange};
pub use plan::{FixPlan, FixStep};
pub use resource::{HealthStatus, MetricMap, ResourceDescriptor, ResourceKind, ResourceStatus};
pub use tool::{ParamSpec, ParamType, ToolDescriptor, ToolParams, ToolResult};
