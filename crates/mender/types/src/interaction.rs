//! Audit records of analysis provider calls

use crate::ids::InteractionId;
use crate::plan::FixPlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// A plan step removed while validating the provider's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedStep {
    pub tool_name: String,
    pub reason: String,
}

/// One analysis call, recorded whether or not it produced a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmInteraction {
    pub id: InteractionId,
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    /// Serialized request text sent to the provider.
    pub prompt: String,
    /// Raw reply text. Empty when the provider never answered.
    pub response: String,
    /// Parsed plan, `None` when the reply could not be parsed.
    pub fix_plan: Option<FixPlan>,
    #[serde(default)]
    pub dropped_steps: Vec<DroppedStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub usage: TokenUsage,
    pub duration_ms: u64,
}

impl LlmInteraction {
    pub fn tokens_used(&self) -> u32 {
        self.usage.total_tokens.unwrap_or_else(|| {
            self.usage.input_tokens.unwrap_or(0) + self.usage.output_tokens.unwrap_or(0)
        })
    }
}
