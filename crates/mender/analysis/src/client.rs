//! Analysis client: failure context in, validated fix plan out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mender_types::{
    DroppedStep, FailureContext, FixPlan, InteractionId, LlmInteraction, ToolDescriptor, TokenUsage,
};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{AnalysisError, AnalysisResult};
use crate::history::InteractionLog;
use crate::parse::{parse_reply, ParseResult};
use crate::prompt;
use crate::provider::{CompletionRequest, LlmProvider};

/// Analysis client settings.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Upper bound for one provider call.
    pub timeout: Duration,

    /// Ask once more when a reply cannot be parsed.
    pub reask_on_malformed: bool,

    /// Interactions kept in memory.
    pub history_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            reask_on_malformed: true,
            history_limit: 500,
        }
    }
}

/// A validated plan and the interaction that produced it.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub plan: FixPlan,
    pub interaction_id: InteractionId,
    pub dropped: Vec<DroppedStep>,
}

/// Builds requests, calls the provider and parses replies.
///
/// Every provider call is recorded in the interaction history, including
/// timeouts, provider errors and unparsable replies.
pub struct AnalysisClient {
    provider: Arc<dyn LlmProvider>,
    config: AnalysisConfig,
    history: InteractionLog,
}

impl AnalysisClient {
    pub fn new(provider: Arc<dyn LlmProvider>, config: AnalysisConfig) -> Self {
        let history = InteractionLog::new(config.history_limit);
        Self {
            provider,
            config,
            history,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Produce a plan for `context` restricted to `tools`.
    pub async fn analyze(&self, context: &FailureContext, tools: &[ToolDescriptor]) -> AnalysisResult<Analysis> {
        self.analyze_until(context, tools, None).await
    }

    /// Like [`analyze`](Self::analyze), but a provider call still running at
    /// `deadline` is abandoned and recorded as cancelled.
    #[instrument(skip(self, context, tools, deadline), fields(resources = context.resources.len(), tools = tools.len()))]
    pub async fn analyze_until(
        &self,
        context: &FailureContext,
        tools: &[ToolDescriptor],
        deadline: Option<Instant>,
    ) -> AnalysisResult<Analysis> {
        let prompt = prompt::build(context, tools);
        if let Some(previous) = &context.previous_attempt {
            info!(
                previous_attempt = previous.attempt_number,
                previous_tools = ?previous.tools_used,
                "Requesting alternative plan"
            );
        }

        match self.call(prompt.clone(), tools, deadline).await {
            Err(e) if e.is_malformed() && self.config.reask_on_malformed => {
                warn!(interaction_id = %e.interaction_id(), "Re-asking after unparsable reply");
                self.call(format!("{}{}", prompt, prompt::REASK_SUFFIX), tools, deadline)
                    .await
            }
            other => other,
        }
    }

    /// Up to `limit` interactions, newest first.
    pub fn history(&self, limit: usize) -> Vec<LlmInteraction> {
        self.history.recent(limit)
    }

    pub fn interaction(&self, id: &InteractionId) -> Option<LlmInteraction> {
        self.history.get(id)
    }

    async fn call(
        &self,
        prompt: String,
        tools: &[ToolDescriptor],
        deadline: Option<Instant>,
    ) -> AnalysisResult<Analysis> {
        let request = CompletionRequest::new(prompt).with_system_prompt(prompt::SYSTEM_PROMPT);
        let id = InteractionId::generate();
        let started = Instant::now();

        let limit = Instant::now() + self.config.timeout;
        let (until, cancellable) = match deadline {
            Some(at) if at < limit => (at, true),
            _ => (limit, false),
        };
        let reply = tokio::time::timeout_at(until, self.provider.complete(&request)).await;
        let duration_ms = started.elapsed().as_millis().min(u64::MAX as u128) as u64;

        let mut interaction = LlmInteraction {
            id: id.clone(),
            timestamp: Utc::now(),
            provider: self.provider.name().to_string(),
            model: self.provider.model().to_string(),
            prompt: request.prompt,
            response: String::new(),
            fix_plan: None,
            dropped_steps: Vec::new(),
            error: None,
            usage: TokenUsage::default(),
            duration_ms,
        };

        let completion = match reply {
            Ok(Ok(completion)) => completion,
            Ok(Err(source)) => {
                warn!(interaction_id = %id, error = %source, "Analysis provider failed");
                interaction.error = Some(source.to_string());
                self.history.record(interaction);
                return Err(AnalysisError::Provider {
                    interaction_id: id,
                    source,
                });
            }
            Err(_) if cancellable => {
                warn!(interaction_id = %id, "Analysis cancelled at deadline");
                interaction.error = Some("cancelled: deadline expired".to_string());
                self.history.record(interaction);
                return Err(AnalysisError::Cancelled { interaction_id: id });
            }
            Err(_) => {
                let timeout_secs = self.config.timeout.as_secs();
                warn!(interaction_id = %id, timeout_secs, "Analysis provider timed out");
                interaction.error = Some(format!("timed out after {}s", timeout_secs));
                self.history.record(interaction);
                return Err(AnalysisError::Timeout {
                    interaction_id: id,
                    timeout_secs,
                });
            }
        };

        interaction.response = completion.text.clone();
        interaction.usage = completion.usage;
        debug!(interaction_id = %id, chars = completion.text.len(), "Analysis reply received");

        match parse_reply(&completion.text, tools) {
            ParseResult::Valid { plan, dropped } => {
                info!(
                    interaction_id = %id,
                    steps = plan.steps.len(),
                    dropped = dropped.len(),
                    duration_ms,
                    "Analysis completed"
                );
                interaction.fix_plan = Some(plan.clone());
                interaction.dropped_steps = dropped.clone();
                self.history.record(interaction);
                Ok(Analysis {
                    plan,
                    interaction_id: id,
                    dropped,
                })
            }
            ParseResult::Malformed(_) => {
                warn!(interaction_id = %id, "Analysis reply could not be parsed");
                interaction.error = Some("reply did not contain a fix plan".to_string());
                self.history.record(interaction);
                Err(AnalysisError::Malformed {
                    interaction_id: id,
                    reason: "reply did not contain a fix plan".to_string(),
                })
            }
        }
    }
}
