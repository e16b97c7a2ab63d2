//! LLM provider contract.

use async_trait::async_trait;
use mender_types::TokenUsage;

use crate::error::ProviderError;

/// Text sent to a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Text returned by a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// External reasoning provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name recorded on interactions.
    fn name(&self) -> &str;

    /// Model identifier recorded on interactions.
    fn model(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}
