//! Analysis provider selection

use std::sync::Arc;

use async_trait::async_trait;
use mender_analysis::{Completion, CompletionRequest, HttpLlmProvider, LlmProvider, ProviderError};
use tracing::{info, warn};

use crate::config::LlmConfig;

/// Stand-in used when the configured provider cannot be built.
///
/// Every call fails with [`ProviderError::NotConfigured`], so triggers are
/// still recorded and end in an analysis error instead of the daemon refusing
/// to start.
pub struct UnconfiguredProvider {
    provider: String,
    model: String,
    reason: String,
}

impl UnconfiguredProvider {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, ProviderError> {
        Err(ProviderError::NotConfigured(self.reason.clone()))
    }
}

/// Build the configured provider, falling back to [`UnconfiguredProvider`].
pub fn build_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    match HttpLlmProvider::new(config.provider_config()) {
        Ok(provider) => {
            info!(provider = %config.provider, model = %config.model, "Analysis provider ready");
            Arc::new(provider)
        }
        Err(e) => {
            warn!(provider = %config.provider, error = %e, "Analysis provider not configured, fixes will fail at analysis");
            Arc::new(UnconfiguredProvider::new(
                config.provider.as_str(),
                config.model.as_str(),
                e.to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_api_key_falls_back() {
        let config = LlmConfig {
            api_key: None,
            ..Default::default()
        };
        let provider = build_provider(&config);
        assert_eq!(provider.name(), "gemini");

        let err = provider
            .complete(&CompletionRequest::new("diagnose"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
