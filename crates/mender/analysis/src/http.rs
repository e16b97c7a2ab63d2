//! HTTP providers for the hosted and local model APIs.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use mender_types::TokenUsage;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::provider::{Completion, CompletionRequest, LlmProvider};

const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Supported provider APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    #[serde(alias = "open_ai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
        }
    }

    /// Whether requests must carry an API key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings for an HTTP provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            endpoint: None,
            api_key: None,
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

/// Provider speaking one of the supported HTTP APIs.
pub struct HttpLlmProvider {
    config: ProviderConfig,
    client: Client,
}

impl HttpLlmProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.kind.requires_api_key() && config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ProviderError::NotConfigured(format!(
                "{} provider requires an api key",
                config.kind
            )));
        }
        let client = build_http_client(config.timeout)?;
        Ok(Self { config, client })
    }

    pub fn kind(&self) -> ProviderKind {
        self.config.kind
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured(format!("{} provider requires api_key", self.config.kind)))
    }

    async fn complete_ollama(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let endpoint = self
            .config
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_OLLAMA_ENDPOINT);
        let url = format!("{}/api/generate", endpoint.trim_end_matches('/'));

        let mut payload = json!({
            "model": self.config.model,
            "prompt": compose_prompt(request),
            "stream": false,
        });

        let mut options = serde_json::Map::new();
        if let Some(temp) = self.config.temperature {
            options.insert("temperature".to_string(), json!(temp));
        }
        if let Some(max_tokens) = self.config.max_tokens {
            options.insert("num_predict".to_string(), json!(max_tokens));
        }
        if !options.is_empty() {
            payload["options"] = Value::Object(options);
        }

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("ollama request failed: {}", e)))?;
        let response = check_status(response).await?;

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("ollama: {}", e)))?;

        Ok(Completion {
            text: body.response.trim().to_string(),
            finish_reason: Some("stop".to_string()),
            usage: TokenUsage {
                input_tokens: to_u32(body.prompt_eval_count),
                output_tokens: to_u32(body.eval_count),
                total_tokens: add_tokens(body.prompt_eval_count, body.eval_count),
            },
        })
    }

    async fn complete_openai(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let api_key = self.api_key()?;
        let url = resolve_chat_endpoint(self.config.endpoint.as_deref(), DEFAULT_OPENAI_ENDPOINT);

        let mut messages = Vec::new();
        if let Some(system_prompt) = non_blank(request.system_prompt.as_deref()) {
            messages.push(json!({
                "role": "system",
                "content": system_prompt,
            }));
        }
        messages.push(json!({
            "role": "user",
            "content": request.prompt,
        }));

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
        });
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("openai request failed: {}", e)))?;
        let response = check_status(response).await?;

        let body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("openai: {}", e)))?;

        let choice = body
            .choices
            .first()
            .ok_or_else(|| ProviderError::InvalidResponse("openai response did not include choices".to_string()))?;

        let usage = body
            .usage
            .map(|usage| TokenUsage {
                input_tokens: to_u32(usage.prompt_tokens),
                output_tokens: to_u32(usage.completion_tokens),
                total_tokens: to_u32(usage.total_tokens),
            })
            .unwrap_or_default();

        Ok(Completion {
            text: extract_text(&choice.message.content),
            usage,
            finish_reason: choice.finish_reason.clone(),
        })
    }

    async fn complete_anthropic(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let api_key = self.api_key()?;
        let url = resolve_messages_endpoint(self.config.endpoint.as_deref(), DEFAULT_ANTHROPIC_ENDPOINT);

        let mut payload = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [
                {
                    "role": "user",
                    "content": request.prompt,
                }
            ],
        });
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(system_prompt) = non_blank(request.system_prompt.as_deref()) {
            payload["system"] = json!(system_prompt);
        }

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("anthropic request failed: {}", e)))?;
        let response = check_status(response).await?;

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("anthropic: {}", e)))?;

        let text = body
            .content
            .iter()
            .filter(|part| part.content_type == "text")
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        let usage = body
            .usage
            .map(|usage| TokenUsage {
                input_tokens: to_u32(usage.input_tokens),
                output_tokens: to_u32(usage.output_tokens),
                total_tokens: add_tokens(usage.input_tokens, usage.output_tokens),
            })
            .unwrap_or_default();

        Ok(Completion {
            text: text.trim().to_string(),
            usage,
            finish_reason: body.stop_reason,
        })
    }

    async fn complete_gemini(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let api_key = self.api_key()?;
        let url = resolve_gemini_endpoint(self.config.endpoint.as_deref(), &self.config.model, api_key)?;

        let mut payload = json!({
            "contents": [
                {
                    "parts": [
                        {
                            "text": request.prompt
                        }
                    ]
                }
            ]
        });

        if let Some(system_prompt) = non_blank(request.system_prompt.as_deref()) {
            payload["systemInstruction"] = json!({
                "parts": [
                    {
                        "text": system_prompt
                    }
                ]
            });
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(temp) = self.config.temperature {
            generation_config.insert("temperature".to_string(), json!(temp));
        }
        if let Some(max_tokens) = self.config.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if !generation_config.is_empty() {
            payload["generationConfig"] = Value::Object(generation_config);
        }

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("gemini request failed: {}", e)))?;
        let response = check_status(response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("gemini: {}", e)))?;

        let candidate = body["candidates"].as_array().and_then(|c| c.first());

        let text = candidate
            .and_then(|candidate| candidate["content"]["parts"].as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        let finish_reason = candidate
            .and_then(|candidate| candidate["finishReason"].as_str())
            .map(str::to_string);

        let usage = body["usageMetadata"]
            .as_object()
            .map(|usage| TokenUsage {
                input_tokens: to_u32(usage.get("promptTokenCount").and_then(Value::as_u64)),
                output_tokens: to_u32(usage.get("candidatesTokenCount").and_then(Value::as_u64)),
                total_tokens: to_u32(usage.get("totalTokenCount").and_then(Value::as_u64)),
            })
            .unwrap_or_default();

        Ok(Completion {
            text: text.trim().to_string(),
            usage,
            finish_reason,
        })
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    fn name(&self) -> &str {
        self.config.kind.as_str()
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        match self.config.kind {
            ProviderKind::Ollama => self.complete_ollama(request).await,
            ProviderKind::OpenAi => self.complete_openai(request).await,
            ProviderKind::Anthropic => self.complete_anthropic(request).await,
            ProviderKind::Gemini => self.complete_gemini(request).await,
        }
    }
}

fn build_http_client(timeout: Duration) -> Result<Client, ProviderError> {
    let mut builder = Client::builder().timeout(timeout);
    let allow_system_proxy = std::env::var("MENDER_USE_SYSTEM_PROXY")
        .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);

    if !allow_system_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("failed to build HTTP client: {}", e)))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status,
        body: truncate(&body, 320),
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn compose_prompt(request: &CompletionRequest) -> String {
    match non_blank(request.system_prompt.as_deref()) {
        Some(system_prompt) => format!(
            "System:\n{}\n\nUser:\n{}",
            system_prompt.trim(),
            request.prompt.trim()
        ),
        None => request.prompt.trim().to_string(),
    }
}

fn resolve_chat_endpoint(endpoint: Option<&str>, default_endpoint: &str) -> String {
    let endpoint = endpoint.unwrap_or(default_endpoint);
    if endpoint.contains("/chat/completions") {
        endpoint.to_string()
    } else {
        format!("{}/chat/completions", endpoint.trim_end_matches('/'))
    }
}

fn resolve_messages_endpoint(endpoint: Option<&str>, default_endpoint: &str) -> String {
    let endpoint = endpoint.unwrap_or(default_endpoint);
    if endpoint.ends_with("/messages") {
        endpoint.to_string()
    } else {
        format!("{}/messages", endpoint.trim_end_matches('/'))
    }
}

fn resolve_gemini_endpoint(endpoint: Option<&str>, model: &str, api_key: &str) -> Result<Url, ProviderError> {
    let endpoint = endpoint.unwrap_or(DEFAULT_GEMINI_ENDPOINT);
    let raw = if endpoint.contains(":generateContent") {
        endpoint.to_string()
    } else {
        format!(
            "{}/v1beta/models/{}:generateContent",
            endpoint.trim_end_matches('/'),
            model
        )
    };
    let mut url = Url::parse(&raw)
        .map_err(|e| ProviderError::NotConfigured(format!("invalid gemini endpoint {}: {}", raw, e)))?;

    if !url.query_pairs().any(|(k, _)| k == "key") {
        url.query_pairs_mut().append_pair("key", api_key);
    }

    Ok(url)
}

fn extract_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn to_u32(value: Option<u64>) -> Option<u32> {
    value.and_then(|v| v.try_into().ok())
}

fn add_tokens(left: Option<u64>, right: Option<u64>) -> Option<u32> {
    match (left, right) {
        (Some(l), Some(r)) => l.checked_add(r).and_then(|v| v.try_into().ok()),
        (Some(value), None) | (None, Some(value)) => value.try_into().ok(),
        (None, None) => None,
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    let mut chars = value.chars();
    let truncated: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosted_providers_require_api_key() {
        let config = ProviderConfig::new(ProviderKind::Gemini, "gemini-2.5-flash");
        assert!(matches!(
            HttpLlmProvider::new(config),
            Err(ProviderError::NotConfigured(_))
        ));

        let local = ProviderConfig::new(ProviderKind::Ollama, "llama3");
        assert!(HttpLlmProvider::new(local).is_ok());
    }

    #[test]
    fn test_gemini_endpoint_appends_model_and_key() {
        let url = resolve_gemini_endpoint(None, "gemini-2.5-flash", "k").unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent?key=k"
        );
    }

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            resolve_chat_endpoint(Some("http://localhost:8080/v1/"), DEFAULT_OPENAI_ENDPOINT),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(
            resolve_messages_endpoint(None, DEFAULT_ANTHROPIC_ENDPOINT),
            DEFAULT_ANTHROPIC_ENDPOINT
        );
    }

    #[test]
    fn test_provider_kind_names() {
        let kind: ProviderKind = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(kind, ProviderKind::OpenAi);
        assert_eq!(kind.to_string(), "openai");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(add_tokens(Some(2), Some(3)), Some(5));
    }
}
