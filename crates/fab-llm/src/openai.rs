//! OpenAI-compatible chat completions client
//!
//! ## API Endpoints
//!
//! | Provider | Base URL | Default model |
//! |----------|----------|---------------|
//! | OpenAI | `https://api.openai.com/v1` | `gpt-4o-mini` |
//! | DashScope | `https://dashscope-intl.aliyuncs.com/compatible-mode/v1` | `qwen-plus` |
//! | DeepSeek | `https://api.deepseek.com/v1` | `deepseek-chat` |
//! | Fireworks | `https://api.fireworks.ai/inference/v1` | `accounts/fireworks/models/deepseek-v3` |
//!
//! All of them accept `POST {base}/chat/completions`.
//!
//! ## Authentication
//! - Header: `Authorization: Bearer {key}`
//! - Key from settings (`LLM_API_KEY`) or the provider's own variable
//!   (`OPENAI_API_KEY`, `DASHSCOPE_API_KEY`, ...)

use anyhow::{Context, Result};
use async_trait::async_trait;
use fab_core::config::LlmSettings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::provider::{
    ChatMessage, ChatRequest, ChatResponse, LlmProvider, ProviderType, TokenUsage,
};

/// Endpoint paths relative to the provider base URL
pub mod endpoints {
    /// Chat completions endpoint
    /// Full URL: {base_url}/chat/completions
    pub const CHAT_COMPLETIONS: &str = "/chat/completions";
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    model: Option<String>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Default model per provider
pub fn default_model(provider: ProviderType) -> &'static str {
    match provider {
        ProviderType::OpenAI => "gpt-4o-mini",
        ProviderType::DashScope => "qwen-plus",
        ProviderType::DeepSeek => "deepseek-chat",
        ProviderType::Fireworks => "accounts/fireworks/models/deepseek-v3",
    }
}

/// Client for any OpenAI-compatible completion API
pub struct OpenAiCompatibleClient {
    client: Client,
    provider: ProviderType,
    api_key: String,
    api_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiCompatibleClient {
    /// Create a client on the provider's default endpoint
    pub fn new(provider: ProviderType, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            provider,
            api_key: api_key.into(),
            api_url: provider.default_base_url().to_string(),
            model: model.into(),
            temperature: None,
        }
    }

    /// Create with custom endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_url = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build from settings, falling back to the provider's key variable
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let provider: ProviderType = settings
            .provider
            .parse()
            .map_err(anyhow::Error::msg)
            .context("Invalid llm.provider")?;

        let api_key = match settings.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => key.to_string(),
            None => std::env::var(provider.api_key_env()).with_context(|| {
                format!(
                    "No API key configured for {} (set LLM_API_KEY or {})",
                    provider,
                    provider.api_key_env()
                )
            })?,
        };

        let model = if settings.model.is_empty() {
            default_model(provider).to_string()
        } else {
            settings.model.clone()
        };

        let mut client = Self::new(provider, api_key, model).with_temperature(settings.temperature);
        client.client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build completion HTTP client")?;
        if let Some(base_url) = settings.base_url.as_deref().filter(|u| !u.is_empty()) {
            client = client.with_endpoint(base_url);
        }

        info!("Completion provider: {} model={} endpoint={}", provider, client.model, client.api_url);
        Ok(client)
    }

    /// Get the current API URL
    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleClient {
    fn provider_type(&self) -> ProviderType {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat_with_request(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}{}", self.api_url, endpoints::CHAT_COMPLETIONS);

        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature.or(self.temperature),
        };

        debug!("{} request to: {}", self.provider, url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", self.provider))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("{} API error {}: {}", self.provider, status, body));
        }

        let result: CompletionResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.provider))?;

        let choice = result
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No response from {}", self.provider))?;

        let usage = result.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ChatResponse {
            message: ChatMessage::assistant(choice.message.content),
            model: result.model.unwrap_or_else(|| self.model.clone()),
            provider: self.provider.to_string(),
            finish_reason: choice.finish_reason,
            usage,
        })
    }
}
