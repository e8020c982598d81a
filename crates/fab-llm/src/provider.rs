//! LLM Provider Traits and Types
//!
//! The completion service is a black box: a rendered prompt goes in, free
//! text comes out. Every provider speaks the same trait so the synthesizer
//! and the orchestration loop never know which backend answered.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderType {
    OpenAI,
    DashScope,
    DeepSeek,
    Fireworks,
}

impl ProviderType {
    /// Default base URL of the provider's OpenAI-compatible API
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "https://api.openai.com/v1",
            ProviderType::DashScope => "https://dashscope-intl.aliyuncs.com/compatible-mode/v1",
            ProviderType::DeepSeek => "https://api.deepseek.com/v1",
            ProviderType::Fireworks => "https://api.fireworks.ai/inference/v1",
        }
    }

    /// Environment variable consulted when no key is configured
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "OPENAI_API_KEY",
            ProviderType::DashScope => "DASHSCOPE_API_KEY",
            ProviderType::DeepSeek => "DEEPSEEK_API_KEY",
            ProviderType::Fireworks => "FIREWORKS_API_KEY",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::OpenAI => write!(f, "openai"),
            ProviderType::DashScope => write!(f, "dashscope"),
            ProviderType::DeepSeek => write!(f, "deepseek"),
            ProviderType::Fireworks => write!(f, "fireworks"),
        }
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "open_ai" => Ok(ProviderType::OpenAI),
            "dashscope" | "qwen" => Ok(ProviderType::DashScope),
            "deepseek" => Ok(ProviderType::DeepSeek),
            "fireworks" | "fireworks_ai" => Ok(ProviderType::Fireworks),
            other => Err(format!("Unknown provider type: {}", other)),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Chat request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Single user prompt, the shape every template renders to
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::user(prompt)])
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }
}

/// Token usage information
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub model: String,
    pub provider: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Shared provider for injection into tools
pub type BoxedProvider = Arc<dyn LlmProvider>;

/// LLM Provider trait
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get provider type
    fn provider_type(&self) -> ProviderType;

    /// Model used for completions
    fn model(&self) -> &str;

    /// Chat with a full request
    async fn chat_with_request(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Rendered prompt in, free text out
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self.chat_with_request(ChatRequest::prompt(prompt)).await?;
        Ok(response.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl LlmProvider for Echo {
        fn provider_type(&self) -> ProviderType {
            ProviderType::OpenAI
        }

        fn model(&self) -> &str {
            "echo"
        }

        async fn chat_with_request(&self, request: ChatRequest) -> Result<ChatResponse> {
            let last = request.messages.last().cloned().unwrap_or_else(|| ChatMessage::user(""));
            Ok(ChatResponse {
                message: ChatMessage::assistant(format!("echo: {}", last.content)),
                model: "echo".to_string(),
                provider: self.provider_type().to_string(),
                finish_reason: Some("stop".to_string()),
                usage: None,
            })
        }
    }

    #[test]
    fn test_provider_type_round_trip() {
        for p in [
            ProviderType::OpenAI,
            ProviderType::DashScope,
            ProviderType::DeepSeek,
            ProviderType::Fireworks,
        ] {
            assert_eq!(p.to_string().parse::<ProviderType>().unwrap(), p);
        }
        assert_eq!("qwen".parse::<ProviderType>().unwrap(), ProviderType::DashScope);
        assert!("claude".parse::<ProviderType>().is_err());
    }

    #[tokio::test]
    async fn test_complete_uses_last_message() {
        assert_eq!(Echo.complete("hello").await.unwrap(), "echo: hello");
    }
}
