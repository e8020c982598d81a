//! fab-llm: completion and retrieval service clients
//!
//! ## Supported Providers & Endpoints
//!
//! | Provider | Base URL | Auth Method |
//! |----------|----------|-------------|
//! | OpenAI | `https://api.openai.com/v1` | `Bearer {OPENAI_API_KEY}` |
//! | DashScope | `https://dashscope-intl.aliyuncs.com/compatible-mode/v1` | `Bearer {DASHSCOPE_API_KEY}` |
//! | DeepSeek | `https://api.deepseek.com/v1` | `Bearer {DEEPSEEK_API_KEY}` |
//! | Fireworks | `https://api.fireworks.ai/inference/v1` | `Bearer {FIREWORKS_API_KEY}` |
//!
//! ## Environment Variables
//!
//! ```bash
//! LLM_PROVIDER=dashscope       # openai | dashscope | deepseek | fireworks
//! LLM_API_KEY=sk-xxx           # overrides the provider-specific variable
//! LLM_BASE_URL=http://...      # custom OpenAI-compatible endpoint
//! RETRIEVAL_URL=http://...     # similarity-search service
//! ```

pub mod openai;
pub mod provider;
pub mod retrieval;

pub use openai::OpenAiCompatibleClient;
pub use provider::{
    BoxedProvider, ChatMessage, ChatRequest, ChatResponse, LlmProvider, ProviderType, TokenUsage,
};
pub use retrieval::{BoxedRetriever, Fragment, HttpRetriever, Retriever};
