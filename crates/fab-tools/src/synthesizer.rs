//! Answer synthesizer
//!
//! Retrieval, then one completion call over a grounded template. Two template
//! modes exist: `free_text` answers in at most three sentences; `structured`
//! asks for a JSON endpoint suggestion. Both forbid answering without support
//! in the retrieved context.

use fab_llm::{BoxedProvider, BoxedRetriever, Fragment};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::ToolError;

pub const DEFAULT_TOP_K: usize = 5;

const FREE_TEXT_TEMPLATE: &str = "\
You are an expert assistant for the Cisco APIC REST API. Answer the question \
using only the retrieved context below.
If the context does not contain the answer, reply exactly \"I don't know\". \
Must not answer if you don't know the answer.
Use three sentences maximum and keep the answer concise.

Question: {question}
Context: {context}

Answer:";

const STRUCTURED_TEMPLATE: &str = "\
You are an expert assistant for the Cisco APIC REST API. Using only the \
retrieved context below, suggest the REST endpoint that answers the request.
Must not invent endpoints that the context does not support; if unsure, set \
\"api_endpoint\" to null.
Reply with a single JSON object and nothing else, with exactly these keys:
  \"api_endpoint\": the path beginning with /api/ and ending in .json (query string allowed),
  \"technical_basis\": one sentence citing the context,
  \"complexity_estimate\": \"low\", \"medium\" or \"high\",
  \"security_note\": one sentence,
  \"alternative_endpoints\": a list of other plausible paths.

Request: {question}
Context: {context}

JSON:";

/// Prompt template variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    #[default]
    FreeText,
    Structured,
}

impl fmt::Display for SynthesisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisMode::FreeText => write!(f, "free_text"),
            SynthesisMode::Structured => write!(f, "structured"),
        }
    }
}

impl FromStr for SynthesisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free_text" | "free-text" | "text" => Ok(SynthesisMode::FreeText),
            "structured" | "json" => Ok(SynthesisMode::Structured),
            other => Err(format!("Unknown synthesizer mode: {}", other)),
        }
    }
}

/// Render a template with the question and concatenated fragments
pub fn render(mode: SynthesisMode, question: &str, fragments: &[Fragment]) -> String {
    let context = fragments
        .iter()
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let template = match mode {
        SynthesisMode::FreeText => FREE_TEXT_TEMPLATE,
        SynthesisMode::Structured => STRUCTURED_TEMPLATE,
    };
    template
        .replace("{question}", question)
        .replace("{context}", &context)
}

/// Output of one synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub text: String,
    pub fragment_count: usize,
    pub mode: SynthesisMode,
}

pub struct AnswerSynthesizer {
    retriever: BoxedRetriever,
    provider: BoxedProvider,
    top_k: usize,
    mode: SynthesisMode,
}

impl AnswerSynthesizer {
    pub fn new(retriever: BoxedRetriever, provider: BoxedProvider) -> Self {
        Self {
            retriever,
            provider,
            top_k: DEFAULT_TOP_K,
            mode: SynthesisMode::default(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_mode(mut self, mode: SynthesisMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> SynthesisMode {
        self.mode
    }

    pub async fn synthesize(&self, query: &str) -> Result<Synthesis, ToolError> {
        let fragments = self
            .retriever
            .search(query, self.top_k)
            .await
            .map_err(|e| ToolError::upstream(format!("retrieval failed: {:#}", e)))?;
        debug!("Retrieved {} fragments for '{}'", fragments.len(), query);

        let prompt = render(self.mode, query, &fragments);
        let text = self
            .provider
            .complete(&prompt)
            .await
            .map_err(|e| ToolError::upstream(format!("completion failed: {:#}", e)))?;

        info!("Synthesized {} answer from {} fragments", self.mode, fragments.len());
        Ok(Synthesis {
            text: text.trim().to_string(),
            fragment_count: fragments.len(),
            mode: self.mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fab_llm::{ChatMessage, ChatRequest, ChatResponse, LlmProvider, ProviderType, Retriever};
    use std::sync::{Arc, Mutex};

    struct FixedRetriever(Vec<&'static str>);

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn search(&self, _query: &str, k: usize) -> anyhow::Result<Vec<Fragment>> {
            Ok(self
                .0
                .iter()
                .take(k)
                .enumerate()
                .map(|(rank, t)| Fragment {
                    text: t.to_string(),
                    rank,
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingProvider {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        fn provider_type(&self) -> ProviderType {
            ProviderType::OpenAI
        }

        fn model(&self) -> &str {
            "test"
        }

        async fn chat_with_request(&self, request: ChatRequest) -> anyhow::Result<ChatResponse> {
            let prompt = request.messages[0].content.clone();
            self.prompts.lock().unwrap().push(prompt);
            Ok(ChatResponse {
                message: ChatMessage::assistant("  /api/class/fvTenant.json \n"),
                model: "test".into(),
                provider: "openai".into(),
                finish_reason: None,
                usage: None,
            })
        }
    }

    #[test]
    fn test_render_templates() {
        let fragments = vec![
            Fragment { text: "fvTenant is the tenant class".into(), rank: 0 },
            Fragment { text: "GET /api/class/fvTenant.json".into(), rank: 1 },
        ];
        let free = render(SynthesisMode::FreeText, "list tenants", &fragments);
        assert!(free.contains("Question: list tenants"));
        assert!(free.contains("fvTenant is the tenant class\n\nGET /api/class/fvTenant.json"));
        assert!(free.contains("three sentences maximum"));

        let structured = render(SynthesisMode::Structured, "list tenants", &fragments);
        assert!(structured.contains("\"alternative_endpoints\""));
        assert!(structured.contains("Request: list tenants"));
    }

    #[tokio::test]
    async fn test_synthesize_uses_top_k() {
        let provider = Arc::new(RecordingProvider::default());
        let synthesizer = AnswerSynthesizer::new(
            Arc::new(FixedRetriever(vec!["one", "two", "three"])),
            provider.clone(),
        )
        .with_top_k(2);

        let out = synthesizer.synthesize("tenants").await.unwrap();
        assert_eq!(out.text, "/api/class/fvTenant.json");
        assert_eq!(out.fragment_count, 2);

        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[0].contains("one\n\ntwo"));
        assert!(!prompts[0].contains("three"));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("structured".parse::<SynthesisMode>().unwrap(), SynthesisMode::Structured);
        assert_eq!("free_text".parse::<SynthesisMode>().unwrap(), SynthesisMode::FreeText);
        assert!("poem".parse::<SynthesisMode>().is_err());
    }
}
