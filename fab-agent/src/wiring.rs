//! Builds the agent from configuration
//!
//! Every collaborator is constructed here and injected; nothing below this
//! module reaches for globals.

use anyhow::{Context, Result};
use fab_chat::{ChatService, LoopConfig, OrchestrationLoop, SessionManager};
use fab_controller::ControllerSession;
use fab_core::AgentConfig;
use fab_llm::{BoxedProvider, BoxedRetriever, HttpRetriever, OpenAiCompatibleClient};
use fab_sandbox::CodeSandbox;
use fab_tools::{
    register_builtin_tools, AnswerSynthesizer, BuiltinDeps, EndpointCatalog, SynthesisMode,
    ToolRegistry,
};
use std::sync::Arc;
use tracing::info;

pub struct Agent {
    pub service: ChatService,
    pub controller: Arc<ControllerSession>,
    pub registry: Arc<ToolRegistry>,
}

pub async fn build(config: &AgentConfig) -> Result<Agent> {
    config.validate_controller()?;

    let controller = Arc::new(
        ControllerSession::new(&config.controller).context("Failed to set up controller client")?,
    );

    let provider: BoxedProvider = Arc::new(OpenAiCompatibleClient::from_settings(&config.llm)?);
    let retriever: BoxedRetriever = Arc::new(HttpRetriever::from_settings(&config.retrieval)?);

    let mode: SynthesisMode = config
        .agent
        .synthesizer_mode
        .parse()
        .map_err(anyhow::Error::msg)?;
    let synthesizer = AnswerSynthesizer::new(retriever, provider.clone())
        .with_top_k(config.retrieval.top_k)
        .with_mode(mode);

    let threshold = config.agent.similarity_threshold;
    let catalog = match &config.agent.endpoint_catalog {
        Some(path) => EndpointCatalog::from_json_file(path, threshold)?,
        None => EndpointCatalog::builtin(threshold),
    };

    let registry = Arc::new(ToolRegistry::new());
    register_builtin_tools(
        &registry,
        BuiltinDeps {
            session: controller.clone(),
            synthesizer: Arc::new(synthesizer),
            sandbox: Arc::new(CodeSandbox::from_settings(&config.sandbox)),
            catalog: Some(Arc::new(catalog)),
        },
    )
    .await;
    info!(
        "Agent ready: controller {}, {} synthesis, {} tools",
        controller.base_url(),
        mode,
        registry.list_definitions().await.len()
    );

    let orchestrator = OrchestrationLoop::new(
        registry.clone(),
        provider,
        LoopConfig::from_settings(&config.agent),
    );
    let service = ChatService::new(
        Arc::new(orchestrator),
        SessionManager::with_max_sessions(config.agent.max_sessions),
    );

    Ok(Agent {
        service,
        controller,
        registry,
    })
}
