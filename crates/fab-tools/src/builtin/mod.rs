//! Built-in Tools
//!
//! The fixed capability set exposed to the orchestration loop.
//!
//! ## Tools
//!
//! - **retrieve_and_synthesize**: grounded answer from the configuration guide
//! - **fetch_resource**: read objects from the controller
//! - **mutate_resource**: post configuration to the controller
//! - **run_code**: sandboxed transformation of fetched data
//! - **lookup_endpoint**: named-endpoint catalog (optional)

mod code;
mod controller;
mod lookup;
mod retrieval;

pub use code::{RunCodeTool, RUN_CODE};
pub use controller::{FetchResourceTool, MutateResourceTool, FETCH_RESOURCE, MUTATE_RESOURCE};
pub use lookup::{LookupEndpointTool, LOOKUP_ENDPOINT};
pub use retrieval::{RetrieveAndSynthesizeTool, RETRIEVE_AND_SYNTHESIZE};

use fab_controller::ControllerSession;
use fab_sandbox::CodeSandbox;
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::EndpointCatalog;
use crate::synthesizer::AnswerSynthesizer;
use crate::ToolRegistry;

/// Collaborators injected into the built-in tools
pub struct BuiltinDeps {
    pub session: Arc<ControllerSession>,
    pub synthesizer: Arc<AnswerSynthesizer>,
    pub sandbox: Arc<CodeSandbox>,
    pub catalog: Option<Arc<EndpointCatalog>>,
}

/// Register all built-in tools with the registry
pub async fn register_builtin_tools(registry: &ToolRegistry, deps: BuiltinDeps) {
    info!("Registering built-in tools");

    registry
        .register_tool(Arc::new(RetrieveAndSynthesizeTool::new(deps.synthesizer)))
        .await;
    registry
        .register_tool(Arc::new(FetchResourceTool::new(deps.session.clone())))
        .await;
    registry
        .register_tool(Arc::new(MutateResourceTool::new(deps.session)))
        .await;
    registry
        .register_tool(Arc::new(RunCodeTool::new(deps.sandbox)))
        .await;

    if let Some(catalog) = deps.catalog {
        registry
            .register_tool(Arc::new(LookupEndpointTool::new(catalog)))
            .await;
        debug!("Registered endpoint catalog lookup");
    }
}
