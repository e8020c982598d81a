//! fab-chat: the orchestration layer of the fabric agent
//!
//! Turns a natural-language request into a bounded sequence of tool calls
//! (retrieval, controller reads/writes, sandboxed code) and a final answer.
//!
//! - [`OrchestrationLoop`]: the `step(state, observation) -> Action` decision procedure
//! - [`ChatService`]: runs turns against [`SessionManager`] threads
//! - [`MessageCatalog`]: user-facing templates per language

pub mod error;
pub mod formatting;
pub mod intent;
pub mod messages;
pub mod orchestrator;
pub mod parsing;
pub mod service;
pub mod session;

pub use error::ChatError;
pub use intent::Intent;
pub use messages::{Language, MessageCatalog};
pub use orchestrator::{Action, LoopConfig, Observation, OrchestrationLoop, TurnState};
pub use parsing::{EndpointCandidate, StructuredSuggestion, Suggestion};
pub use service::ChatService;
pub use session::{
    InvocationStatus, Session, SessionInfo, SessionManager, ToolInvocation, Turn, TurnOutcome,
};
