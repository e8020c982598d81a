//! fab-tools: the capabilities the orchestration loop can invoke
//!
//! - [`Tool`] / [`ToolRegistry`]: the single capability trait and its registry
//! - [`ToolError`]: failure taxonomy with retry classification
//! - [`AnswerSynthesizer`]: retrieval + grounded completion
//! - [`EndpointCatalog`]: deterministic named-endpoint lookup
//! - [`builtin`]: the fixed tool set

pub mod builtin;
pub mod catalog;
pub mod error;
pub mod registry;
pub mod synthesizer;
pub mod tool;

pub use builtin::{register_builtin_tools, BuiltinDeps};
pub use catalog::{EndpointCatalog, EndpointEntry, EndpointMatch};
pub use error::ToolError;
pub use registry::{RegistryStats, ToolDefinition, ToolRegistry, ToolUsage};
pub use synthesizer::{AnswerSynthesizer, Synthesis, SynthesisMode};
pub use tool::{BoxedTool, SecurityLevel, SimpleTool, Tool};
