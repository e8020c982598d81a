//! Core error, configuration and credential handling for fabric-agent
//!
//! # Modules
//!
//! - `config`: layered TOML/env configuration
//! - `credentials`: local controller credential store
//! - `error`: Error types and Result alias

pub mod config;
pub mod credentials;
pub mod error;

// Re-exports
pub use config::{
    AgentConfig, AgentSettings, ControllerSettings, LlmSettings, RetrievalSettings,
    SandboxSettings,
};
pub use credentials::{CredentialStore, StoredCredentials};
pub use error::{Error, Result};
