//! Environment and Configuration Loader
//!
//! Configuration is layered:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, or `FABRIC_AGENT_CONFIG`)
//! 3. Environment variables (optionally loaded from a `.env` file first)
//! 4. The local credential store, for controller credentials still unset
//!
//! ```toml
//! [controller]
//! base_url = "https://192.168.1.250"
//! username = "admin"
//! accept_invalid_certs = true
//!
//! [llm]
//! provider = "dashscope"
//! model = "qwen-plus"
//!
//! [agent]
//! language = "en"
//! max_tool_calls_per_turn = 10
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::credentials::StoredCredentials;
use crate::error::{Error, Result};

/// Alternative env files to check (in order of priority)
pub const ENV_FILE_PATHS: &[&str] = &["/etc/fabric-agent/environment", ".env"];

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "FABRIC_AGENT_CONFIG";

/// Load environment variables from the first env file found.
///
/// Existing environment variables are never overridden.
/// Returns the path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("FABRIC_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

fn try_load_env_file(path: &str) -> Option<String> {
    let path_obj = Path::new(path);
    if !path_obj.exists() {
        return None;
    }

    match dotenvy::from_path(path_obj) {
        Ok(()) => {
            info!("Loaded environment from {}", path);
            Some(path.to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            None
        }
    }
}

/// Get an optional configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get a boolean configuration value.
pub fn get_config_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default)
}

/// Mask a secret for logging (`******`).
pub fn mask_secret(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "******"
    }
}

/// Fabric controller connection settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Base address, e.g. `https://192.168.1.250`
    pub base_url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Accept self-signed certificates. This disables TLS verification.
    pub accept_invalid_certs: bool,
    pub timeout_secs: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            accept_invalid_certs: false,
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for ControllerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerSettings")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &mask_secret(&self.password))
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Completion service settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Provider preset: openai, dashscope, deepseek, fireworks
    pub provider: String,
    /// Overrides the preset's base URL
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "dashscope".to_string(),
            base_url: None,
            api_key: None,
            model: "qwen-plus".to_string(),
            temperature: Some(0.0),
            timeout_secs: 120,
        }
    }
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_deref().map(mask_secret))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Similarity-search service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Search endpoint; the service owns the index
    pub url: Option<String>,
    pub collection: Option<String>,
    pub top_k: usize,
    pub timeout_secs: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            url: None,
            collection: Some("REST_API_CONFIG_GUIDE".to_string()),
            top_k: 5,
            timeout_secs: 30,
        }
    }
}

/// Code sandbox limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub interpreter: String,
    pub timeout_secs: u64,
    pub memory_mb: u64,
    pub max_output_bytes: usize,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout_secs: 15,
            memory_mb: 128,
            max_output_bytes: 64 * 1024,
        }
    }
}

/// Orchestration loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_tool_calls_per_turn: usize,
    pub max_retrieval_attempts: usize,
    pub max_transient_retries: usize,
    /// Language of user-facing escalation messages (`en`, `vi`)
    pub language: String,
    /// `free_text` or `structured`
    pub synthesizer_mode: String,
    /// JSON file of `[{"Name": ..., "URL": ...}]` entries
    pub endpoint_catalog: Option<PathBuf>,
    pub similarity_threshold: f64,
    pub max_sessions: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tool_calls_per_turn: 10,
            max_retrieval_attempts: 3,
            max_transient_retries: 2,
            language: "en".to_string(),
            synthesizer_mode: "free_text".to_string(),
            endpoint_catalog: None,
            similarity_threshold: 0.6,
            max_sessions: 100,
        }
    }
}

/// Complete agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub controller: ControllerSettings,
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub sandbox: SandboxSettings,
    pub agent: AgentSettings,
}

impl AgentConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config from {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve the layered configuration.
    ///
    /// `explicit` wins over `FABRIC_AGENT_CONFIG`; with neither, defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| get_config_opt(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = get_config_opt("APIC_BASE_URL") {
            self.controller.base_url = v;
        }
        if let Some(v) = get_config_opt("APIC_USERNAME") {
            self.controller.username = v;
        }
        if let Some(v) = get_config_opt("APIC_PASSWORD") {
            self.controller.password = v;
        }
        self.controller.accept_invalid_certs =
            get_config_bool("APIC_ACCEPT_INVALID_CERTS", self.controller.accept_invalid_certs);

        if let Some(v) = get_config_opt("LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Some(v) = get_config_opt("LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = get_config_opt("LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get_config_opt("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get_config_opt("RETRIEVAL_URL") {
            self.retrieval.url = Some(v);
        }
        if let Some(v) = get_config_opt("FABRIC_AGENT_LANGUAGE") {
            self.agent.language = v;
        }
    }

    /// Fill controller credentials that are still unset from the credential store
    pub fn apply_stored_credentials(&mut self, stored: &StoredCredentials) {
        if self.controller.base_url.is_empty() {
            self.controller.base_url = stored.base_url.clone();
        }
        if self.controller.username.is_empty() {
            self.controller.username = stored.username.clone();
        }
        if self.controller.password.is_empty() {
            self.controller.password = stored.password.clone();
        }
    }

    /// Check that the controller can be reached with these settings
    pub fn validate_controller(&self) -> Result<()> {
        if self.controller.base_url.trim().is_empty() {
            return Err(Error::missing("controller.base_url (APIC_BASE_URL)"));
        }
        if !self.controller.base_url.starts_with("http://")
            && !self.controller.base_url.starts_with("https://")
        {
            return Err(Error::config(format!(
                "controller.base_url must start with http:// or https://, got {}",
                self.controller.base_url
            )));
        }
        if self.controller.username.is_empty() {
            return Err(Error::missing("controller.username (APIC_USERNAME)"));
        }
        if self.controller.password.is_empty() {
            return Err(Error::missing("controller.password (APIC_PASSWORD)"));
        }
        if self.controller.accept_invalid_certs {
            warn!(
                "TLS certificate verification is disabled for {}",
                self.controller.base_url
            );
        }
        Ok(())
    }
}
