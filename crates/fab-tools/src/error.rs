//! Tool failure taxonomy
//!
//! Every tool reports failures through [`ToolError`]. The orchestration loop
//! keys its retry decisions off [`ToolError::code`] and
//! [`ToolError::is_transient`]; tools themselves never retry.

use fab_controller::ControllerError;
use fab_sandbox::{SandboxError, SandboxErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ToolError {
    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("controller rejected the request (HTTP {status}): {body}")]
    Client { status: u16, body: String },

    #[error("controller error (HTTP {status})")]
    Server { status: u16 },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("sandbox {kind}: {message}")]
    Sandbox {
        kind: SandboxErrorKind,
        message: String,
    },

    #[error("could not parse output: {message}")]
    Parse { message: String },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("upstream service failed: {message}")]
    Upstream { message: String },

    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
}

impl ToolError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ToolError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        ToolError::Parse {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        ToolError::Upstream {
            message: message.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::Auth { .. } => "auth_error",
            ToolError::Client { .. } => "client_error",
            ToolError::Server { .. } => "server_error",
            ToolError::Network { .. } => "network_error",
            ToolError::Sandbox { .. } => "sandbox_error",
            ToolError::Parse { .. } => "parse_error",
            ToolError::InvalidInput { .. } => "invalid_input",
            ToolError::Upstream { .. } => "upstream_error",
            ToolError::UnknownTool { .. } => "unknown_tool",
        }
    }

    /// Whether repeating the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ToolError::Server { .. } | ToolError::Network { .. } | ToolError::Upstream { .. }
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ToolError::Auth { .. })
    }

    /// Client errors and rejected identifiers send the loop back to retrieval
    pub fn is_bad_identifier(&self) -> bool {
        matches!(self, ToolError::Client { .. } | ToolError::InvalidInput { .. })
    }
}

impl From<ControllerError> for ToolError {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::Auth(message) => ToolError::Auth { message },
            ControllerError::Client { status, body } => ToolError::Client { status, body },
            ControllerError::Server { status, .. } => ToolError::Server { status },
            ControllerError::Network(message) => ToolError::Network { message },
            ControllerError::Parse(message) => ToolError::Parse { message },
            ControllerError::InvalidPath { path, reason } => ToolError::InvalidInput {
                message: format!("'{}' {}", path, reason),
            },
            ControllerError::Setup(message) => ToolError::Network { message },
        }
    }
}

impl From<SandboxError> for ToolError {
    fn from(err: SandboxError) -> Self {
        ToolError::Sandbox {
            kind: err.kind,
            message: err.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_errors_map_to_taxonomy() {
        let e: ToolError = ControllerError::Server {
            status: 502,
            body: "bad gateway".into(),
        }
        .into();
        assert_eq!(e, ToolError::Server { status: 502 });
        assert!(e.is_transient());

        let e: ToolError = ControllerError::invalid_path("/api/x", "bad").into();
        assert_eq!(e.code(), "invalid_input");
        assert!(e.is_bad_identifier());
        assert!(!e.is_transient());

        let e: ToolError = ControllerError::Auth("expired".into()).into();
        assert!(e.is_auth());
        assert!(!e.is_transient());
    }

    #[test]
    fn test_sandbox_error_keeps_kind() {
        let e: ToolError = SandboxError::timeout(15).into();
        assert_eq!(e.code(), "sandbox_error");
        assert!(matches!(
            e,
            ToolError::Sandbox {
                kind: SandboxErrorKind::Timeout,
                ..
            }
        ));
    }

    #[test]
    fn test_serializes_with_error_tag() {
        let v = serde_json::to_value(ToolError::Client {
            status: 400,
            body: "unknown class".into(),
        })
        .unwrap();
        assert_eq!(v["error"], "client");
        assert_eq!(v["status"], 400);
    }
}
