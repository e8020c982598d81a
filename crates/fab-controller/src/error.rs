//! Controller transport errors
//!
//! Every failed controller call is classified into one of these variants
//! before it leaves the session. Nothing here is retried.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    // ========================================================================
    // Authentication
    // ========================================================================
    #[error("Authentication failed: {0}")]
    Auth(String),

    // ========================================================================
    // HTTP status classes
    // ========================================================================
    #[error("Controller rejected the request with HTTP {status}: {body}")]
    Client { status: u16, body: String },

    #[error("Controller failed with HTTP {status}")]
    Server { status: u16, body: String },

    // ========================================================================
    // Transport / payload
    // ========================================================================
    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed controller response: {0}")]
    Parse(String),

    #[error("Invalid resource path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Client setup failed: {0}")]
    Setup(String),
}

impl ControllerError {
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ControllerError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ControllerError::Client { status, .. } | ControllerError::Server { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ControllerError::Auth(_))
    }
}

/// Map a non-auth HTTP failure status to the matching error class
pub(crate) fn classify_status(status: u16, body: String) -> ControllerError {
    if (500..600).contains(&status) {
        ControllerError::Server { status, body }
    } else {
        ControllerError::Client { status, body }
    }
}
