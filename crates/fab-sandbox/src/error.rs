//! Sandbox error types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a snippet did not produce output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxErrorKind {
    /// Wall-clock limit reached; the process was killed
    Timeout,
    /// Memory or output ceiling breached
    Memory,
    /// The snippet raised, or the interpreter exited non-zero
    Exception,
    /// Rejected by the capability policy before execution
    Denied,
}

impl SandboxErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxErrorKind::Timeout => "timeout",
            SandboxErrorKind::Memory => "memory",
            SandboxErrorKind::Exception => "exception",
            SandboxErrorKind::Denied => "denied",
        }
    }
}

impl fmt::Display for SandboxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Sandbox {kind}: {message}")]
pub struct SandboxError {
    pub kind: SandboxErrorKind,
    pub message: String,
}

impl SandboxError {
    pub fn new(kind: SandboxErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::new(SandboxErrorKind::Denied, message)
    }

    pub fn timeout(secs: u64) -> Self {
        Self::new(
            SandboxErrorKind::Timeout,
            format!("execution exceeded {} seconds", secs),
        )
    }

    pub fn memory(message: impl Into<String>) -> Self {
        Self::new(SandboxErrorKind::Memory, message)
    }

    pub fn exception(message: impl Into<String>) -> Self {
        Self::new(SandboxErrorKind::Exception, message)
    }
}
