//! fab-sandbox: isolated execution of data-transformation snippets
//!
//! Snippets are screened by [`policy::screen`] and then run in a separate
//! interpreter process under [`SandboxLimits`]. The fetched payload is bound
//! as `data`; whatever the snippet prints is the result.

pub mod error;
pub mod policy;
pub mod sandbox;

pub use error::{SandboxError, SandboxErrorKind};
pub use policy::APPROVED_MODULES;
pub use sandbox::{CodeSandbox, SandboxLimits};
