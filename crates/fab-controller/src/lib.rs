//! fab-controller: authenticated REST access to the fabric controller
//!
//! - [`ResourcePath`]: the strict resource path grammar
//! - [`ControllerSession`]: lazy login, token invalidation, typed failures
//! - [`ControllerError`]: auth / client / server / network classification

pub mod error;
pub mod path;
pub mod session;

pub use error::ControllerError;
pub use path::{ResourcePath, ResourceScope};
pub use session::{ControllerSession, SessionState};
