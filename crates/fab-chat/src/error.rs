//! Errors surfaced to callers of the chat service
//!
//! Tool failures never show up here: the orchestration loop turns them into
//! a response. Only requests the loop cannot start are rejected.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("empty message")]
    EmptyMessage,

    #[error("thread id must not be empty")]
    EmptyThreadId,
}

pub type Result<T> = std::result::Result<T, ChatError>;
