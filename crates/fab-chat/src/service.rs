//! Session-aware front door to the orchestration loop

use std::sync::Arc;
use tracing::info;

use crate::error::{ChatError, Result};
use crate::orchestrator::OrchestrationLoop;
use crate::session::{SessionManager, Turn};

/// Runs turns against named conversation threads
#[derive(Clone)]
pub struct ChatService {
    orchestrator: Arc<OrchestrationLoop>,
    sessions: SessionManager,
}

impl ChatService {
    pub fn new(orchestrator: Arc<OrchestrationLoop>, sessions: SessionManager) -> Self {
        Self {
            orchestrator,
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Run one message on a thread and commit the resulting turn
    ///
    /// Turns on the same thread must not overlap; the loop reads a snapshot
    /// of the history and the turn is appended when it finishes.
    pub async fn handle(&self, thread_id: &str, message: &str) -> Result<Turn> {
        if thread_id.trim().is_empty() {
            return Err(ChatError::EmptyThreadId);
        }
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let session = self.sessions.get_or_create(thread_id).await;
        let turn = self.orchestrator.run_turn(&session, message).await;
        if self.sessions.commit(thread_id, turn.clone()).await {
            info!(
                "Committed turn {} on thread {} ({:?})",
                session.turns().len() + 1,
                thread_id,
                turn.outcome
            );
        }
        Ok(turn)
    }

    /// Forget a thread
    pub async fn discard(&self, thread_id: &str) -> bool {
        self.sessions.discard(thread_id).await
    }
}
