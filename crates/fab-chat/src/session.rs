//! Conversation sessions
//!
//! A [`Session`] is an append-only list of committed [`Turn`]s. Each turn
//! owns the [`ToolInvocation`]s it issued. The [`SessionManager`] maps thread
//! identifiers to sessions and evicts the least recently updated one when full.

use chrono::{DateTime, Utc};
use fab_tools::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_MAX_SESSIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Pending,
    Succeeded,
    Failed,
}

/// One tool call issued during a turn
///
/// `output` is only ever set together with `Succeeded`, `error` only with
/// `Failed`; the fields are private so that pairing cannot be broken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    tool: String,
    input: Value,
    status: InvocationStatus,
    output: Option<Value>,
    error: Option<ToolError>,
}

impl ToolInvocation {
    pub fn pending(tool: impl Into<String>, input: Value) -> Self {
        Self {
            tool: tool.into(),
            input,
            status: InvocationStatus::Pending,
            output: None,
            error: None,
        }
    }

    pub fn succeed(&mut self, output: Value) {
        self.status = InvocationStatus::Succeeded;
        self.output = Some(output);
        self.error = None;
    }

    pub fn fail(&mut self, error: ToolError) {
        self.status = InvocationStatus::Failed;
        self.output = None;
        self.error = Some(error);
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn status(&self) -> InvocationStatus {
        self.status
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn error(&self) -> Option<&ToolError> {
        self.error.as_ref()
    }

    /// Short human summary, used when a turn has to explain what it tried
    pub fn summary(&self) -> String {
        let target = ["path", "query", "name"]
            .iter()
            .find_map(|k| self.input.get(*k).and_then(Value::as_str))
            .map(|s| format!(" {}", first_line(s)))
            .unwrap_or_default();
        match (&self.status, &self.error) {
            (InvocationStatus::Failed, Some(e)) => format!("{}{}: {}", self.tool, target, e),
            (InvocationStatus::Succeeded, _) => format!("{}{}: ok", self.tool, target),
            _ => format!("{}{}: pending", self.tool, target),
        }
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or(s)
}

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Answered,
    Clarification,
    Degraded,
    Failed,
}

/// One user message, the tool calls it caused and the final response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub user_message: String,
    pub invocations: Vec<ToolInvocation>,
    pub response: String,
    pub outcome: TurnOutcome,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn tool_calls(&self, tool: &str) -> usize {
        self.invocations.iter().filter(|i| i.tool() == tool).count()
    }
}

/// A conversation thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `n` turns, oldest first
    pub fn last_turns(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Append a finished turn
    pub fn commit(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.updated_at = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Basic session info for listing
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub turn_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Thread id -> session map with a size bound
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_max_sessions(DEFAULT_MAX_SESSIONS)
    }

    pub fn with_max_sessions(max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Snapshot of a session, creating it on first use
    pub async fn get_or_create(&self, id: &str) -> Session {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(id) {
                return session.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(id) {
            return session.clone();
        }
        Self::evict_if_full(&mut sessions, self.max_sessions);
        let session = Session::with_id(id);
        sessions.insert(id.to_string(), session.clone());
        session
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Append a turn to a live thread
    ///
    /// A thread discarded while its turn was running stays discarded; the
    /// turn is dropped and `false` returned.
    pub async fn commit(&self, id: &str, turn: Turn) -> bool {
        match self.sessions.write().await.get_mut(id) {
            Some(session) => {
                session.commit(turn);
                true
            }
            None => {
                debug!("Thread {} was discarded mid-turn; dropping its turn", id);
                false
            }
        }
    }

    /// Discard a thread; its history is gone
    pub async fn discard(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<_> = sessions
            .values()
            .map(|s| SessionInfo {
                id: s.id.clone(),
                turn_count: s.turns.len(),
                created_at: s.created_at,
                updated_at: s.updated_at,
            })
            .collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    fn evict_if_full(sessions: &mut HashMap<String, Session>, max_sessions: usize) {
        if sessions.len() < max_sessions {
            return;
        }
        if let Some(oldest_id) = sessions
            .values()
            .min_by_key(|s| s.updated_at)
            .map(|s| s.id.clone())
        {
            sessions.remove(&oldest_id);
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
