//! Orchestration loop
//!
//! A think-act-observe cycle over the tool registry. [`OrchestrationLoop::step`]
//! is a pure decision function from the turn so far plus the latest
//! observation to the next [`Action`]; [`OrchestrationLoop::run_turn`] drives
//! it, executing one tool at a time until the turn responds or fails.
//!
//! Per turn:
//!
//! 1. Resolve a resource path: explicit path in the message, then the
//!    endpoint catalog (when registered), then retrieval + synthesis.
//! 2. Reject candidates that fail the resource grammar and re-query retrieval
//!    with the reasons, up to `max_retrieval_attempts`, then ask the user.
//! 3. Fetch (or mutate). Client errors re-enter step 2, server and network
//!    errors retry the same fetch up to `max_transient_retries`, an auth error
//!    is retried once, an empty result asks retrieval for a narrower path.
//! 4. Transformations run a completion-generated snippet in the sandbox with
//!    one corrected retry before falling back to the formatted raw data.
//! 5. Respond with the enumerated result and any alternative endpoints.
//!
//! Every turn is bounded by `max_tool_calls_per_turn`.

use fab_controller::ResourcePath;
use fab_core::AgentSettings;
use fab_llm::BoxedProvider;
use fab_sandbox::APPROVED_MODULES;
use fab_tools::builtin::{
    FETCH_RESOURCE, LOOKUP_ENDPOINT, MUTATE_RESOURCE, RETRIEVE_AND_SYNTHESIZE, RUN_CODE,
};
use fab_tools::{ToolError, ToolRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::formatting::{format_payload, is_empty_result};
use crate::intent::{self, Intent};
use crate::messages::{Language, MessageCatalog};
use crate::parsing::{self, extract_code, extract_json_object};
use crate::session::{Session, ToolInvocation, Turn, TurnOutcome};

/// Prefix that asks the synthesizer for a bare path
pub const RETRIEVAL_PREFIX: &str = "Please share the API path only, no explanation: ";
pub const ITERATION_LIMIT: &str = "iteration limit exceeded";

const SNIPPET_PROMPT: &str = "\
You write short Python 3 snippets that post-process Cisco APIC REST responses.
The variable `data` holds the parsed JSON response: a dict whose \"imdata\" list \
contains items shaped like {\"<className>\": {\"attributes\": {...}}}.
Answer the request by printing the result (a short table or list is fine) or by \
assigning it to a variable named `result`.
Only these modules may be imported: {modules}. No file, network or OS access.
Reply with the code only.
{history}
Request: {request}
Sample of data: {sample}
";

const PAYLOAD_PROMPT: &str = "\
You build JSON bodies for Cisco APIC REST writes.
{history}
Request: {request}
Endpoint: POST {path}
Reply with a single JSON object, for example \
{\"fvTenant\": {\"attributes\": {\"name\": \"example\"}}}, and nothing else.
";

/// Loop budgets and presentation
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum tool calls per turn (prevent infinite loops)
    pub max_tool_calls_per_turn: usize,
    /// Retrieval calls per turn before asking the user
    pub max_retrieval_attempts: usize,
    /// Extra attempts for a fetch that hit a 5xx or network error
    pub max_transient_retries: usize,
    /// Fetches repeated after an auth error
    pub max_auth_retries: usize,
    /// Earlier turns quoted in completion prompts
    pub history_turns: usize,
    /// Snippet generations per turn, the first included
    pub max_code_attempts: usize,
    pub messages: MessageCatalog,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_tool_calls_per_turn: 10,
            max_retrieval_attempts: 3,
            max_transient_retries: 2,
            max_auth_retries: 1,
            history_turns: 3,
            max_code_attempts: 2,
            messages: MessageCatalog::default(),
        }
    }
}

impl LoopConfig {
    pub fn from_settings(settings: &AgentSettings) -> Self {
        let language = settings.language.parse::<Language>().unwrap_or_else(|e| {
            warn!("{}; falling back to English messages", e);
            Language::En
        });
        Self {
            max_tool_calls_per_turn: settings.max_tool_calls_per_turn.max(1),
            max_retrieval_attempts: settings.max_retrieval_attempts.max(1),
            max_transient_retries: settings.max_transient_retries,
            messages: MessageCatalog::new(language),
            ..Self::default()
        }
    }
}

/// What the loop just learned
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    UserMessage(String),
    ToolSucceeded { tool: String, output: Value },
    ToolFailed { tool: String, error: ToolError },
}

/// What the loop wants to happen next
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    InvokeTool { name: String, input: Value },
    Respond(String),
    Fail(String),
}

/// Everything a turn has accumulated so far
#[derive(Debug, Clone)]
pub struct TurnState {
    request: String,
    history: Vec<(String, String)>,
    intent: Intent,
    invocations: Vec<ToolInvocation>,
    outcome: TurnOutcome,
    retrieval_attempts: usize,
    /// (candidate, reason) pairs fed back into retrieval
    rejected: Vec<(String, String)>,
    alternatives: Vec<String>,
    current: Option<ResourcePath>,
    /// A valid path whose result was empty
    narrowed: Option<String>,
    transient_retries: usize,
    auth_retries: usize,
    payload: Option<Value>,
    fetched: Option<Value>,
    last_snippet: Option<String>,
    code_attempts: usize,
}

impl TurnState {
    pub fn new(request: &str, history: &[Turn]) -> Self {
        Self {
            request: request.trim().to_string(),
            history: history
                .iter()
                .map(|t| (t.user_message.clone(), t.response.clone()))
                .collect(),
            intent: Intent::Read,
            invocations: Vec::new(),
            outcome: TurnOutcome::Answered,
            retrieval_attempts: 0,
            rejected: Vec::new(),
            alternatives: Vec::new(),
            current: None,
            narrowed: None,
            transient_retries: 0,
            auth_retries: 0,
            payload: None,
            fetched: None,
            last_snippet: None,
            code_attempts: 0,
        }
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn invocations(&self) -> &[ToolInvocation] {
        &self.invocations
    }

    pub fn retrieval_attempts(&self) -> usize {
        self.retrieval_attempts
    }

    pub fn rejected(&self) -> &[(String, String)] {
        &self.rejected
    }

    /// Open a pending invocation for a tool call about to run
    pub fn begin_invocation(&mut self, name: &str, input: Value) {
        self.invocations.push(ToolInvocation::pending(name, input));
    }

    /// Settle the pending invocation and turn the result into an observation
    pub fn complete_invocation(&mut self, name: String, result: Result<Value, ToolError>) -> Observation {
        let invocation = self.invocations.last_mut();
        match result {
            Ok(output) => {
                if let Some(inv) = invocation {
                    inv.succeed(output.clone());
                }
                Observation::ToolSucceeded { tool: name, output }
            }
            Err(error) => {
                if let Some(inv) = invocation {
                    inv.fail(error.clone());
                }
                Observation::ToolFailed { tool: name, error }
            }
        }
    }

    fn reject(&mut self, candidate: impl Into<String>, reason: impl Into<String>) {
        let candidate = candidate.into();
        if !self.rejected.iter().any(|(c, _)| *c == candidate) {
            self.rejected.push((candidate, reason.into()));
        }
    }

    fn excluded(&self, path: &str) -> bool {
        self.rejected.iter().any(|(c, _)| c == path) || self.narrowed.as_deref() == Some(path)
    }

    fn history_block(&self) -> String {
        if self.history.is_empty() {
            return String::new();
        }
        let lines = self
            .history
            .iter()
            .map(|(user, agent)| format!("User: {}\nAgent: {}", user, agent))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Earlier in this conversation:\n{}\n", lines)
    }

    fn finish(self, response: String) -> Turn {
        Turn {
            user_message: self.request,
            invocations: self.invocations,
            response,
            outcome: self.outcome,
            created_at: chrono::Utc::now(),
        }
    }
}

/// The decision procedure plus its injected collaborators
pub struct OrchestrationLoop {
    registry: Arc<ToolRegistry>,
    provider: BoxedProvider,
    config: LoopConfig,
}

impl OrchestrationLoop {
    pub fn new(registry: Arc<ToolRegistry>, provider: BoxedProvider, config: LoopConfig) -> Self {
        Self {
            registry,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run one user message to completion against a session snapshot
    pub async fn run_turn(&self, session: &Session, message: &str) -> Turn {
        let mut state = TurnState::new(message, session.last_turns(self.config.history_turns));
        let mut observation = Observation::UserMessage(message.to_string());
        info!("Turn started in session {}: {}", session.id, state.request);

        loop {
            match self.step(&mut state, observation).await {
                Action::InvokeTool { name, input } => {
                    debug!("Invoking {} with {}", name, input);
                    state.begin_invocation(&name, input.clone());
                    let result = self.registry.invoke(&name, input).await;
                    observation = state.complete_invocation(name, result);
                }
                Action::Respond(text) => {
                    info!(
                        "Turn finished ({:?}) after {} tool calls",
                        state.outcome,
                        state.invocations.len()
                    );
                    return state.finish(text);
                }
                Action::Fail(reason) => {
                    warn!("Turn failed after {} tool calls: {}", state.invocations.len(), reason);
                    let attempts: Vec<String> =
                        state.invocations.iter().map(ToolInvocation::summary).collect();
                    state.outcome = if reason == ITERATION_LIMIT {
                        TurnOutcome::Degraded
                    } else {
                        TurnOutcome::Failed
                    };
                    let text = self.config.messages.failure(&reason, &attempts);
                    return state.finish(text);
                }
            }
        }
    }

    /// Decide the next action
    pub async fn step(&self, state: &mut TurnState, observation: Observation) -> Action {
        match observation {
            Observation::UserMessage(message) => self.begin(state, &message).await,
            Observation::ToolSucceeded { tool, output } => self.on_success(state, &tool, output).await,
            Observation::ToolFailed { tool, error } => self.on_failure(state, &tool, error).await,
        }
    }

    async fn begin(&self, state: &mut TurnState, message: &str) -> Action {
        state.request = message.trim().to_string();
        state.intent = intent::classify(&state.request);
        if state.intent == Intent::Mutate {
            state.payload = extract_json_object(&state.request);
        }
        debug!("Intent {:?} for '{}'", state.intent, state.request);

        let explicit = parsing::parse_suggestion(&state.request);
        if let Some(path) = explicit.valid().next().cloned() {
            info!("Using path from the request: {}", path);
            self.note_alternatives(state, explicit.valid().skip(1));
            return self.use_path(state, path).await;
        }

        if state.intent != Intent::Mutate && self.registry.contains(LOOKUP_ENDPOINT).await {
            let name = intent::subject_phrase(&state.request);
            if !name.is_empty() {
                return self.invoke(state, LOOKUP_ENDPOINT, json!({ "name": name }));
            }
        }

        self.retrieve(state)
    }

    async fn on_success(&self, state: &mut TurnState, tool: &str, output: Value) -> Action {
        match tool {
            LOOKUP_ENDPOINT => {
                let hit = output
                    .get("path")
                    .and_then(Value::as_str)
                    .and_then(|p| ResourcePath::parse(p).ok());
                let entry = output.get("name").and_then(Value::as_str).unwrap_or_default();
                let subject = intent::subject_phrase(&state.request);
                match hit {
                    Some(path) if intent::entry_covers_subject(entry, &subject) => {
                        info!("Catalog resolved '{}' to {}", state.request, path);
                        self.use_path(state, path).await
                    }
                    Some(path) => {
                        // Extra words usually name an instance; the class-wide
                        // entry only stays on as an alternative
                        debug!("Catalog entry '{}' does not cover '{}'", entry, subject);
                        self.note_alternatives(state, std::iter::once(&path));
                        self.retrieve(state)
                    }
                    None => self.retrieve(state),
                }
            }
            RETRIEVE_AND_SYNTHESIZE => {
                let text = output.get("text").and_then(Value::as_str).unwrap_or_default();
                let suggestion = parsing::parse_suggestion(text);

                for (candidate, reason) in suggestion.rejected() {
                    debug!("Rejected candidate {}: {}", candidate, reason);
                    state.reject(candidate, reason);
                }

                let pick = suggestion.valid().find(|p| !state.excluded(p.as_str())).cloned();
                match pick {
                    Some(path) => {
                        let others: Vec<ResourcePath> = suggestion
                            .valid()
                            .filter(|p| *p != &path && !state.excluded(p.as_str()))
                            .cloned()
                            .collect();
                        self.note_alternatives(state, others.iter());
                        self.use_path(state, path).await
                    }
                    None => {
                        if suggestion.candidates.is_empty() {
                            state.reject(excerpt(text), "no resource path in the answer");
                        }
                        self.retrieve(state)
                    }
                }
            }
            FETCH_RESOURCE => {
                let path = self.current_path(state);
                if is_empty_result(&output) {
                    if state.narrowed.is_none() && state.retrieval_attempts < self.config.max_retrieval_attempts {
                        info!("{} returned no objects, asking for a narrower path", path);
                        state.narrowed = Some(path);
                        return self.retrieve(state);
                    }
                    return Action::Respond(self.compose(state, self.config.messages.no_objects(&path)));
                }
                if state.intent == Intent::Transform {
                    state.fetched = Some(output);
                    return self.request_snippet(state, None).await;
                }
                let body = format_payload(&self.config.messages, &output);
                Action::Respond(self.compose(state, body))
            }
            MUTATE_RESOURCE => {
                let path = self.current_path(state);
                let mut body = self.config.messages.mutation_applied(&path);
                if !is_empty_result(&output) {
                    body.push('\n');
                    body.push_str(&format_payload(&self.config.messages, &output));
                }
                Action::Respond(self.compose(state, body))
            }
            RUN_CODE => {
                let printed = output
                    .get("output")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .unwrap_or_default();
                if printed.is_empty() {
                    return self
                        .retry_snippet(state, "the snippet printed nothing and set no result".to_string())
                        .await;
                }
                let printed = printed.to_string();
                Action::Respond(self.compose(state, printed))
            }
            other => Action::Fail(format!("unexpected output from tool {}", other)),
        }
    }

    async fn on_failure(&self, state: &mut TurnState, tool: &str, error: ToolError) -> Action {
        match tool {
            LOOKUP_ENDPOINT => {
                warn!("Endpoint lookup failed: {}", error);
                self.retrieve(state)
            }
            RETRIEVE_AND_SYNTHESIZE => {
                warn!("Retrieval attempt {} failed: {}", state.retrieval_attempts, error);
                state.reject(tool, error.to_string());
                self.retrieve(state)
            }
            FETCH_RESOURCE => {
                let path = self.current_path(state);
                if error.is_auth() {
                    if state.auth_retries < self.config.max_auth_retries {
                        state.auth_retries += 1;
                        info!("Auth error on {}, retrying after re-authentication", path);
                        return self.invoke(state, FETCH_RESOURCE, json!({ "path": path }));
                    }
                    return Action::Fail(format!("the controller refused authentication ({})", error));
                }
                if error.is_bad_identifier() {
                    info!("{} rejected by the controller: {}", path, error);
                    state.reject(path, error.to_string());
                    return self.retrieve(state);
                }
                if error.is_transient() {
                    if state.transient_retries < self.config.max_transient_retries {
                        state.transient_retries += 1;
                        warn!(
                            "Transient failure on {} (retry {}/{}): {}",
                            path, state.transient_retries, self.config.max_transient_retries, error
                        );
                        return self.invoke(state, FETCH_RESOURCE, json!({ "path": path }));
                    }
                    return Action::Fail(format!(
                        "the controller is unavailable after {} attempts on {} ({})",
                        state.transient_retries + 1,
                        path,
                        error
                    ));
                }
                Action::Fail(format!("reading {} failed ({})", path, error))
            }
            MUTATE_RESOURCE => {
                let path = self.current_path(state);
                // A refused token means nothing was applied, so one resend is safe
                if error.is_auth() && state.auth_retries < self.config.max_auth_retries {
                    state.auth_retries += 1;
                    info!("Auth error on write to {}, retrying after re-authentication", path);
                    let payload = state.payload.clone().unwrap_or_else(|| json!({}));
                    return self.invoke(state, MUTATE_RESOURCE, json!({ "path": path, "payload": payload }));
                }
                Action::Fail(format!("the change to {} was not applied ({})", path, error))
            }
            RUN_CODE => self.retry_snippet(state, error.to_string()).await,
            other => Action::Fail(format!("tool {} failed ({})", other, error)),
        }
    }

    /// Issue a tool call unless the turn is out of budget
    fn invoke(&self, state: &mut TurnState, name: &str, input: Value) -> Action {
        if state.invocations.len() >= self.config.max_tool_calls_per_turn {
            return Action::Fail(ITERATION_LIMIT.to_string());
        }
        Action::InvokeTool {
            name: name.to_string(),
            input,
        }
    }

    /// Ask retrieval again, or give up with a clarification
    fn retrieve(&self, state: &mut TurnState) -> Action {
        if state.retrieval_attempts >= self.config.max_retrieval_attempts {
            if let Some(path) = state.narrowed.clone() {
                return Action::Respond(self.compose(state, self.config.messages.no_objects(&path)));
            }
            info!(
                "No usable path after {} retrieval attempts, asking for clarification",
                state.retrieval_attempts
            );
            state.outcome = TurnOutcome::Clarification;
            return Action::Respond(
                self.config.messages.clarification(&state.request, &state.rejected),
            );
        }

        let query = self.retrieval_query(state);
        let action = self.invoke(state, RETRIEVE_AND_SYNTHESIZE, json!({ "query": query }));
        if matches!(action, Action::InvokeTool { .. }) {
            state.retrieval_attempts += 1;
        }
        action
    }

    fn retrieval_query(&self, state: &TurnState) -> String {
        let mut query = format!("{}{}", RETRIEVAL_PREFIX, state.request);
        if state.intent == Intent::Mutate {
            query.push_str(" (the endpoint to POST this change to)");
        }
        if let Some(path) = &state.narrowed {
            query.push_str(&format!(
                "\nThe path {} returned no objects; suggest a narrower or different path.",
                path
            ));
        }
        if !state.rejected.is_empty() {
            query.push_str("\nThese candidates were rejected, suggest a different path:");
            for (candidate, reason) in &state.rejected {
                query.push_str(&format!("\n- {}: {}", candidate, reason));
            }
        }
        query
    }

    async fn use_path(&self, state: &mut TurnState, path: ResourcePath) -> Action {
        state.current = Some(path.clone());
        state.transient_retries = 0;

        if state.intent != Intent::Mutate {
            return self.invoke(state, FETCH_RESOURCE, json!({ "path": path.as_str() }));
        }

        if state.payload.is_none() {
            let prompt = PAYLOAD_PROMPT
                .replace("{history}", &state.history_block())
                .replace("{request}", &state.request)
                .replace("{path}", path.as_str());
            match self.provider.complete(&prompt).await {
                Ok(text) => match extract_json_object(&text) {
                    Some(payload) => state.payload = Some(payload),
                    None => {
                        state.outcome = TurnOutcome::Clarification;
                        return Action::Respond(self.config.messages.payload_needed(
                            path.as_str(),
                            "the generated body was not a JSON object",
                        ));
                    }
                },
                Err(e) => {
                    return Action::Fail(format!("could not build the request body ({:#})", e));
                }
            }
        }

        let payload = state.payload.clone().unwrap_or_else(|| json!({}));
        self.invoke(state, MUTATE_RESOURCE, json!({ "path": path.as_str(), "payload": payload }))
    }

    async fn request_snippet(&self, state: &mut TurnState, failure: Option<String>) -> Action {
        let data = state.fetched.clone().unwrap_or(Value::Null);
        let mut prompt = SNIPPET_PROMPT
            .replace("{modules}", &APPROVED_MODULES.join(", "))
            .replace("{history}", &state.history_block())
            .replace("{request}", &state.request)
            .replace("{sample}", &sample(&data));
        if let (Some(reason), Some(previous)) = (failure, state.last_snippet.as_ref()) {
            prompt.push_str(&format!(
                "\nThe previous snippet failed.\n```python\n{}\n```\nError: {}\nReturn a corrected snippet.\n",
                previous, reason
            ));
        }

        state.code_attempts += 1;
        let code = match self.provider.complete(&prompt).await {
            Ok(text) => extract_code(&text),
            Err(e) => return self.degrade(state, &format!("code generation failed: {:#}", e)),
        };
        if code.is_empty() {
            return self.degrade(state, "code generation returned nothing");
        }

        state.last_snippet = Some(code.clone());
        self.invoke(state, RUN_CODE, json!({ "snippet": code, "bindings": data }))
    }

    async fn retry_snippet(&self, state: &mut TurnState, reason: String) -> Action {
        if state.code_attempts < self.config.max_code_attempts {
            info!("Snippet failed ({}), requesting a corrected version", reason);
            return self.request_snippet(state, Some(reason)).await;
        }
        self.degrade(state, &reason)
    }

    /// Formatted raw payload plus a note
    fn degrade(&self, state: &mut TurnState, reason: &str) -> Action {
        warn!("Transformation abandoned: {}", reason);
        state.outcome = TurnOutcome::Degraded;
        let data = state.fetched.clone().unwrap_or(Value::Null);
        let body = format!(
            "{}\n\n{}",
            format_payload(&self.config.messages, &data),
            self.config.messages.transform_degraded(reason)
        );
        Action::Respond(self.compose(state, body))
    }

    fn note_alternatives<'a>(&self, state: &mut TurnState, paths: impl Iterator<Item = &'a ResourcePath>) {
        for path in paths {
            let path = path.as_str().to_string();
            if !state.alternatives.contains(&path) {
                state.alternatives.push(path);
            }
        }
    }

    fn current_path(&self, state: &TurnState) -> String {
        state
            .current
            .as_ref()
            .map(|p| p.as_str().to_string())
            .unwrap_or_default()
    }

    /// Result body followed by the endpoints that were not used
    fn compose(&self, state: &TurnState, body: String) -> String {
        let current = self.current_path(state);
        let alternatives: Vec<String> = state
            .alternatives
            .iter()
            .filter(|p| **p != current && !state.excluded(p))
            .cloned()
            .collect();
        if alternatives.is_empty() {
            body
        } else {
            format!("{}\n\n{}", body, self.config.messages.alternatives(&alternatives))
        }
    }
}

fn excerpt(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if line.is_empty() {
        return "(empty answer)".to_string();
    }
    let mut cut: String = line.chars().take(80).collect();
    if line.chars().count() > 80 {
        cut.push_str("...");
    }
    cut
}

/// The first couple of objects, enough for the model to see the shape
fn sample(data: &Value) -> String {
    let trimmed = match data.get("imdata").and_then(Value::as_array) {
        Some(items) => json!({
            "totalCount": data.get("totalCount").cloned().unwrap_or(Value::Null),
            "imdata": items.iter().take(2).cloned().collect::<Vec<_>>(),
        }),
        None => data.clone(),
    };
    let text = trimmed.to_string();
    if text.chars().count() > 1500 {
        text.chars().take(1500).collect::<String>() + "..."
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fab_llm::{ChatMessage, ChatRequest, ChatResponse, LlmProvider, ProviderType};
    use fab_tools::SimpleTool;
    use std::sync::Mutex;

    /// Replies from a script, repeating the last entry
    struct ScriptedProvider {
        replies: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn provider_type(&self) -> ProviderType {
            ProviderType::OpenAI
        }

        fn model(&self) -> &str {
            "scripted"
        }

        async fn chat_with_request(&self, _request: ChatRequest) -> anyhow::Result<ChatResponse> {
            let mut replies = self.replies.lock().unwrap();
            let text = if replies.len() > 1 {
                replies.pop().unwrap()
            } else {
                replies.last().cloned().unwrap_or_default()
            };
            Ok(ChatResponse {
                message: ChatMessage::assistant(text),
                model: "scripted".into(),
                provider: "openai".into(),
                finish_reason: None,
                usage: None,
            })
        }
    }

    async fn looper(tools: Vec<SimpleTool>, config: LoopConfig) -> OrchestrationLoop {
        let registry = Arc::new(ToolRegistry::new());
        for tool in tools {
            registry.register_tool(Arc::new(tool)).await;
        }
        OrchestrationLoop::new(registry, ScriptedProvider::new(&["{}"]), config)
    }

    fn retrieval_answering(text: &'static str) -> SimpleTool {
        SimpleTool::new(RETRIEVE_AND_SYNTHESIZE, "r", json!({}), move |_| {
            Ok(json!({"text": text, "fragment_count": 1, "mode": "free_text"}))
        })
    }

    #[tokio::test]
    async fn test_first_step_asks_retrieval_for_a_path() {
        let looper = looper(vec![retrieval_answering("/api/class/fvTenant.json")], LoopConfig::default()).await;
        let mut state = TurnState::new("list tenants", &[]);

        let action = looper
            .step(&mut state, Observation::UserMessage("list tenants".into()))
            .await;
        assert_eq!(
            action,
            Action::InvokeTool {
                name: RETRIEVE_AND_SYNTHESIZE.into(),
                input: json!({"query": "Please share the API path only, no explanation: list tenants"}),
            }
        );
        assert_eq!(state.retrieval_attempts(), 1);
    }

    #[tokio::test]
    async fn test_explicit_path_skips_retrieval() {
        let looper = looper(vec![], LoopConfig::default()).await;
        let mut state = TurnState::new("", &[]);
        let action = looper
            .step(
                &mut state,
                Observation::UserMessage("fetch /api/mo/uni/tn-common.json please".into()),
            )
            .await;
        assert_eq!(
            action,
            Action::InvokeTool {
                name: FETCH_RESOURCE.into(),
                input: json!({"path": "/api/mo/uni/tn-common.json"}),
            }
        );
    }

    #[tokio::test]
    async fn test_rejection_reason_is_fed_back() {
        let looper = looper(vec![], LoopConfig::default()).await;
        let mut state = TurnState::new("list tenants", &[]);
        looper
            .step(&mut state, Observation::UserMessage("list tenants".into()))
            .await;
        let action = looper
            .step(
                &mut state,
                Observation::ToolSucceeded {
                    tool: RETRIEVE_AND_SYNTHESIZE.into(),
                    output: json!({"text": "/api/tenants"}),
                },
            )
            .await;

        let Action::InvokeTool { name, input } = action else {
            panic!("expected a second retrieval");
        };
        assert_eq!(name, RETRIEVE_AND_SYNTHESIZE);
        let query = input["query"].as_str().unwrap();
        assert!(query.contains("These candidates were rejected"));
        assert!(query.contains("- /api/tenants: "));
        assert_eq!(state.rejected().len(), 1);
    }

    #[tokio::test]
    async fn test_client_error_rederives_identifier() {
        let looper = looper(vec![], LoopConfig::default()).await;
        let mut state = TurnState::new("list tenants", &[]);
        looper
            .step(&mut state, Observation::UserMessage("show /api/class/fvTenants.json".into()))
            .await;
        let action = looper
            .step(
                &mut state,
                Observation::ToolFailed {
                    tool: FETCH_RESOURCE.into(),
                    error: ToolError::Client {
                        status: 400,
                        body: "unknown class fvTenants".into(),
                    },
                },
            )
            .await;
        assert!(matches!(action, Action::InvokeTool { ref name, .. } if name == RETRIEVE_AND_SYNTHESIZE));
        assert_eq!(state.rejected()[0].0, "/api/class/fvTenants.json");
    }

    #[tokio::test]
    async fn test_budget_exhaustion_fails() {
        let config = LoopConfig {
            max_tool_calls_per_turn: 1,
            ..LoopConfig::default()
        };
        let looper = looper(vec![], config).await;
        let mut state = TurnState::new("list tenants", &[]);
        looper
            .step(&mut state, Observation::UserMessage("/api/class/faultInst.json".into()))
            .await;
        state.begin_invocation(FETCH_RESOURCE, json!({"path": "/api/class/faultInst.json"}));
        let observation =
            state.complete_invocation(FETCH_RESOURCE.into(), Err(ToolError::Server { status: 503 }));

        let action = looper.step(&mut state, observation).await;
        assert_eq!(action, Action::Fail(ITERATION_LIMIT.into()));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = AgentSettings {
            max_tool_calls_per_turn: 4,
            language: "vi".into(),
            ..AgentSettings::default()
        };
        let config = LoopConfig::from_settings(&settings);
        assert_eq!(config.max_tool_calls_per_turn, 4);
        assert_eq!(config.max_retrieval_attempts, 3);
        assert_eq!(config.messages.language(), Language::Vi);

        let fallback = LoopConfig::from_settings(&AgentSettings {
            language: "klingon".into(),
            ..AgentSettings::default()
        });
        assert_eq!(fallback.messages.language(), Language::En);
    }

    #[test]
    fn test_excerpt_and_sample() {
        assert_eq!(excerpt("\n  I don't know  \n"), "I don't know");
        assert_eq!(excerpt(""), "(empty answer)");
        let data = json!({"totalCount": "3", "imdata": [1, 2, 3]});
        let trimmed: Value = serde_json::from_str(&sample(&data)).unwrap();
        assert_eq!(trimmed, json!({"totalCount": "3", "imdata": [1, 2]}));
    }
}
