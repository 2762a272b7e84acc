use crate::conversation::{AssistantContent, Transcript};
use crate::dispatch::{dispatch, Dispatch};
use crate::provider::{CompletionGateway, CompletionRequest, LlmError, ToolChoice};
use crate::registry::ToolRegistry;
use crate::tool::{ToolCall, ToolContext, ANSWER_TOOL};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Schema-listing tool invoked once, synthetically, when a session starts.
pub const BOOTSTRAP_TOOL: &str = "show_tables";

pub const DEFAULT_MAX_ITERATIONS: usize = 20;

const BUDGET_EXHAUSTED_PROMPT: &str = "You have run out of steps for this question. \
Summarize what you have found so far and call the `answer` tool now with your best \
attempt, noting anything you could not verify.";

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Model used for every ordinary turn.
    pub model: String,
    pub max_iterations: usize,
    pub verbose: bool,
}

impl SessionOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            verbose: false,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingUserInput,
    Running,
    Answered,
    BudgetExhausted,
    /// A tool ended the session; no further turns are accepted.
    Terminated,
}

/// Typed view of the `answer` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub summary: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// A turn's final answer: parsed JSON when possible, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Structured(Value),
    Raw(String),
}

impl Answer {
    /// Best-effort parse of the `answer` tool's result text.
    pub fn from_result(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Answer::Structured(value),
            Err(_) => Answer::Raw(text.to_string()),
        }
    }

    fn field(&self, key: &str) -> Option<&str> {
        match self {
            Answer::Structured(value) => value.get(key).and_then(|v| v.as_str()),
            Answer::Raw(_) => None,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        self.field("summary")
    }

    pub fn detail(&self) -> Option<&str> {
        self.field("detail")
    }

    pub fn query(&self) -> Option<&str> {
        self.field("query")
    }

    /// The typed payload, when the structure carries `summary` and `detail`.
    pub fn payload(&self) -> Option<AnswerPayload> {
        match self {
            Answer::Structured(value) => serde_json::from_value(value.clone()).ok(),
            Answer::Raw(_) => None,
        }
    }

    /// The summary, or the raw text when there is no structured summary.
    pub fn summary_or_text(&self) -> String {
        match self {
            Answer::Structured(value) => self
                .summary()
                .map(String::from)
                .unwrap_or_else(|| value.to_string()),
            Answer::Raw(text) => text.clone(),
        }
    }
}

/// How a user turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The model called `answer` within the budget.
    Answered { answer: Answer, steps: usize },
    /// The budget ran out and the forced final call produced this.
    Exhausted { answer: Answer },
    /// A tool ended the session.
    Terminated { message: String },
}

impl TurnOutcome {
    pub fn answer(&self) -> Option<&Answer> {
        match self {
            TurnOutcome::Answered { answer, .. } | TurnOutcome::Exhausted { answer } => Some(answer),
            TurnOutcome::Terminated { .. } => None,
        }
    }
}

/// Result of dispatching every call in one assistant message.
enum StepResult {
    Continue,
    Final(String),
    Terminate(String),
}

/// One conversation between a user and the model, with its tools.
///
/// Flow: User → LLM → ToolCalls → Dispatch → Results → LLM → ... → answer
pub struct AgentSession {
    gateway: Arc<dyn CompletionGateway>,
    registry: ToolRegistry,
    transcript: Transcript,
    options: SessionOptions,
    state: SessionState,
}

impl AgentSession {
    /// Seed the transcript with the system prompt and a synthetic
    /// `show_tables` round so the model sees the schema before the first
    /// question.
    pub async fn start(
        gateway: Arc<dyn CompletionGateway>,
        registry: ToolRegistry,
        system_prompt: impl Into<String>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let mut session = Self {
            gateway,
            registry,
            transcript: Transcript::new(),
            options,
            state: SessionState::AwaitingUserInput,
        };
        session.transcript.push_system(system_prompt);

        let call = ToolCall::synthetic(BOOTSTRAP_TOOL);
        session
            .transcript
            .push_assistant(AssistantContent::calls(vec![call.clone()]));
        match session.run_call(&call).await {
            Dispatch::Continue(text) => session.transcript.push_tool_result(&call, text),
            Dispatch::Terminate { message } => {
                session.state = SessionState::Terminated;
                return Err(SessionError::Terminated(message));
            }
        }
        debug!(tools = session.registry.len(), "Session bootstrapped");
        Ok(session)
    }

    /// Append caller-supplied background information.
    pub fn add_context(&mut self, context: &str) {
        self.transcript
            .push_system(format!("Additional context:\n{context}"));
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Run one user turn to completion.
    pub async fn ask(&mut self, question: &str) -> Result<TurnOutcome, SessionError> {
        if self.state == SessionState::Terminated {
            return Err(SessionError::Terminated(
                "session has already been terminated".to_string(),
            ));
        }
        self.state = SessionState::Running;
        let outcome = self.run_turn(question).await;
        self.state = match &outcome {
            Ok(TurnOutcome::Terminated { .. }) => SessionState::Terminated,
            _ => SessionState::AwaitingUserInput,
        };
        outcome
    }

    async fn run_turn(&mut self, question: &str) -> Result<TurnOutcome, SessionError> {
        self.transcript.push_user(question);

        for iteration in 0..self.options.max_iterations {
            debug!(iteration, "Starting agent loop iteration");
            let message = self.llm_step(ToolChoice::Auto).await?;

            match self.apply(message).await {
                StepResult::Continue => continue,
                StepResult::Final(text) => {
                    self.state = SessionState::Answered;
                    let steps = iteration + 1;
                    info!(steps, "Turn answered");
                    return Ok(TurnOutcome::Answered {
                        answer: Answer::from_result(&text),
                        steps,
                    });
                }
                StepResult::Terminate(message) => return Ok(TurnOutcome::Terminated { message }),
            }
        }

        self.state = SessionState::BudgetExhausted;
        warn!(
            max_iterations = self.options.max_iterations,
            "Iteration budget exhausted, forcing an answer"
        );
        self.transcript.push_system(BUDGET_EXHAUSTED_PROMPT);
        let message = self
            .llm_step(ToolChoice::Force(ANSWER_TOOL.to_string()))
            .await?;
        let fallback = message.text.clone().unwrap_or_default();

        let answer = match self.apply(message).await {
            StepResult::Final(text) => Answer::from_result(&text),
            StepResult::Continue => Answer::Raw(fallback),
            StepResult::Terminate(message) => return Ok(TurnOutcome::Terminated { message }),
        };
        Ok(TurnOutcome::Exhausted { answer })
    }

    /// One gateway round trip with the current transcript and tools.
    async fn llm_step(&self, tool_choice: ToolChoice) -> Result<AssistantContent, SessionError> {
        let request = CompletionRequest::new(
            self.options.model.clone(),
            self.transcript.messages().to_vec(),
        )
        .with_tools(self.registry.specs())
        .with_tool_choice(tool_choice);

        let message = self.gateway.complete(request).await?;
        if let Some(text) = message.visible_text() {
            if self.options.verbose {
                info!(provider = self.gateway.provider_name(), "{text}");
            } else {
                debug!(provider = self.gateway.provider_name(), "{text}");
            }
        }
        Ok(message)
    }

    /// Append the assistant message and dispatch its calls in order.
    ///
    /// Every call in the batch gets its result message; an `answer` call makes
    /// the step final with the first answer's result. Termination stops the
    /// batch immediately.
    async fn apply(&mut self, message: AssistantContent) -> StepResult {
        let calls = message.tool_calls.clone();
        self.transcript.push_assistant(message);
        if calls.is_empty() {
            return StepResult::Continue;
        }

        info!(count = calls.len(), "Executing tool calls");
        let mut answer = None;
        for call in &calls {
            match self.run_call(call).await {
                Dispatch::Continue(text) => {
                    if call.name == ANSWER_TOOL && answer.is_none() {
                        answer = Some(text.clone());
                    }
                    self.transcript.push_tool_result(call, text);
                }
                Dispatch::Terminate { message } => {
                    self.state = SessionState::Terminated;
                    return StepResult::Terminate(message);
                }
            }
        }

        match answer {
            Some(text) => StepResult::Final(text),
            None => StepResult::Continue,
        }
    }

    async fn run_call(&self, call: &ToolCall) -> Dispatch {
        let ctx = ToolContext {
            transcript: &self.transcript,
            verbose: self.options.verbose,
        };
        dispatch(call, &self.registry, &ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("Session terminated: {0}")]
    Terminated(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;
    use crate::registry::ToolBinding;
    use crate::testing::{EchoTool, FailingTool, ScriptedGateway};
    use crate::tool::{answer_spec, Tool, ToolError, ToolOutput, ToolSpec};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingShowTables(Arc<AtomicUsize>);

    #[async_trait]
    impl Tool for CountingShowTables {
        async fn execute(&self, _input: Value, _ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutput::Text("main | t | table".into()))
        }
    }

    struct Goodbye;

    #[async_trait]
    impl Tool for Goodbye {
        async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
            let message = crate::tool::str_arg(&input, "message")?;
            Ok(ToolOutput::Terminate {
                message: message.to_string(),
            })
        }
    }

    fn spec(name: &str) -> ToolSpec {
        ToolSpec::new(name, "test", json!({"type": "object", "properties": {}}))
    }

    fn registry(bootstraps: Arc<AtomicUsize>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                spec("show_tables"),
                ToolBinding::Instance(Arc::new(CountingShowTables(bootstraps))),
            )
            .unwrap();
        registry
            .register(spec("echo"), ToolBinding::Instance(Arc::new(EchoTool)))
            .unwrap();
        registry
            .register(spec("explode"), ToolBinding::Instance(Arc::new(FailingTool("boom"))))
            .unwrap();
        registry
            .register(spec("terminate"), ToolBinding::Instance(Arc::new(Goodbye)))
            .unwrap();
        registry.register(answer_spec(), ToolBinding::Marker).unwrap();
        registry
    }

    async fn session(gateway: Arc<ScriptedGateway>, max_iterations: usize) -> (AgentSession, Arc<AtomicUsize>) {
        let bootstraps = Arc::new(AtomicUsize::new(0));
        let session = AgentSession::start(
            gateway,
            registry(bootstraps.clone()),
            "You are a test assistant.",
            SessionOptions::new("test-model").with_max_iterations(max_iterations),
        )
        .await
        .unwrap();
        (session, bootstraps)
    }

    fn answer_args() -> Value {
        json!({"summary": "3 rows", "detail": "counted with select count(*)"})
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_schema_view() {
        let gateway = Arc::new(ScriptedGateway::new());
        let (session, bootstraps) = session(gateway.clone(), 5).await;

        let messages = session.transcript().messages();
        assert_eq!(messages.len(), 3);
        assert!(matches!(&messages[0], Message::System(p) if p.contains("test assistant")));
        assert_eq!(messages[1].tool_calls()[0].name, "show_tables");
        assert!(matches!(&messages[2], Message::Tool(r) if r.content == "main | t | table"));
        assert_eq!(bootstraps.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.request_count(), 0);
        assert_eq!(session.state(), SessionState::AwaitingUserInput);
    }

    #[tokio::test]
    async fn test_answer_after_tool_call() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_call("c1", "echo", json!({"message": "3"}));
        gateway.push_call("c2", "answer", answer_args());
        let (mut session, _) = session(gateway.clone(), 5).await;

        let outcome = session.ask("how many rows are in t?").await.unwrap();

        match &outcome {
            TurnOutcome::Answered { answer, steps } => {
                assert_eq!(*steps, 2);
                assert_eq!(answer, &Answer::Structured(answer_args()));
                assert_eq!(answer.summary(), Some("3 rows"));
                assert_eq!(answer.query(), None);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(gateway.request_count(), 2);
        assert!(session.transcript().validate().is_ok());
        assert_eq!(session.state(), SessionState::AwaitingUserInput);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_forces_answer() {
        let gateway = Arc::new(ScriptedGateway::new());
        for i in 0..3 {
            gateway.push_call(&format!("c{i}"), "echo", json!({"message": "still looking"}));
        }
        gateway.push_call("final", "answer", json!({"summary": "partial", "detail": "ran out"}));
        let (mut session, _) = session(gateway.clone(), 3).await;

        let outcome = session.ask("hard question").await.unwrap();

        assert!(matches!(
            &outcome,
            TurnOutcome::Exhausted { answer } if answer.summary() == Some("partial")
        ));
        let requests = gateway.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests[..3].iter().all(|r| r.tool_choice == ToolChoice::Auto));
        assert_eq!(requests[3].tool_choice, ToolChoice::Force("answer".into()));
        assert!(matches!(
            requests[3].messages.last(),
            Some(Message::System(text)) if text.contains("answer")
        ));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_without_any_calls_still_returns() {
        // An empty gateway replies with blank text every time.
        let gateway = Arc::new(ScriptedGateway::new());
        let (mut session, _) = session(gateway.clone(), 4).await;

        let outcome = session.ask("anything").await.unwrap();

        assert_eq!(
            outcome,
            TurnOutcome::Exhausted {
                answer: Answer::Raw(String::new())
            }
        );
        assert_eq!(gateway.request_count(), 5);
    }

    #[tokio::test]
    async fn test_forced_reply_text_is_returned_raw() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_text("thinking");
        gateway.push_text("I could not finish.");
        let (mut session, _) = session(gateway.clone(), 1).await;

        let outcome = session.ask("q").await.unwrap();
        assert_eq!(
            outcome,
            TurnOutcome::Exhausted {
                answer: Answer::Raw("I could not finish.".into())
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_answer_payload_returned_raw() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_raw_call("c1", "answer", "{\"summary\": \"x\"");
        gateway.push_raw_call("c2", "answer", "\"just a string\"");
        let (mut session, _) = session(gateway.clone(), 5).await;

        // Unparseable arguments: the dispatcher's error text is the result.
        let first = session.ask("q1").await.unwrap();
        assert!(matches!(
            first,
            TurnOutcome::Answered { answer: Answer::Raw(ref t), steps: 1 }
                if t == crate::dispatch::INVALID_ARGUMENTS
        ));

        // Valid JSON of the wrong shape still ends the turn without raising.
        let second = session.ask("q2").await.unwrap();
        let answer = second.answer().unwrap();
        assert_eq!(answer, &Answer::Structured(json!("just a string")));
        assert!(answer.payload().is_none());
        assert_eq!(answer.summary_or_text(), "\"just a string\"");
    }

    #[tokio::test]
    async fn test_every_call_in_a_batch_gets_a_result() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push(AssistantContent::calls(vec![
            ToolCall::new("a", "echo", r#"{"message": "one"}"#),
            ToolCall::new("b", "explode", "{}"),
            ToolCall::new("c", "teleport", "{}"),
            ToolCall::new("d", "answer", answer_args().to_string()),
            ToolCall::new("e", "echo", r#"{"message": "after"}"#),
        ]));
        let (mut session, _) = session(gateway.clone(), 5).await;

        let outcome = session.ask("q").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Answered { steps: 1, .. }));

        let results: Vec<_> = session
            .transcript()
            .messages()
            .iter()
            .skip(5)
            .filter_map(|m| match m {
                Message::Tool(r) => Some((r.tool_call_id.as_str(), r.content.as_str())),
                _ => None,
            })
            .collect();
        let ids: Vec<_> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert!(results[1].1.contains("boom"));
        assert_eq!(results[2].1, "Error: function teleport does not exist");
        assert!(session.transcript().validate().is_ok());
    }

    #[tokio::test]
    async fn test_bootstrap_runs_once_across_turns() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_call("c1", "answer", answer_args());
        gateway.push_call("c2", "answer", answer_args());
        let (mut session, bootstraps) = session(gateway.clone(), 5).await;

        session.ask("first").await.unwrap();
        session.ask("second").await.unwrap();

        assert_eq!(bootstraps.load(Ordering::SeqCst), 1);
        let show_tables_calls = session
            .transcript()
            .messages()
            .iter()
            .flat_map(|m| m.tool_calls())
            .filter(|c| c.name == BOOTSTRAP_TOOL)
            .count();
        assert_eq!(show_tables_calls, 1);
    }

    #[tokio::test]
    async fn test_terminate_escapes_the_loop() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_call("c1", "terminate", json!({"message": "goodbye"}));
        let (mut session, _) = session(gateway.clone(), 5).await;

        let outcome = session.ask("please stop").await.unwrap();

        assert_eq!(
            outcome,
            TurnOutcome::Terminated {
                message: "goodbye".into()
            }
        );
        assert_eq!(session.state(), SessionState::Terminated);
        assert!(session
            .transcript()
            .messages()
            .iter()
            .filter_map(Message::text)
            .all(|t| !t.contains("raised an exception")));
        assert!(matches!(
            session.ask("again").await,
            Err(SessionError::Terminated(_))
        ));
        assert_eq!(gateway.request_count(), 1);
    }

    #[tokio::test]
    async fn test_gateway_failure_aborts_turn() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_error(LlmError::AuthError("invalid api key".into()));
        gateway.push_call("c1", "answer", answer_args());
        let (mut session, _) = session(gateway.clone(), 5).await;

        let err = session.ask("q").await.unwrap_err();
        assert!(matches!(err, SessionError::Llm(LlmError::AuthError(_))));
        assert_eq!(session.state(), SessionState::AwaitingUserInput);

        // The session stays usable for the next turn.
        assert!(session.ask("q again").await.is_ok());
    }

    #[tokio::test]
    async fn test_context_appended_after_bootstrap() {
        let gateway = Arc::new(ScriptedGateway::new());
        let (mut session, _) = session(gateway, 5).await;
        session.add_context("fiscal year starts in April");

        assert!(matches!(
            session.transcript().last(),
            Some(Message::System(t)) if t.ends_with("fiscal year starts in April")
        ));
    }

    #[tokio::test]
    async fn test_requests_offer_registered_specs() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_call("c1", "answer", answer_args());
        let (mut session, _) = session(gateway.clone(), 5).await;
        session.ask("q").await.unwrap();

        let request = &gateway.requests()[0];
        let names: Vec<_> = request.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["show_tables", "echo", "explode", "terminate", "answer"]);
        assert_eq!(request.model, "test-model");
    }
}
