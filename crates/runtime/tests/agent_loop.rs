//! End-to-end runs of the agent loop against scripted doubles.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mcp::{CallToolResult, ReadResourceResult, Resource, ServerConfig, Tool};
use runtime::{
    Agent, AgentConfig, Completion, Connector, Error, ModelError, RunOutcome, ScriptedCompletion,
    ToolRegistry, ToolSession,
};
use serde_json::{Map, Value, json};

// ── Doubles ──────────────────────────────────────────────────────────────────

/// A session that answers every call from a queue of canned results.
struct MockSession {
    tools: Vec<Tool>,
    replies: Mutex<Vec<mcp::Result<CallToolResult>>>,
    received: Mutex<Vec<(String, Map<String, Value>)>>,
    delay: Option<Duration>,
    shutdowns: AtomicUsize,
}

impl MockSession {
    fn new(tools: &[&str]) -> Self {
        Self {
            tools: tools
                .iter()
                .map(|name| Tool {
                    name: name.to_string(),
                    description: Some(format!("The {name} tool")),
                    input_schema: json!({
                        "type": "object",
                        "properties": {"code": {"type": "string"}},
                        "required": ["code"]
                    }),
                })
                .collect(),
            replies: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
            delay: None,
            shutdowns: AtomicUsize::new(0),
        }
    }

    fn replying(self, replies: Vec<mcp::Result<CallToolResult>>) -> Self {
        *self.replies.lock().unwrap() = replies.into_iter().rev().collect();
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolSession for MockSession {
    async fn list_tools(&self) -> mcp::Result<Vec<Tool>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> mcp::Result<CallToolResult> {
        self.received
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Ok(CallToolResult::text("default output")))
    }

    async fn list_resources(&self) -> mcp::Result<Vec<Resource>> {
        Ok(Vec::new())
    }

    async fn read_resource(&self, _uri: &str) -> mcp::Result<ReadResourceResult> {
        Ok(ReadResourceResult::default())
    }

    async fn shutdown(&self) -> mcp::Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out pre-built sessions by server name; unknown names fail to connect.
#[derive(Default)]
struct MockConnector {
    sessions: Mutex<HashMap<String, Arc<MockSession>>>,
    attempts: AtomicUsize,
}

impl MockConnector {
    fn with(self, name: &str, session: Arc<MockSession>) -> Self {
        self.sessions
            .lock()
            .unwrap()
            .insert(name.to_string(), session);
        self
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &ServerConfig) -> mcp::Result<Arc<dyn ToolSession>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let session = self.sessions.lock().unwrap().get(&config.name).cloned();
        match session {
            Some(session) => Ok(session),
            None => Err(mcp::Error::ServerExited),
        }
    }
}

/// Sleeps before each scripted reply; a call cut off by a timeout consumes
/// no reply.
struct SlowCompletion {
    delays: Mutex<Vec<Duration>>,
    inner: ScriptedCompletion,
}

impl SlowCompletion {
    fn new(delays: &[u64], responses: &[&str]) -> Self {
        Self {
            delays: Mutex::new(delays.iter().rev().map(|s| Duration::from_secs(*s)).collect()),
            inner: ScriptedCompletion::new(responses.iter().copied()),
        }
    }
}

#[async_trait]
impl Completion for SlowCompletion {
    async fn complete(&self, model_id: &str, prompt: &str) -> Result<String, ModelError> {
        let delay = self.delays.lock().unwrap().pop().unwrap_or_default();
        tokio::time::sleep(delay).await;
        self.inner.complete(model_id, prompt).await
    }

    fn name(&self) -> &str {
        "slow"
    }
}

async fn registry_with(session_id: &str, session: Arc<MockSession>) -> Arc<ToolRegistry> {
    let registry = Arc::new(ToolRegistry::new(Arc::new(
        MockConnector::default().with(session_id, session),
    )));
    let config = ServerConfig::new(session_id, "mock", Vec::<String>::new());
    registry.connect(session_id, &config).await.unwrap();
    registry
}

fn agent(completion: Arc<ScriptedCompletion>, registry: Arc<ToolRegistry>, max_steps: usize) -> Agent {
    let config = AgentConfig::default()
        .with_model("test-model")
        .with_max_steps(max_steps);
    Agent::new(completion, registry, config)
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn analyze_then_complete() {
    let session = Arc::new(
        MockSession::new(&["analyze_code"]).replying(vec![Ok(CallToolResult::text("looks fine"))]),
    );
    let registry = registry_with("analyze", session.clone()).await;
    let completion = Arc::new(ScriptedCompletion::new([
        r#"{"tool":"analyze.analyze_code","args":{"code":"def f(): pass"}}"#,
        r#"{"done": true, "summary":"No issues found"}"#,
    ]));
    let mut agent = agent(completion.clone(), registry, 10);

    let outcome = agent.run("Review the code").await;

    assert_eq!(
        outcome,
        RunOutcome::Done {
            summary: "No issues found".into(),
            steps: 2,
        }
    );
    assert_eq!(completion.calls(), 2);
    assert_eq!(session.calls(), 1);

    let received = session.received.lock().unwrap().clone();
    assert_eq!(received[0].0, "analyze_code");
    assert_eq!(received[0].1["code"], "def f(): pass");

    let history = agent.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history.entries()[0].observation, "looks fine");

    let second_prompt = &completion.prompts()[1];
    assert!(second_prompt.contains("Previous result: looks fine"));
    assert!(second_prompt.contains("Continue with the original task: Review the code"));
    assert!(second_prompt.contains("1. I used tool analyze.analyze_code"));
}

#[tokio::test]
async fn malformed_reply_becomes_history() {
    let registry = registry_with("analyze", Arc::new(MockSession::new(&["analyze_code"]))).await;
    let completion = Arc::new(ScriptedCompletion::new([
        "I think you should...",
        r#"{"done": true, "summary": "gave up"}"#,
    ]));
    let mut agent = agent(completion.clone(), registry, 5);

    let outcome = agent.run("Review the code").await;
    assert!(outcome.is_done());

    let entry = &agent.history().entries()[0];
    assert_eq!(entry.step, 1);
    assert!(entry.failed);
    assert!(entry.tool.is_none());
    assert!(entry.observation.contains("could not parse model decision"));
    assert!(entry.observation.contains("I think you should..."));

    assert!(completion.prompts()[1].contains(&entry.observation));
}

#[tokio::test]
async fn budget_runs_out_with_last_result() {
    let session = Arc::new(MockSession::new(&["analyze_code"]).replying(vec![
        Ok(CallToolResult::text("first pass")),
        Ok(CallToolResult::text("second pass")),
    ]));
    let registry = registry_with("analyze", session.clone()).await;
    let invoke = r#"{"tool":"analyze.analyze_code","args":{"code":"x"}}"#;
    let completion = Arc::new(ScriptedCompletion::new([invoke, invoke, invoke]));
    let mut agent = agent(completion.clone(), registry, 2);

    let outcome = agent.run("Keep going").await;

    let RunOutcome::Exhausted {
        steps,
        last_result,
        message,
    } = outcome
    else {
        panic!("expected exhaustion");
    };
    assert_eq!(steps, 2);
    assert_eq!(last_result.as_deref(), Some("second pass"));
    assert!(message.contains("incomplete after 2 steps"));
    assert!(message.contains("second pass"));
    assert_eq!(completion.calls(), 2);
    assert_eq!(session.calls(), 2);
}

#[tokio::test]
async fn zero_steps_never_asks_the_model() {
    let registry = Arc::new(ToolRegistry::stdio());
    let completion = Arc::new(ScriptedCompletion::new(["unused"]));
    let mut agent = agent(completion.clone(), registry, 0);

    let outcome = agent.run("anything").await;

    assert!(matches!(outcome, RunOutcome::Exhausted { steps: 0, .. }));
    assert!(outcome.message().contains("incomplete after 0 steps"));
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn complete_on_first_step() {
    let registry = Arc::new(ToolRegistry::stdio());
    let completion = Arc::new(ScriptedCompletion::new([
        r#"{"done": true, "summary": "nothing to do"}"#,
    ]));
    let mut agent = agent(completion.clone(), registry, 3);

    let outcome = agent.run("trivial").await;

    assert_eq!(outcome.message(), "nothing to do");
    assert_eq!(outcome.steps(), 1);
    assert!(agent.history().is_empty());
}

// ── Recoverable step failures ────────────────────────────────────────────────

#[tokio::test]
async fn unknown_tool_is_reported_back_to_the_model() {
    let session = Arc::new(MockSession::new(&["analyze_code"]));
    let registry = registry_with("analyze", session.clone()).await;
    let completion = Arc::new(ScriptedCompletion::new([
        r#"{"tool": "analyze_code", "args": {"code": "x"}}"#,
        r#"{"done": true, "summary": "fixed"}"#,
    ]));
    let mut agent = agent(completion.clone(), registry, 3);

    let outcome = agent.run("Review").await;

    assert!(outcome.is_done());
    assert_eq!(session.calls(), 0);
    let entry = &agent.history().entries()[0];
    assert_eq!(entry.observation, "Error: unknown tool: analyze_code");
    assert!(completion.prompts()[1].contains("unknown tool: analyze_code"));
}

#[tokio::test]
async fn tool_failure_does_not_end_the_run() {
    let session = Arc::new(MockSession::new(&["analyze_code"]).replying(vec![
        Err(mcp::Error::ToolCallFailed("syntax error".into())),
        Ok(CallToolResult::text("ok now")),
    ]));
    let registry = registry_with("analyze", session).await;
    let invoke = r#"{"tool":"analyze.analyze_code","args":{"code":"x"}}"#;
    let completion = Arc::new(ScriptedCompletion::new([
        invoke,
        invoke,
        r#"{"done": true, "summary": "done"}"#,
    ]));
    let mut agent = agent(completion, registry, 5);

    let outcome = agent.run("Review").await;

    assert_eq!(outcome.steps(), 3);
    let entries = agent.history().entries();
    assert!(entries[0].failed);
    assert!(entries[0].observation.contains("syntax error"));
    assert!(!entries[1].failed);
    assert_eq!(entries[1].observation, "ok now");
}

#[tokio::test]
async fn completion_failure_is_a_failed_step() {
    let registry = Arc::new(ToolRegistry::stdio());
    let completion = Arc::new(
        ScriptedCompletion::default()
            .then_fail("overloaded")
            .then_respond(r#"{"done": true, "summary": "recovered"}"#),
    );
    let mut agent = agent(completion.clone(), registry, 3);

    let outcome = agent.run("Review").await;

    assert_eq!(outcome.message(), "recovered");
    assert_eq!(completion.calls(), 2);
    let entry = &agent.history().entries()[0];
    assert!(entry.failed);
    assert!(entry.observation.contains("overloaded"));
}

#[tokio::test(start_paused = true)]
async fn slow_tool_times_out_the_step_only() {
    let session = Arc::new(MockSession::new(&["analyze_code"]).slow(Duration::from_secs(600)));
    let registry = registry_with("analyze", session).await;
    let completion = Arc::new(ScriptedCompletion::new([
        r#"{"tool":"analyze.analyze_code","args":{"code":"x"}}"#,
        r#"{"done": true, "summary": "moved on"}"#,
    ]));
    let config = AgentConfig::default()
        .with_max_steps(3)
        .with_step_timeout(Duration::from_secs(5));
    let mut agent = Agent::new(completion, registry, config);

    let outcome = agent.run("Review").await;

    assert_eq!(outcome.message(), "moved on");
    let entry = &agent.history().entries()[0];
    assert!(entry.failed);
    assert!(entry.observation.contains("timed out after 5s"));
}

#[tokio::test(start_paused = true)]
async fn slow_completion_times_out_the_step_only() {
    let registry = Arc::new(ToolRegistry::stdio());
    let completion = Arc::new(SlowCompletion::new(
        &[600, 0],
        &[r#"{"done": true, "summary": "second try"}"#],
    ));
    let config = AgentConfig::default()
        .with_max_steps(3)
        .with_step_timeout(Duration::from_secs(5));
    let mut agent = Agent::new(completion, registry, config);

    let outcome = agent.run("Review").await;

    assert_eq!(
        outcome,
        RunOutcome::Done {
            summary: "second try".into(),
            steps: 2,
        }
    );
    let entry = &agent.history().entries()[0];
    assert!(entry.failed);
    assert!(entry.tool.is_none());
    assert_eq!(entry.observation, "Error: step timed out after 5s");
}

#[tokio::test(start_paused = true)]
async fn think_and_act_share_one_deadline() {
    // 4s of thinking plus a 2s tool overruns a 5s step even though each
    // phase alone fits.
    let session = Arc::new(MockSession::new(&["analyze_code"]).slow(Duration::from_secs(2)));
    let registry = registry_with("analyze", session.clone()).await;
    let completion = Arc::new(SlowCompletion::new(
        &[4, 0],
        &[
            r#"{"tool":"analyze.analyze_code","args":{"code":"x"}}"#,
            r#"{"done": true, "summary": "moved on"}"#,
        ],
    ));
    let config = AgentConfig::default()
        .with_max_steps(3)
        .with_step_timeout(Duration::from_secs(5));
    let mut agent = Agent::new(completion, registry, config);

    let outcome = agent.run("Review").await;

    assert_eq!(outcome.message(), "moved on");
    assert_eq!(outcome.steps(), 2);
    assert_eq!(session.calls(), 1);
    let entry = &agent.history().entries()[0];
    assert!(entry.failed);
    assert_eq!(entry.tool.as_deref(), Some("analyze.analyze_code"));
    assert_eq!(entry.observation, "Error: step timed out after 5s");
}

#[tokio::test(start_paused = true)]
async fn catalog_wait_counts_against_the_step() {
    let busy = Arc::new(MockSession::new(&["analyze_code"]).slow(Duration::from_secs(600)));
    let connector = MockConnector::default()
        .with("analyze", busy.clone())
        .with("late", Arc::new(MockSession::new(&["lint"])));
    let registry = Arc::new(ToolRegistry::new(Arc::new(connector)));
    registry
        .connect("analyze", &ServerConfig::new("analyze", "mock", Vec::<String>::new()))
        .await
        .unwrap();

    // A long invoke holds the read lock, and a connect queues for the write
    // lock behind it; new readers now wait for both.
    let invoking = registry.clone();
    tokio::spawn(async move { invoking.invoke("analyze.analyze_code", Map::new()).await });
    while busy.calls() == 0 {
        tokio::task::yield_now().await;
    }
    let connecting = registry.clone();
    tokio::spawn(async move {
        connecting
            .connect("late", &ServerConfig::new("late", "mock", Vec::<String>::new()))
            .await
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let completion = Arc::new(ScriptedCompletion::new([
        r#"{"done": true, "summary": "unreachable"}"#,
    ]));
    let config = AgentConfig::default()
        .with_max_steps(1)
        .with_step_timeout(Duration::from_secs(5));
    let mut agent = Agent::new(completion.clone(), registry, config);

    let outcome = agent.run("Review").await;

    assert!(matches!(outcome, RunOutcome::Exhausted { steps: 1, .. }));
    assert_eq!(completion.calls(), 0);
    assert_eq!(
        agent.history().entries()[0].observation,
        "Error: step timed out after 5s"
    );
}

#[tokio::test]
async fn history_is_reset_between_runs() {
    let registry = registry_with("analyze", Arc::new(MockSession::new(&["analyze_code"]))).await;
    let completion = Arc::new(ScriptedCompletion::new([
        r#"{"tool":"analyze.analyze_code","args":{"code":"x"}}"#,
        r#"{"done": true, "summary": "one"}"#,
        r#"{"done": true, "summary": "two"}"#,
    ]));
    let mut agent = agent(completion.clone(), registry, 5);

    agent.run("first").await;
    assert_eq!(agent.history().len(), 1);

    let outcome = agent.run("second").await;
    assert_eq!(outcome.message(), "two");
    assert!(agent.history().is_empty());
    assert!(completion.prompts()[2].contains("No history yet"));
}

#[tokio::test]
async fn agents_share_a_registry() {
    let session = Arc::new(MockSession::new(&["analyze_code"]));
    let registry = registry_with("analyze", session.clone()).await;

    let script = |summary: &str| {
        Arc::new(ScriptedCompletion::new([
            r#"{"tool":"analyze.analyze_code","args":{"code":"x"}}"#.to_string(),
            format!(r#"{{"done": true, "summary": "{summary}"}}"#),
        ]))
    };
    let mut first = agent(script("a"), registry.clone(), 3);
    let mut second = agent(script("b"), registry.clone(), 3);

    let (a, b) = tokio::join!(first.run("task a"), second.run("task b"));

    assert_eq!(a.message(), "a");
    assert_eq!(b.message(), "b");
    assert_eq!(session.calls(), 2);
}

// ── Registry setup ───────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_connect_leaves_registry_untouched() {
    let connector = Arc::new(
        MockConnector::default().with("fs", Arc::new(MockSession::new(&["read"]))),
    );
    let registry = ToolRegistry::new(connector.clone());

    registry
        .connect("fs", &ServerConfig::new("fs", "mock", Vec::<String>::new()))
        .await
        .unwrap();
    let err = registry
        .connect("web", &ServerConfig::new("web", "mock", Vec::<String>::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Connection { ref session, .. } if session == "web"));
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(registry.session_ids().await, vec!["fs"]);

    let err = registry
        .connect("fs", &ServerConfig::new("fs", "mock", Vec::<String>::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateSession(_)));
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn sessions_acquired_before_a_failed_connect_are_released() {
    let first = Arc::new(MockSession::new(&["read"]));
    let connector = MockConnector::default().with("a", first.clone());
    let registry = ToolRegistry::new(Arc::new(connector));

    registry
        .connect("a", &ServerConfig::new("a", "mock", Vec::<String>::new()))
        .await
        .unwrap();
    let err = registry
        .connect("b", &ServerConfig::new("b", "mock", Vec::<String>::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Connection { ref session, .. } if session == "b"));
    assert_eq!(first.shutdowns(), 0);

    registry.disconnect_all().await.unwrap();

    assert_eq!(first.shutdowns(), 1);
    assert!(registry.is_empty().await);
    assert!(registry.session_ids().await.is_empty());
}

#[tokio::test]
async fn sessions_with_same_tool_names_do_not_collide() {
    let connector = MockConnector::default()
        .with("one", Arc::new(MockSession::new(&["analyze_code", "lint"])))
        .with("two", Arc::new(MockSession::new(&["analyze_code"])));
    let registry = ToolRegistry::new(Arc::new(connector));

    for id in ["one", "two"] {
        registry
            .connect(id, &ServerConfig::new(id, "mock", Vec::<String>::new()))
            .await
            .unwrap();
    }

    let names: Vec<_> = registry.list_tools().await.into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["one.analyze_code", "one.lint", "two.analyze_code"]);
}
