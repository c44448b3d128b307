//! The think/act loop.
//!
//! Each step asks the [`DecisionEngine`] for a decision and carries it out
//! against the [`ToolRegistry`]. Whatever happens inside a step, including
//! tool failures, unparseable replies and timeouts, becomes an observation in
//! the history instead of ending the run. Only completion or the step budget
//! ends it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Map;
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, info, info_span, warn};

use crate::decision::{Decision, DecisionEngine};
use crate::history::{History, HistoryEntry};
use crate::model::Completion;
use crate::tools::ToolRegistry;
use crate::Error;

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_STEPS: usize = 10;
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(120);

/// Agent loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Model id passed to the completion service.
    pub model: String,
    /// Maximum number of think/act steps per run.
    pub max_steps: usize,
    /// Time budget for one step, shared by its think and act phases.
    pub step_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

impl AgentConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }
}

/// Where the loop is.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentState {
    Thinking,
    Acting(Decision),
    Done(String),
    Exhausted,
}

/// What one step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub observation: String,
    /// Set only when the model declared completion.
    pub terminal: bool,
}

impl StepResult {
    fn observed(observation: impl Into<String>) -> Self {
        Self {
            observation: observation.into(),
            terminal: false,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model declared completion.
    Done { summary: String, steps: usize },
    /// The step budget ran out first.
    Exhausted {
        steps: usize,
        last_result: Option<String>,
        message: String,
    },
}

impl RunOutcome {
    /// Text to show the user.
    pub fn message(&self) -> &str {
        match self {
            RunOutcome::Done { summary, .. } => summary,
            RunOutcome::Exhausted { message, .. } => message,
        }
    }

    /// Steps taken, counting the final one.
    pub fn steps(&self) -> usize {
        match self {
            RunOutcome::Done { steps, .. } | RunOutcome::Exhausted { steps, .. } => *steps,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, RunOutcome::Done { .. })
    }
}

/// A single-task agent.
///
/// Steps run strictly one after another. Several agents may share one
/// registry and run concurrently.
pub struct Agent {
    engine: DecisionEngine,
    registry: Arc<ToolRegistry>,
    config: AgentConfig,
    history: History,
}

impl Agent {
    pub fn new(
        completion: Arc<dyn Completion>,
        registry: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            engine: DecisionEngine::new(completion, config.model.clone()),
            registry,
            config,
            history: History::new(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// History of the current or most recent run.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Run `goal` to completion or until the step budget is spent.
    pub async fn run(&mut self, goal: &str) -> RunOutcome {
        self.history.clear();
        let max_steps = self.config.max_steps;
        info!(%goal, max_steps, "starting run");

        let mut state = AgentState::Thinking;
        let mut step = 0;
        let mut deadline = Instant::now();
        let mut request = goal.to_string();
        let mut last_result: Option<String> = None;

        loop {
            state = match state {
                AgentState::Thinking if step >= max_steps => AgentState::Exhausted,

                AgentState::Thinking => {
                    step += 1;
                    deadline = Instant::now() + self.config.step_timeout;
                    let thought = self
                        .think(&request, deadline)
                        .instrument(info_span!("step", step, phase = "think"))
                        .await;
                    match thought {
                        Ok(decision) => AgentState::Acting(decision),
                        Err(e) => {
                            warn!(step, "think failed: {e}");
                            let result = self.record(step, None, Map::new(), Err(e));
                            request = continuation(&result.observation, goal);
                            last_result = Some(result.observation);
                            AgentState::Thinking
                        }
                    }
                }

                AgentState::Acting(decision) => {
                    let result = self
                        .act(step, decision, deadline)
                        .instrument(info_span!("step", step, phase = "act"))
                        .await;
                    if result.terminal {
                        AgentState::Done(result.observation)
                    } else {
                        request = continuation(&result.observation, goal);
                        last_result = Some(result.observation);
                        AgentState::Thinking
                    }
                }

                AgentState::Done(summary) => {
                    info!(steps = step, "run complete");
                    return RunOutcome::Done {
                        summary,
                        steps: step,
                    };
                }

                AgentState::Exhausted => {
                    let message = format!(
                        "Workflow incomplete after {max_steps} steps. Last result: {}",
                        last_result.as_deref().unwrap_or("none")
                    );
                    warn!(steps = step, "step budget exhausted");
                    return RunOutcome::Exhausted {
                        steps: step,
                        last_result,
                        message,
                    };
                }
            };
        }
    }

    async fn think(&self, request: &str, deadline: Instant) -> Result<Decision, Error> {
        // Waiting on the registry lock counts against the step.
        let decide = async {
            let catalog = self.registry.list_tools().await;
            self.engine.decide(request, &self.history, &catalog).await
        };
        let decision = timeout_at(deadline, decide)
            .await
            .map_err(|_| Error::Timeout(self.config.step_timeout))??;
        Ok(decision)
    }

    async fn act(&mut self, step: usize, decision: Decision, deadline: Instant) -> StepResult {
        match decision {
            Decision::Complete { summary } => StepResult {
                observation: summary,
                terminal: true,
            },

            Decision::Malformed { raw_text, reason } => {
                warn!(step, %reason, "model reply was not a decision");
                self.record(
                    step,
                    None,
                    Map::new(),
                    Err(Error::MalformedDecision { reason, raw_text }),
                )
            }

            Decision::Invoke {
                tool_name,
                arguments,
            } => {
                info!(step, tool = %tool_name, "invoking tool");
                let outcome = timeout_at(
                    deadline,
                    self.registry.invoke(&tool_name, arguments.clone()),
                )
                .await
                .unwrap_or_else(|_| Err(Error::Timeout(self.config.step_timeout)));

                if let Err(e) = &outcome {
                    warn!(step, tool = %tool_name, "tool step failed: {e}");
                }
                self.record(step, Some(tool_name), arguments, outcome)
            }
        }
    }

    /// Append one entry to the history and return the step's result.
    fn record(
        &mut self,
        step: usize,
        tool: Option<String>,
        arguments: Map<String, serde_json::Value>,
        outcome: Result<String, Error>,
    ) -> StepResult {
        let (observation, failed) = match outcome {
            Ok(output) => (output, false),
            Err(e) => (format!("Error: {e}"), true),
        };

        self.history.push(HistoryEntry {
            step,
            tool,
            arguments,
            observation: observation.clone(),
            failed,
        });

        StepResult::observed(observation)
    }
}

/// The next step's instruction: fresh context plus the original objective.
fn continuation(previous: &str, goal: &str) -> String {
    format!("Previous result: {previous}\nContinue with the original task: {goal}")
}
