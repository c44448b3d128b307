//! Decision engine: prompt in, structured decision out.

mod parse;
mod prompt;

pub use parse::Decision;
pub use prompt::{render_catalog, render_prompt};

use std::sync::Arc;

use tracing::debug;

use crate::history::History;
use crate::model::{Completion, ModelError};
use crate::tools::ToolDescriptor;

/// Asks the completion service what to do next.
///
/// Exactly one completion call per [`decide`](Self::decide); no retries and
/// no schema validation of the arguments the model picks.
#[derive(Clone)]
pub struct DecisionEngine {
    completion: Arc<dyn Completion>,
    model: String,
}

impl DecisionEngine {
    pub fn new(completion: Arc<dyn Completion>, model: impl Into<String>) -> Self {
        Self {
            completion,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Decide the next action for `goal` given the history and catalog.
    ///
    /// Unparseable replies come back as [`Decision::Malformed`]; only a
    /// failure of the completion call itself is an error.
    pub async fn decide(
        &self,
        goal: &str,
        history: &History,
        catalog: &[ToolDescriptor],
    ) -> Result<Decision, ModelError> {
        let prompt = render_prompt(goal, history, catalog);
        debug!(provider = self.completion.name(), model = %self.model, %prompt, "requesting decision");

        let raw = self.completion.complete(&self.model, &prompt).await?;
        debug!(%raw, "model replied");

        Ok(Decision::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedCompletion;

    #[tokio::test]
    async fn one_call_per_decision() {
        let completion = Arc::new(ScriptedCompletion::new([
            r#"{"tool": "fs.read", "args": {"path": "a"}}"#,
        ]));
        let engine = DecisionEngine::new(completion.clone(), "test-model");

        let decision = engine.decide("read a", &History::new(), &[]).await.unwrap();
        assert!(matches!(decision, Decision::Invoke { ref tool_name, .. } if tool_name == "fs.read"));
        assert_eq!(completion.calls(), 1);
        assert!(completion.prompts()[0].contains("User request: read a"));
    }

    #[tokio::test]
    async fn completion_failure_is_an_error_not_malformed() {
        let completion = Arc::new(ScriptedCompletion::default().then_fail("503"));
        let engine = DecisionEngine::new(completion, "test-model");

        let err = engine.decide("x", &History::new(), &[]).await.unwrap_err();
        assert!(matches!(err, ModelError::Api(_)));
    }
}
