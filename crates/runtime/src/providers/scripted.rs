//! Deterministic completion for tests and dry runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::model::{Completion, ModelError};

/// A pre-scripted completion service.
///
/// Each call pops the next canned response. Every prompt it receives is
/// recorded so tests can inspect exactly what the model would have seen.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    /// Build from successful responses, returned in order.
    pub fn new(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a provider failure as the next response.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.lock_responses().push_back(Err(message.into()));
        self
    }

    /// Queue a successful response.
    pub fn then_respond(self, response: impl Into<String>) -> Self {
        self.lock_responses().push_back(Ok(response.into()));
        self
    }

    /// Number of completed calls.
    pub fn calls(&self) -> usize {
        self.lock_prompts().len()
    }

    /// Every prompt received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.lock_prompts().clone()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        self.responses.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_prompts(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(&self, _model_id: &str, prompt: &str) -> Result<String, ModelError> {
        let call = {
            let mut prompts = self.lock_prompts();
            prompts.push(prompt.to_string());
            prompts.len()
        };

        match self.lock_responses().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ModelError::Api(message)),
            None => Err(ModelError::Script(call - 1)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
