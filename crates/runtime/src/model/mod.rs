//! Completion-service boundary.
//!
//! The agent never talks to a provider API directly: it hands a finished
//! prompt to a [`Completion`] and gets raw text back. Turning that text into
//! structure is the decision engine's job.

pub mod errors;

pub use errors::ModelError;

use async_trait::async_trait;

/// Text-in, text-out completion service.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Complete `prompt` with the given model.
    async fn complete(&self, model_id: &str, prompt: &str) -> Result<String, ModelError>;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

/// A provider credential, resolved once at startup and passed in explicitly.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw secret, for request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}
