//! Completion-service adapters.
//!
//! Each provider implements [`Completion`](crate::model::Completion) for its
//! specific API.

mod anthropic;
mod openai;
mod scripted;

pub use anthropic::{AnthropicCompletion, AnthropicCompletionBuilder};
pub use openai::OpenAiCompletion;
pub use scripted::ScriptedCompletion;
