//! Tiller runtime: tool registry, decision engine and agent loop.
//!
//! This crate provides the core of a minimal agent: discover tools hosted by
//! MCP servers, ask a language model which one to call next, call it, and
//! repeat until the model says it is done or the step budget runs out.
//!
//! # Overview
//!
//! The runtime is organized around these concepts:
//!
//! - **ToolRegistry**: indexes the tools of many tool sessions under
//!   qualified `session.tool` names and dispatches calls to their owner.
//! - **DecisionEngine**: renders the prompt, calls the completion service
//!   once, and parses the reply into a [`Decision`].
//! - **Agent**: the think/act loop that folds every step, failed or not,
//!   into the history the model sees next.
//! - **Completion**: a text-in, text-out trait over LLM providers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mcp::ServerConfig;
//! use runtime::{Agent, AgentConfig, AnthropicCompletion, ApiKey, ToolRegistry};
//!
//! # async fn example() -> runtime::Result<()> {
//! let registry = Arc::new(ToolRegistry::stdio());
//! let config = ServerConfig::from_script("analyze", "code_review_mcp_server.py")
//!     .map_err(|e| runtime::Error::Config(e.to_string()))?;
//! registry.connect("analyze", &config).await?;
//!
//! let completion = AnthropicCompletion::builder(ApiKey::new("sk-ant-api01-...")).build();
//! let mut agent = Agent::new(Arc::new(completion), registry.clone(), AgentConfig::default());
//!
//! let outcome = agent.run("Review the code in sample.py and report any issues.").await;
//! println!("{}", outcome.message());
//!
//! registry.disconnect_all().await?;
//! # Ok(())
//! # }
//! ```

mod agent;
mod decision;
mod error;
mod history;
pub mod model;
mod providers;
pub mod tools;

// Agent loop
pub use agent::{Agent, AgentConfig, AgentState, RunOutcome, StepResult};

// Decision engine
pub use decision::{Decision, DecisionEngine, render_catalog, render_prompt};

// Error types
pub use error::{Error, Result};

// History
pub use history::{History, HistoryEntry};

// Completion services
pub use model::{ApiKey, Completion, ModelError};
pub use providers::{
    AnthropicCompletion, AnthropicCompletionBuilder, OpenAiCompletion, ScriptedCompletion,
};

// Tool registry
pub use tools::{
    Connector, NO_OUTPUT, StdioConnector, ToolDescriptor, ToolRegistry, ToolSession,
};
