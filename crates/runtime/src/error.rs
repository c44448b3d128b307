use std::time::Duration;

use thiserror::Error;

use crate::model::ModelError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The session could not be established or the handshake failed.
    #[error("failed to connect session '{session}': {source}")]
    Connection {
        session: String,
        #[source]
        source: mcp::Error,
    },

    /// The session advertised a catalog the registry cannot index.
    #[error("malformed tool catalog from session '{session}': {reason}")]
    Discovery { session: String, reason: String },

    #[error("session '{0}' is already connected")]
    DuplicateSession(String),

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool {tool} failed: {source}")]
    ToolExecution {
        tool: String,
        #[source]
        source: mcp::Error,
    },

    #[error("could not parse model decision ({reason}): {raw_text}")]
    MalformedDecision { reason: String, raw_text: String },

    #[error("step timed out after {0:?}")]
    Timeout(Duration),

    #[error("completion failed: {0}")]
    Completion(#[from] ModelError),

    #[error("failed to read resource {uri}: {reason}")]
    Resource { uri: String, reason: String },

    /// Every failure collected while releasing sessions.
    #[error("{} session(s) failed to shut down: {}", .0.len(), join_failures(.0))]
    Disconnect(Vec<(String, mcp::Error)>),

    #[error("config error: {0}")]
    Config(String),
}

fn join_failures(failures: &[(String, mcp::Error)]) -> String {
    failures
        .iter()
        .map(|(session, e)| format!("{session}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
