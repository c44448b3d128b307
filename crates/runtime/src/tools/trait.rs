//! Tool session seams.

use async_trait::async_trait;
use mcp::{CallToolResult, ReadResourceResult, Resource, ServerConfig, Tool};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A live channel to one tool-hosting process.
///
/// This is the boundary between the registry and side effects; the registry
/// only indexes sessions and never decides how they talk to their process.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Discover the tools this session hosts.
    async fn list_tools(&self) -> mcp::Result<Vec<Tool>>;

    /// Invoke a tool by its bare (unqualified) name.
    async fn call_tool(&self, name: &str, arguments: Map<String, Value>)
    -> mcp::Result<CallToolResult>;

    /// List resources exposed by the hosting process.
    async fn list_resources(&self) -> mcp::Result<Vec<Resource>>;

    /// Read one resource by `scheme://path` identifier.
    async fn read_resource(&self, uri: &str) -> mcp::Result<ReadResourceResult>;

    /// Release the session. Must tolerate repeated calls.
    async fn shutdown(&self) -> mcp::Result<()>;
}

/// Establishes tool sessions from transport parameters.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ServerConfig) -> mcp::Result<Arc<dyn ToolSession>>;
}
