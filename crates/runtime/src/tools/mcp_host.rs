//! Stdio MCP servers as tool sessions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcp::{CallToolResult, ReadResourceResult, Resource, Server, ServerConfig, Tool};
use serde_json::{Map, Value};
use tracing::warn;

use super::{Connector, ToolSession};

#[async_trait]
impl ToolSession for Server {
    async fn list_tools(&self) -> mcp::Result<Vec<Tool>> {
        self.refresh_tools().await?;
        Ok(self.tools().await)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> mcp::Result<CallToolResult> {
        Server::call_tool(self, name, Some(Value::Object(arguments))).await
    }

    async fn list_resources(&self) -> mcp::Result<Vec<Resource>> {
        Server::list_resources(self).await
    }

    async fn read_resource(&self, uri: &str) -> mcp::Result<ReadResourceResult> {
        Server::read_resource(self, uri).await
    }

    async fn shutdown(&self) -> mcp::Result<()> {
        Server::shutdown(self).await
    }
}

/// Spawns a child process per session and performs the MCP handshake.
#[derive(Debug, Clone)]
pub struct StdioConnector {
    request_timeout: Duration,
}

impl StdioConnector {
    pub fn new() -> Self {
        Self {
            request_timeout: mcp::DEFAULT_TIMEOUT,
        }
    }

    /// Per-request timeout applied to every spawned server.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

impl Default for StdioConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for StdioConnector {
    async fn connect(&self, config: &ServerConfig) -> mcp::Result<Arc<dyn ToolSession>> {
        let server = Server::spawn(config.clone())
            .await?
            .with_timeout(self.request_timeout);

        if let Err(e) = server.initialize().await {
            if let Err(shutdown) = server.shutdown().await {
                warn!(server = %config.name, "failed to stop server after handshake failure: {shutdown}");
            }
            return Err(e);
        }

        Ok(Arc::new(server))
    }
}
