//! Tool registry: one flat, qualified namespace over many tool sessions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mcp::{CallToolResult, Resource, ServerConfig, ToolContent};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{Connector, QUALIFIER, StdioConnector, ToolDescriptor, ToolSession};
use crate::{Error, Result};

/// Returned when a tool succeeds without producing any content.
pub const NO_OUTPUT: &str = "Tool executed successfully (no output)";

struct Entry {
    descriptor: ToolDescriptor,
    session: Arc<dyn ToolSession>,
}

#[derive(Default)]
struct Inner {
    /// Sessions in connection order.
    sessions: Vec<(String, Arc<dyn ToolSession>)>,
    /// Tools in discovery order.
    tools: Vec<Entry>,
    /// Qualified name to position in `tools`.
    index: HashMap<String, usize>,
}

impl Inner {
    fn has_session(&self, id: &str) -> bool {
        self.sessions.iter().any(|(name, _)| name == id)
    }

    fn session(&self, id: &str) -> Option<&Arc<dyn ToolSession>> {
        self.sessions
            .iter()
            .find(|(name, _)| name == id)
            .map(|(_, session)| session)
    }

    fn lookup(&self, qualified: &str) -> Option<&Entry> {
        self.index.get(qualified).map(|&i| &self.tools[i])
    }

    fn reindex(&mut self) {
        self.index = self
            .tools
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.descriptor.name.clone(), i))
            .collect();
    }

    /// Drop a session and every tool it hosts in one step.
    fn remove_session(&mut self, id: &str) -> Option<Arc<dyn ToolSession>> {
        let position = self.sessions.iter().position(|(name, _)| name == id)?;
        let (_, session) = self.sessions.remove(position);
        self.tools.retain(|entry| entry.descriptor.session != id);
        self.reindex();
        Some(session)
    }
}

/// Aggregates tool sessions and dispatches invocations to their owner.
///
/// The registry indexes sessions but does not decide how they are
/// established; that is the [`Connector`]'s job. Connect and disconnect take
/// the write lock, so they never interleave with lookups or in-flight
/// invocations.
pub struct ToolRegistry {
    connector: Arc<dyn Connector>,
    inner: RwLock<Inner>,
}

impl ToolRegistry {
    /// Create an empty registry that establishes sessions through `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Create an empty registry that spawns stdio MCP servers.
    pub fn stdio() -> Self {
        Self::new(Arc::new(StdioConnector::new()))
    }

    /// Establish a session, discover its tools, and index them as
    /// `session_id.tool_name`.
    pub async fn connect(&self, session_id: &str, config: &ServerConfig) -> Result<()> {
        validate_session_id(session_id)?;
        if self.inner.read().await.has_session(session_id) {
            return Err(Error::DuplicateSession(session_id.to_string()));
        }

        info!(session = session_id, command = %config.command, "connecting tool session");
        let session = self
            .connector
            .connect(config)
            .await
            .map_err(|source| Error::Connection {
                session: session_id.to_string(),
                source,
            })?;

        self.attach(session_id, session).await
    }

    /// Discover and index the tools of an already established session.
    ///
    /// On failure the session is shut down before the error is returned.
    pub async fn attach(&self, session_id: &str, session: Arc<dyn ToolSession>) -> Result<()> {
        let discovered = match discover(session_id, session.as_ref()).await {
            Ok(tools) => tools,
            Err(e) => {
                release(session_id, session.as_ref()).await;
                return Err(e);
            }
        };

        let mut inner = self.inner.write().await;
        if inner.has_session(session_id) {
            drop(inner);
            release(session_id, session.as_ref()).await;
            return Err(Error::DuplicateSession(session_id.to_string()));
        }

        let count = discovered.len();
        for descriptor in discovered {
            let position = inner.tools.len();
            inner.index.insert(descriptor.name.clone(), position);
            inner.tools.push(Entry {
                descriptor,
                session: Arc::clone(&session),
            });
        }
        inner.sessions.push((session_id.to_string(), session));

        info!(session = session_id, tools = count, "tool session connected");
        Ok(())
    }

    /// All tools, in the order they were discovered.
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        let inner = self.inner.read().await;
        inner
            .tools
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Get a tool by qualified name.
    pub async fn get(&self, qualified_name: &str) -> Option<ToolDescriptor> {
        let inner = self.inner.read().await;
        inner
            .lookup(qualified_name)
            .map(|entry| entry.descriptor.clone())
    }

    /// Ids of connected sessions, in connection order.
    pub async fn session_ids(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner.sessions.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Number of indexed tools.
    pub async fn len(&self) -> usize {
        self.inner.read().await.tools.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Invoke a tool by qualified name and render its output as text.
    ///
    /// Unknown names fail before any session is contacted. Failures are not
    /// retried here.
    pub async fn invoke(&self, qualified_name: &str, arguments: Map<String, Value>) -> Result<String> {
        let inner = self.inner.read().await;
        let entry = inner
            .lookup(qualified_name)
            .ok_or_else(|| Error::UnknownTool(qualified_name.to_string()))?;

        debug!(tool = qualified_name, "invoking tool");
        let result = entry
            .session
            .call_tool(&entry.descriptor.tool_name, arguments)
            .await
            .map_err(|source| Error::ToolExecution {
                tool: qualified_name.to_string(),
                source,
            })?;

        if result.is_error {
            return Err(Error::ToolExecution {
                tool: qualified_name.to_string(),
                source: mcp::Error::ToolCallFailed(result.joined_text()),
            });
        }

        Ok(render_content(&result))
    }

    /// Resources advertised by every session, tagged with the session id.
    ///
    /// Sessions that fail to list are skipped with a warning.
    pub async fn list_resources(&self) -> Vec<(String, Resource)> {
        let inner = self.inner.read().await;
        let mut all = Vec::new();
        for (id, session) in &inner.sessions {
            match session.list_resources().await {
                Ok(resources) => all.extend(resources.into_iter().map(|r| (id.clone(), r))),
                Err(e) => warn!(session = %id, "failed to list resources: {e}"),
            }
        }
        all
    }

    /// Read a resource from one session and return its text.
    pub async fn read_resource(&self, session_id: &str, uri: &str) -> Result<String> {
        let inner = self.inner.read().await;
        let session = inner
            .session(session_id)
            .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;

        let result = session
            .read_resource(uri)
            .await
            .map_err(|e| Error::Resource {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;

        let text = result
            .contents
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text)
    }

    /// Remove one session and all of its tools, then release it.
    pub async fn disconnect(&self, session_id: &str) -> Result<()> {
        let session = self
            .inner
            .write()
            .await
            .remove_session(session_id)
            .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;

        info!(session = session_id, "disconnecting tool session");
        session
            .shutdown()
            .await
            .map_err(|e| Error::Disconnect(vec![(session_id.to_string(), e)]))
    }

    /// Release every session and clear the registry.
    ///
    /// Every session is shut down even if some fail; all failures are
    /// reported together. The registry is empty afterwards either way.
    pub async fn disconnect_all(&self) -> Result<()> {
        let sessions = {
            let mut inner = self.inner.write().await;
            let sessions = std::mem::take(&mut inner.sessions);
            inner.tools.clear();
            inner.index.clear();
            sessions
        };

        if sessions.is_empty() {
            return Ok(());
        }

        info!(sessions = sessions.len(), "disconnecting all tool sessions");
        let mut failures = Vec::new();
        for (id, session) in sessions {
            if let Err(e) = session.shutdown().await {
                warn!(session = %id, "shutdown failed: {e}");
                failures.push((id, e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Disconnect(failures))
        }
    }
}

fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() || session_id.contains(QUALIFIER) {
        return Err(Error::Config(format!(
            "invalid session id '{session_id}': must be non-empty and contain no '{QUALIFIER}'"
        )));
    }
    Ok(())
}

async fn discover(session_id: &str, session: &dyn ToolSession) -> Result<Vec<ToolDescriptor>> {
    validate_session_id(session_id)?;

    let tools = session
        .list_tools()
        .await
        .map_err(|source| Error::Connection {
            session: session_id.to_string(),
            source,
        })?;

    let mut seen = HashSet::new();
    let mut descriptors = Vec::with_capacity(tools.len());
    for (position, tool) in tools.into_iter().enumerate() {
        if tool.name.trim().is_empty() {
            return Err(Error::Discovery {
                session: session_id.to_string(),
                reason: format!("tool #{position} has no name"),
            });
        }
        if !seen.insert(tool.name.clone()) {
            return Err(Error::Discovery {
                session: session_id.to_string(),
                reason: format!("tool '{}' is listed twice", tool.name),
            });
        }
        descriptors.push(ToolDescriptor::new(session_id, tool));
    }
    Ok(descriptors)
}

async fn release(session_id: &str, session: &dyn ToolSession) {
    if let Err(e) = session.shutdown().await {
        warn!(session = session_id, "failed to release session: {e}");
    }
}

/// Render tool output as a single observation string.
pub fn render_content(result: &CallToolResult) -> String {
    if result.content.is_empty() {
        return NO_OUTPUT.to_string();
    }

    result
        .content
        .iter()
        .map(|item| match item {
            ToolContent::Text { text } => text.clone(),
            ToolContent::Image { mime_type, .. } => format!("[image: {mime_type}]"),
            ToolContent::Resource { resource } => match &resource.text {
                Some(text) => text.clone(),
                None => format!("[resource: {}]", resource.uri),
            },
            ToolContent::Unknown => "[unsupported content]".to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
