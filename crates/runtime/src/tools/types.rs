//! Tool-related types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator between the session id and the tool's own name.
pub const QUALIFIER: char = '.';

/// A discovered tool, addressed by its qualified name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// `session_id.tool_name`, unique across the registry.
    pub name: String,
    /// Session that hosts the tool.
    pub session: String,
    /// The tool's name as its session knows it.
    pub tool_name: String,
    pub description: String,
    /// JSON Schema for the arguments. Advisory only.
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(session: &str, tool: mcp::Tool) -> Self {
        Self {
            name: qualify(session, &tool.name),
            session: session.to_string(),
            tool_name: tool.name,
            description: tool.description.unwrap_or_default(),
            input_schema: tool.input_schema,
        }
    }

    /// Argument properties declared by the schema, or an empty object.
    pub fn parameters(&self) -> Value {
        self.input_schema
            .get("properties")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    /// Names of required arguments.
    pub fn required(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Build a qualified tool name.
pub fn qualify(session: &str, tool: &str) -> String {
    format!("{session}{QUALIFIER}{tool}")
}
