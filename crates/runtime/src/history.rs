//! Append-only step history for one run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One completed step, as the model will see it on later steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// 1-based step number.
    pub step: usize,
    /// Qualified tool name, if the step got as far as choosing one.
    pub tool: Option<String>,
    pub arguments: Map<String, Value>,
    /// Tool output, or the error text when the step failed.
    pub observation: String,
    pub failed: bool,
}

impl std::fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.tool {
            Some(tool) => {
                let args = Value::Object(self.arguments.clone());
                write!(
                    f,
                    "I used tool {tool} with args {args}. Result: {}",
                    self.observation
                )
            }
            None => write!(f, "No tool was used. Result: {}", self.observation),
        }
    }
}

/// Ordered record of completed steps.
///
/// Entries are only ever appended; the agent clears the history when a new
/// top-level run starts.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Numbered list, oldest first.
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return "No history yet".to_string();
        }
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| format!("{}. {entry}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
