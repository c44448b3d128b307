//! Prompt rendering.

use crate::history::History;
use crate::tools::ToolDescriptor;

/// Render the full decision prompt.
///
/// Pure and deterministic: the same goal, history and catalog always give
/// the same text.
pub fn render_prompt(goal: &str, history: &History, catalog: &[ToolDescriptor]) -> String {
    format!(
        "You are an assistant with access to these tools:\n\
         \n\
         {tools}\n\
         \n\
         Based on the user request and the history so far, decide which tool to use next.\n\
         Reply ONLY with JSON: {{\"tool\": \"tool_name\", \"args\": {{...}}}}\n\
         The \"tool\" value must be one of the tool names listed above, exactly as written.\n\
         The \"args\" object must use the exact parameter names shown for that tool.\n\
         If the task is complete, reply ONLY with: {{\"done\": true, \"summary\": \"what was accomplished\"}}\n\
         \n\
         History:\n\
         {history}\n\
         \n\
         User request: {goal}\n",
        tools = render_catalog(catalog),
        history = history.render(),
    )
}

/// One block per tool: name, description, parameters, required list.
pub fn render_catalog(catalog: &[ToolDescriptor]) -> String {
    if catalog.is_empty() {
        return "(no tools available)".to_string();
    }

    catalog
        .iter()
        .map(|tool| {
            let mut block = format!(
                "tool: {}\ndescription: {}\nparameters: {}",
                tool.name,
                tool.description,
                tool.parameters()
            );
            let required = tool.required();
            if !required.is_empty() {
                block.push_str(&format!("\nrequired: {}", required.join(", ")));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryEntry;
    use serde_json::{Map, json};

    fn catalog() -> Vec<ToolDescriptor> {
        vec![ToolDescriptor::new(
            "analyze",
            mcp::Tool {
                name: "analyze_code".into(),
                description: Some("Analyze Python code".into()),
                input_schema: json!({
                    "type": "object",
                    "properties": {"code": {"type": "string"}},
                    "required": ["code"]
                }),
            },
        )]
    }

    #[test]
    fn catalog_block() {
        assert_eq!(
            render_catalog(&catalog()),
            "tool: analyze.analyze_code\n\
             description: Analyze Python code\n\
             parameters: {\"code\":{\"type\":\"string\"}}\n\
             required: code"
        );
    }

    #[test]
    fn empty_catalog() {
        assert_eq!(render_catalog(&[]), "(no tools available)");
    }

    #[test]
    fn prompt_orders_catalog_history_goal() {
        let mut history = History::new();
        history.push(HistoryEntry {
            step: 1,
            tool: Some("analyze.analyze_code".into()),
            arguments: Map::new(),
            observation: "looks fine".into(),
            failed: false,
        });

        let prompt = render_prompt("Review sample.py", &history, &catalog());
        let tools_at = prompt.find("tool: analyze.analyze_code").unwrap();
        let history_at = prompt.find("1. I used tool").unwrap();
        let goal_at = prompt.find("User request: Review sample.py").unwrap();
        assert!(tools_at < history_at && history_at < goal_at);
        assert!(prompt.contains(r#"{"tool": "tool_name", "args": {...}}"#));
    }

    #[test]
    fn prompt_is_deterministic() {
        let history = History::new();
        assert_eq!(
            render_prompt("g", &history, &catalog()),
            render_prompt("g", &history, &catalog())
        );
        assert!(render_prompt("g", &history, &[]).contains("No history yet"));
    }
}
