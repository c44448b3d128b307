//! Turning raw model text into a [`Decision`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// What the model wants to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// Call a tool. Arguments are passed through untouched.
    Invoke {
        tool_name: String,
        arguments: Map<String, Value>,
    },
    /// The task is finished.
    Complete { summary: String },
    /// The reply did not match either accepted shape.
    Malformed { raw_text: String, reason: String },
}

impl Decision {
    /// Parse a model reply.
    ///
    /// Accepts `{"tool": name, "args": {...}}` or
    /// `{"done": true, "summary": text}`, optionally wrapped in a single
    /// Markdown code fence. Never fails: anything else becomes
    /// [`Decision::Malformed`].
    pub fn parse(raw: &str) -> Self {
        let malformed = |reason: String| Decision::Malformed {
            raw_text: raw.to_string(),
            reason,
        };

        let body = strip_fence(raw.trim());
        let value: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(e) => return malformed(format!("invalid JSON: {e}")),
        };

        let Value::Object(mut object) = value else {
            return malformed("expected a JSON object".to_string());
        };

        if object.get("done").and_then(Value::as_bool) == Some(true) {
            return match object.remove("summary") {
                Some(Value::String(summary)) => Decision::Complete { summary },
                _ => malformed("\"done\" reply is missing a string \"summary\"".to_string()),
            };
        }

        let tool_name = match object.remove("tool") {
            Some(Value::String(name)) if !name.trim().is_empty() => name,
            Some(_) => return malformed("\"tool\" must be a non-empty string".to_string()),
            None => return malformed("expected a \"tool\" or \"done\" key".to_string()),
        };

        let arguments = match object.remove("args") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(arguments)) => arguments,
            Some(other) => {
                return malformed(format!("\"args\" must be an object, got {other}"));
            }
        };

        Decision::Invoke {
            tool_name,
            arguments,
        }
    }

    /// The wire form the model is asked to produce. `None` for malformed
    /// decisions, which have no such form.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Decision::Invoke {
                tool_name,
                arguments,
            } => Some(json!({ "tool": tool_name, "args": arguments })),
            Decision::Complete { summary } => Some(json!({ "done": true, "summary": summary })),
            Decision::Malformed { .. } => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Decision::Complete { .. })
    }
}

/// Remove one surrounding ``` fence (with optional language tag).
fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the language tag line, if any.
    match rest.find('\n') {
        Some(newline) => rest[newline + 1..].trim(),
        None => rest.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_round_trip() {
        let decision = Decision::parse(r#"{"tool":"t","args":{"a":1}}"#);
        let Value::Object(expected) = json!({"a": 1}) else {
            unreachable!()
        };
        assert_eq!(
            decision,
            Decision::Invoke {
                tool_name: "t".into(),
                arguments: expected,
            }
        );
        let wire = decision.to_json().unwrap();
        assert_eq!(Decision::parse(&wire.to_string()), decision);
    }

    #[test]
    fn complete() {
        let decision = Decision::parse(r#"{"done": true, "summary": "No issues found"}"#);
        assert_eq!(
            decision,
            Decision::Complete {
                summary: "No issues found".into()
            }
        );
        assert!(decision.is_complete());
    }

    #[test]
    fn missing_args_means_empty() {
        let decision = Decision::parse(r#"{"tool": "fs.list"}"#);
        assert!(matches!(
            decision,
            Decision::Invoke { ref tool_name, ref arguments } if tool_name == "fs.list" && arguments.is_empty()
        ));
    }

    #[test]
    fn argument_names_pass_through_unchanged() {
        let decision = Decision::parse(r#"{"tool": "x.y", "args": {"Weird-Name": [1, "2"], "n": null}}"#);
        let Decision::Invoke { arguments, .. } = decision else {
            panic!("expected invoke");
        };
        assert_eq!(arguments["Weird-Name"], json!([1, "2"]));
        assert_eq!(arguments["n"], Value::Null);
    }

    #[test]
    fn fenced_reply_is_accepted() {
        let raw = "```json\n{\"done\": true, \"summary\": \"ok\"}\n```";
        assert!(Decision::parse(raw).is_complete());
    }

    #[test]
    fn prose_is_malformed_and_kept_verbatim() {
        let raw = "I think you should...";
        let Decision::Malformed { raw_text, reason } = Decision::parse(raw) else {
            panic!("expected malformed");
        };
        assert_eq!(raw_text, raw);
        assert!(reason.starts_with("invalid JSON"));
    }

    #[test]
    fn done_without_summary_is_malformed() {
        assert!(matches!(
            Decision::parse(r#"{"done": true}"#),
            Decision::Malformed { .. }
        ));
    }

    #[test]
    fn done_false_falls_through_to_tool() {
        let decision = Decision::parse(r#"{"done": false, "tool": "a.b", "args": {}}"#);
        assert!(matches!(decision, Decision::Invoke { .. }));
    }

    #[test]
    fn non_object_args_are_malformed() {
        assert!(matches!(
            Decision::parse(r#"{"tool": "a.b", "args": "code"}"#),
            Decision::Malformed { .. }
        ));
    }

    #[test]
    fn neither_shape_is_malformed() {
        for raw in [r#"[1, 2]"#, r#"{"action": "x"}"#, r#"{"tool": ""}"#, ""] {
            assert!(
                matches!(Decision::parse(raw), Decision::Malformed { .. }),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn malformed_has_no_wire_form() {
        assert!(Decision::parse("nope").to_json().is_none());
    }
}
