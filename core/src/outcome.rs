use serde_json::Value;

use crate::error::ToolError;

/// What every tool invocation produces, whichever way it went.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success { payload: Value },
    Failure { message: String },
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Failure { .. })
    }

    /// The single text segment handed back to the agent: pretty JSON for a
    /// payload, `Error: <message>` otherwise.
    pub fn to_text(&self) -> String {
        match self {
            ToolOutcome::Success { payload } => to_pretty_json(payload),
            ToolOutcome::Failure { message } => format!("Error: {message}"),
        }
    }
}

impl From<Result<Value, ToolError>> for ToolOutcome {
    fn from(result: Result<Value, ToolError>) -> Self {
        match result {
            Ok(payload) => ToolOutcome::Success { payload },
            Err(err) => ToolOutcome::Failure {
                message: err.to_string(),
            },
        }
    }
}

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_renders_two_space_indented_json() {
        let outcome = ToolOutcome::from(Ok::<_, ToolError>(json!({"nb_visits": 100})));
        assert!(!outcome.is_error());
        assert_eq!(outcome.to_text(), "{\n  \"nb_visits\": 100\n}");
    }

    #[test]
    fn scalar_and_array_payloads_pass_through() {
        let outcome = ToolOutcome::from(Ok::<_, ToolError>(json!([{"label": "Chrome"}])));
        assert_eq!(
            outcome.to_text(),
            "[\n  {\n    \"label\": \"Chrome\"\n  }\n]"
        );
        assert_eq!(ToolOutcome::from(Ok::<_, ToolError>(json!(42))).to_text(), "42");
    }

    #[test]
    fn failure_renders_error_line() {
        let outcome = ToolOutcome::from(Err::<Value, _>(ToolError::UnknownTool("nope".to_string())));
        assert!(outcome.is_error());
        assert_eq!(outcome.to_text(), "Error: Unknown tool: nope");
    }
}
