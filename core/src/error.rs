/// Every way a tool invocation can fail before a payload reaches the agent.
///
/// The `Display` output is the human/agent-readable message that ends up in
/// the `Error: <message>` text segment, so keep it self-contained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// Base URL or token missing or unusable.
    #[error("{message}")]
    Configuration { message: String },
    /// Tool name not in the catalog.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    /// Arguments did not match the tool's input schema.
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },
    /// The HTTP layer failed (connect, timeout, status, undecodable body).
    #[error("{0}")]
    Transport(String),
    /// Matomo answered with `{"result": "error"}`.
    #[error("Matomo API error: {0}")]
    RemoteApi(String),
}

impl ToolError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ToolError::Configuration {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn missing_field(field: &str) -> Self {
        Self::validation(field, format!("Missing required field '{field}'"))
    }

    pub fn code(&self) -> &'static str {
        match self {
            ToolError::Configuration { .. } => codes::CONFIGURATION_MISSING,
            ToolError::UnknownTool(_) => codes::UNKNOWN_TOOL,
            ToolError::Validation { .. } => codes::VALIDATION_FAILED,
            ToolError::Transport(_) => codes::TRANSPORT_ERROR,
            ToolError::RemoteApi(_) => codes::REMOTE_API_ERROR,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            ToolError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}

/// Error codes used across the tool surface
pub mod codes {
    pub const CONFIGURATION_MISSING: &str = "configuration_missing";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const TRANSPORT_ERROR: &str = "transport_error";
    pub const REMOTE_API_ERROR: &str = "remote_api_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_api_error_message_is_prefixed() {
        let err = ToolError::RemoteApi("Invalid authentication token".to_string());
        assert_eq!(
            err.to_string(),
            "Matomo API error: Invalid authentication token"
        );
        assert_eq!(err.code(), codes::REMOTE_API_ERROR);
    }

    #[test]
    fn missing_field_names_the_field() {
        let err = ToolError::missing_field("site_id");
        assert_eq!(err.to_string(), "Missing required field 'site_id'");
        assert_eq!(err.field(), Some("site_id"));
    }
}
