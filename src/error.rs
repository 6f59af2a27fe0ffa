//! Error types for the analyst agent

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for setup and surface operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Faults raised while wiring the agent together. A running agent loop
/// never returns one of these; it folds failures into the conversation.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failure of a single tool invocation.
///
/// The display strings are addressed to the model: they become the text of
/// the tool-result turn that replaces the missing answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Error: API returned status {code}")]
    BackendStatus { code: u16 },

    #[error("Tool call timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Request failed: {message}")]
    Transport { message: String },

    #[error("The analyst tool ran successfully but returned no text data.")]
    EmptyResponse,
}

/// Conditions that end a run with an error turn instead of an answer.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RunError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("turn limit exceeded")]
    TurnLimitExceeded,
}

/// Completion backend faults, caught by the model adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend returned status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("backend request failed: {0}")]
    Transport(String),

    #[error("backend response could not be decoded: {0}")]
    Decode(String),
}

const PLAN_LIMITATION_MARKER: &str = "Trial accounts are not allowed";

impl BackendError {
    /// True when the backend refused the call because of the account plan
    pub fn is_plan_limitation(&self) -> bool {
        match self {
            BackendError::Status { message, .. } => message.contains(PLAN_LIMITATION_MARKER),
            BackendError::Transport(message) | BackendError::Decode(message) => {
                message.contains(PLAN_LIMITATION_MARKER)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_limit_display() {
        assert_eq!(RunError::TurnLimitExceeded.to_string(), "turn limit exceeded");
    }

    #[test]
    fn test_plan_limitation_detection() {
        let err = BackendError::Status {
            code: 422,
            message: "Trial accounts are not allowed to call COMPLETE".to_string(),
        };
        assert!(err.is_plan_limitation());

        let other = BackendError::Transport("connection reset".to_string());
        assert!(!other.is_plan_limitation());
    }

    #[test]
    fn test_run_error_serialization() {
        let json = serde_json::to_value(RunError::UnknownTool("weather".into())).unwrap();
        assert_eq!(json["kind"], "unknown_tool");
        assert_eq!(json["detail"], "weather");
    }
}
