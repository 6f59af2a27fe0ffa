//! Core data models for the agent loop

use crate::error::RunError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Argument key every tool call carries
pub const QUERY_ARGUMENT: &str = "query";

//
// ================= Tool Calls =================
//

pub type ToolArguments = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub tool_name: String,
    pub arguments: ToolArguments,
}

impl ToolCallRequest {
    pub fn with_query(tool_name: impl Into<String>, query: impl Into<String>) -> Self {
        let mut arguments = ToolArguments::new();
        arguments.insert(QUERY_ARGUMENT.to_string(), query.into());
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.arguments.get(QUERY_ARGUMENT).map(String::as_str)
    }
}

/// Tagged result of one model invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    FinalAnswer { text: String },
    ToolCall(ToolCallRequest),
}

//
// ================= Conversation =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    User {
        text: String,
    },
    Assistant {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_call: Option<ToolCallRequest>,
    },
    ToolResult {
        tool_name: String,
        text: String,
    },
    Error {
        reason: RunError,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Turn::Assistant {
            text: text.into(),
            tool_call: None,
        }
    }

    /// Display text of the turn
    pub fn text(&self) -> String {
        match self {
            Turn::User { text } | Turn::Assistant { text, .. } | Turn::ToolResult { text, .. } => {
                text.clone()
            }
            Turn::Error { reason } => reason.to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Turn::Assistant {
                tool_call: None,
                ..
            } | Turn::Error { .. }
        )
    }
}

/// Append-only turn sequence owned by a single run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::user(question)],
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Text of the last assistant or error turn
    pub fn final_answer(&self) -> Option<String> {
        self.turns
            .iter()
            .rev()
            .find(|turn| matches!(turn, Turn::Assistant { .. } | Turn::Error { .. }))
            .map(Turn::text)
    }
}

//
// ================= Final Result =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub final_answer: String,
    pub turn_count: usize,
    pub model_calls: usize,
    pub tool_calls: usize,
    pub succeeded: bool,
    pub conversation: Conversation,
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Turn::User { text } => write!(f, "User: {}", text),
            Turn::Assistant {
                text,
                tool_call: Some(call),
            } => write!(f, "Assistant: {} [{}]", text, call.tool_name),
            Turn::Assistant { text, .. } => write!(f, "Assistant: {}", text),
            Turn::ToolResult { tool_name, text } => {
                write!(f, "Tool Result ({}): {}", tool_name, text)
            }
            Turn::Error { reason } => write!(f, "Error: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_answer_prefers_last_assistant_or_error() {
        let mut conversation = Conversation::new("Which product sold best?");
        assert_eq!(conversation.final_answer(), None);

        conversation.push(Turn::Assistant {
            text: "I'll use the sales tool.".to_string(),
            tool_call: Some(ToolCallRequest::with_query("sales", "best product")),
        });
        conversation.push(Turn::ToolResult {
            tool_name: "sales".to_string(),
            text: "Widget A.".to_string(),
        });
        conversation.push(Turn::Error {
            reason: RunError::TurnLimitExceeded,
        });

        assert_eq!(conversation.final_answer().as_deref(), Some("turn limit exceeded"));
        assert!(conversation.last().unwrap().is_terminal());
    }

    #[test]
    fn test_turn_serialization_tags_role() {
        let turn = Turn::ToolResult {
            tool_name: "sales".to_string(),
            text: "Widget A.".to_string(),
        };
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "tool_result");
        assert_eq!(json["tool_name"], "sales");
    }

    #[test]
    fn test_tool_call_query_argument() {
        let call = ToolCallRequest::with_query("sales", "best product 2025");
        assert_eq!(call.query(), Some("best product 2025"));
    }
}
