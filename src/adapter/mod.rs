//! Model adapter
//!
//! Turns a conversation into a single completion prompt and the completion
//! back into a [`ModelReply`]. Tool delegation is requested by the model
//! through two marker lines:
//!
//! ```text
//! TOOL_CALL: <tool_name>
//! QUERY: <the query to pass to the tool>
//! ```
//!
//! Backend failures never escape: they become a final answer that explains
//! the failure.

use crate::error::BackendError;
use crate::models::{Conversation, ModelReply, ToolCallRequest, Turn};
use crate::normalizer::preview;
use crate::tools::ToolDescriptor;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

mod scripted;
pub use scripted::ScriptedBackend;

const TOOL_CALL_MARKER: &str = "TOOL_CALL:";
const QUERY_MARKER: &str = "QUERY:";

const NO_RESPONSE: &str = "No response from model";
const PLAN_LIMITATION_MESSAGE: &str =
    "Error: Trial account limitation. Please upgrade to a paid account.";

/// How a prompt must be escaped before it reaches the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptEscaping {
    None,
    /// Single-quoted SQL string literal (quotes doubled, backslashes escaped)
    SqlLiteral,
}

impl PromptEscaping {
    pub fn apply(self, text: &str) -> String {
        match self {
            PromptEscaping::None => text.to_string(),
            PromptEscaping::SqlLiteral => text.replace('\\', "\\\\").replace('\'', "''"),
        }
    }
}

/// Trait for the text completion service (LLM controlled)
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, BackendError>;

    fn escaping(&self) -> PromptEscaping {
        PromptEscaping::None
    }
}

pub struct ModelAdapter {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    tools: Vec<ToolDescriptor>,
}

impl ModelAdapter {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        model: impl Into<String>,
        tools: Vec<ToolDescriptor>,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            tools,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub async fn complete(&self, conversation: &Conversation) -> ModelReply {
        let prompt = render_prompt(conversation, &self.tools);
        let encoded = self.backend.escaping().apply(&prompt);

        info!(
            model = %self.model,
            turns = conversation.len(),
            tools = self.tools.len(),
            "Calling model"
        );

        match self.backend.complete(&self.model, &encoded).await {
            Ok(raw) if raw.trim().is_empty() => {
                warn!("Model returned an empty completion");
                ModelReply::FinalAnswer {
                    text: NO_RESPONSE.to_string(),
                }
            }
            Ok(raw) => {
                debug!(response = %preview(&raw, 200), "Model responded");
                parse_reply(&raw)
            }
            Err(e) => {
                warn!(error = %e, "Model call failed");
                ModelReply::FinalAnswer {
                    text: failure_message(&e),
                }
            }
        }
    }
}

/// Render the conversation as labelled lines, preceded by the tool catalog
/// and directive format when tools are available.
pub fn render_prompt(conversation: &Conversation, tools: &[ToolDescriptor]) -> String {
    let transcript = conversation
        .turns()
        .iter()
        .filter_map(|turn| match turn {
            Turn::User { text } => Some(format!("User: {}", text)),
            Turn::Assistant { text, .. } => Some(format!("Assistant: {}", text)),
            Turn::ToolResult { text, .. } => Some(format!("Tool Result: {}", text)),
            Turn::Error { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    if tools.is_empty() {
        return transcript;
    }

    let catalog = tools
        .iter()
        .map(|tool| format!("- {}: {}", tool.name, tool.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a helpful assistant with access to these tools:

{catalog}

If you need to use a tool to answer the question, respond ONLY with:
{TOOL_CALL_MARKER} <tool_name>
{QUERY_MARKER} <the query to pass to the tool>

Otherwise, provide a direct answer.

{transcript}
"#
    )
}

/// Parse a raw completion into a tool call or a final answer
pub fn parse_reply(raw: &str) -> ModelReply {
    if raw.contains(TOOL_CALL_MARKER) && raw.contains(QUERY_MARKER) {
        let mut tool_name = None;
        let mut query = None;

        for line in raw.lines().map(str::trim_start) {
            if let Some(rest) = line.strip_prefix(TOOL_CALL_MARKER) {
                tool_name = Some(rest.trim());
            } else if let Some(rest) = line.strip_prefix(QUERY_MARKER) {
                query = Some(rest.trim());
            }
        }

        if let (Some(tool_name), Some(query)) = (tool_name, query) {
            if !tool_name.is_empty() && !query.is_empty() {
                info!(
                    tool_name = %tool_name,
                    query = %preview(query, 100),
                    "Model requested tool call"
                );
                return ModelReply::ToolCall(ToolCallRequest::with_query(tool_name, query));
            }
        }
    }

    ModelReply::FinalAnswer {
        text: raw.to_string(),
    }
}

fn failure_message(err: &BackendError) -> String {
    if err.is_plan_limitation() {
        PLAN_LIMITATION_MESSAGE.to_string()
    } else {
        format!("Error calling model: {}", err)
    }
}
