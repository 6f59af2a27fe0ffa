//! Analyst agent tool
//!
//! Posts a question to a hosted analytical agent (non-streaming) and
//! collects the text items of its reply. Two reply shapes are accepted:
//! a top-level `content` list, or the same list nested under `message`.

use crate::error::{AgentError, ToolError};
use crate::models::{ToolArguments, QUERY_ARGUMENT};
use crate::tools::Tool;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct AnalystTool {
    name: String,
    description: String,
    client: Client,
    url: String,
    token: String,
    timeout: Duration,
}

impl AnalystTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .map_err(AgentError::HttpError)?;

        Ok(Self {
            name: name.into(),
            description: description.into(),
            client,
            url: url.into(),
            token: token.into(),
            timeout,
        })
    }

    fn map_request_error(&self, e: reqwest::Error) -> ToolError {
        if e.is_timeout() {
            ToolError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            ToolError::Transport {
                message: e.to_string(),
            }
        }
    }
}

#[async_trait::async_trait]
impl Tool for AnalystTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        let query = arguments
            .get(QUERY_ARGUMENT)
            .map(String::as_str)
            .unwrap_or_default();

        let request = AgentRequest {
            messages: vec![RequestMessage {
                role: "user",
                content: vec![RequestContent {
                    kind: "text",
                    text: query,
                }],
            }],
            stream: false,
        };

        info!(url = %self.url, timeout_secs = self.timeout.as_secs(), "Calling analyst agent");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Analyst agent request failed: {}", e);
                self.map_request_error(e)
            })?;

        let status = response.status();
        debug!(status = status.as_u16(), "Analyst agent responded");

        if !status.is_success() {
            warn!(status = status.as_u16(), "Analyst agent returned an error status");
            return Err(ToolError::BackendStatus {
                code: status.as_u16(),
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            error!("Failed to parse analyst agent response: {}", e);
            self.map_request_error(e)
        })?;

        let fragments = text_items(&body);
        debug!(items = fragments.len(), "Extracted text items");

        let text = fragments.join(" ").trim().to_string();
        if text.is_empty() {
            return Err(ToolError::EmptyResponse);
        }

        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    messages: Vec<RequestMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

/// Text items of a reply: top-level `content`, else `message.content`.
/// Any other shape yields nothing.
fn text_items(body: &Value) -> Vec<&str> {
    let flat = body
        .get("content")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty());
    let items = flat.or_else(|| {
        body.get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
    });

    items
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}
