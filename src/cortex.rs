//! Snowflake Cortex completion backend
//!
//! Runs `SNOWFLAKE.CORTEX.COMPLETE` through the SQL statements REST API.
//! The prompt travels inside a SQL string literal, so callers must hand in
//! text escaped for [`PromptEscaping::SqlLiteral`].
//! Statements that outlive the synchronous window come back as
//! `202 Accepted` with a handle; those are polled until done or until the
//! configured timeout runs out.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::adapter::{CompletionBackend, PromptEscaping};
use crate::error::{AgentError, BackendError};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Connection settings for the statements endpoint
#[derive(Debug, Clone, Default)]
pub struct CortexSettings {
    pub account_url: String,
    pub token: String,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
    pub timeout: Duration,
}

/// Reusable Cortex client (connection-pooled)
pub struct CortexClient {
    client: Client,
    settings: CortexSettings,
    statements_url: String,
}

impl CortexClient {
    pub fn new(settings: CortexSettings) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(settings.timeout)
            .build()
            .map_err(AgentError::HttpError)?;

        let statements_url = format!(
            "{}/api/v2/statements",
            settings.account_url.trim_end_matches('/')
        );

        Ok(Self {
            client,
            settings,
            statements_url,
        })
    }
}

#[async_trait::async_trait]
impl CompletionBackend for CortexClient {
    fn escaping(&self) -> PromptEscaping {
        PromptEscaping::SqlLiteral
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String, BackendError> {
        let statement = build_complete_statement(model, prompt);

        let request = StatementRequest {
            statement: &statement,
            timeout: self.settings.timeout.as_secs(),
            warehouse: self.settings.warehouse.as_deref(),
            database: self.settings.database.as_deref(),
            schema: self.settings.schema.as_deref(),
            role: self.settings.role.as_deref(),
        };

        info!(model = %model, prompt_chars = prompt.chars().count(), "Calling Snowflake Cortex");

        let started = Instant::now();
        let mut response = self
            .authorized(self.client.post(&self.statements_url))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        while response.status() == StatusCode::ACCEPTED {
            let pending: StatementPending = response.json().await.map_err(decode_error)?;
            if started.elapsed() + POLL_INTERVAL > self.settings.timeout {
                warn!(
                    handle = %pending.statement_handle,
                    "Cortex statement still running at timeout"
                );
                return Err(BackendError::Status {
                    code: StatusCode::ACCEPTED.as_u16(),
                    message: format!(
                        "statement {} still running after {} seconds",
                        pending.statement_handle,
                        self.settings.timeout.as_secs()
                    ),
                });
            }

            debug!(handle = %pending.statement_handle, "Cortex statement pending, polling");
            tokio::time::sleep(POLL_INTERVAL).await;

            let url = format!("{}/{}", self.statements_url, pending.statement_handle);
            response = self
                .authorized(self.client.get(&url))
                .send()
                .await
                .map_err(transport_error)?;
        }

        let answer = read_answer(response).await?;
        debug!(answer_chars = answer.chars().count(), "Cortex response received");

        Ok(answer)
    }
}

impl CortexClient {
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.settings.token)
            .header("X-Snowflake-Authorization-Token-Type", "PROGRAMMATIC_ACCESS_TOKEN")
            .header("Accept", "application/json")
    }
}

/// Only `200 OK` carries a finished result set
async fn read_answer(response: Response) -> Result<String, BackendError> {
    let status = response.status();
    if status != StatusCode::OK {
        let error_text = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), "Cortex error response: {}", error_text);
        let message = serde_json::from_str::<StatementError>(&error_text)
            .map(|e| e.message)
            .unwrap_or(error_text);
        return Err(BackendError::Status {
            code: status.as_u16(),
            message,
        });
    }

    let body: StatementResponse = response.json().await.map_err(decode_error)?;

    Ok(body
        .data
        .into_iter()
        .next()
        .and_then(|row| row.into_iter().next())
        .flatten()
        .unwrap_or_default())
}

fn transport_error(e: reqwest::Error) -> BackendError {
    error!("Cortex request failed: {}", e);
    BackendError::Transport(e.to_string())
}

fn decode_error(e: reqwest::Error) -> BackendError {
    error!("Failed to parse Cortex response: {}", e);
    BackendError::Decode(e.to_string())
}

/// Build the COMPLETE call; `prompt` must already be literal-escaped
fn build_complete_statement(model: &str, prompt: &str) -> String {
    format!(
        "SELECT SNOWFLAKE.CORTEX.COMPLETE('{}', '{}') AS response",
        PromptEscaping::SqlLiteral.apply(model),
        prompt
    )
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementPending {
    statement_handle: String,
}

#[derive(Debug, Deserialize)]
struct StatementError {
    message: String,
}
