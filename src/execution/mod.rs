//! Tool invocation
//!
//! Runs one tool call under a hard timeout and normalizes what comes back.
//! Failures are returned as `ToolError` values, never raised past the caller.

use crate::error::ToolError;
use crate::models::{ToolArguments, QUERY_ARGUMENT};
use crate::normalizer::{preview, NormalizedText, Normalizer};
use crate::tools::Tool;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default upper bound for a single tool call (5 minutes)
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// Appended to every query so the tool answers without narration
pub const DEFAULT_INSTRUCTION_SUFFIX: &str =
    "\n\nPlease provide only the final answer in a brief, concise summary.";

pub struct ToolInvoker {
    normalizer: Normalizer,
    timeout: Duration,
    instruction_suffix: String,
}

impl ToolInvoker {
    pub fn new(normalizer: Normalizer, timeout: Duration) -> Self {
        Self {
            normalizer,
            timeout,
            instruction_suffix: DEFAULT_INSTRUCTION_SUFFIX.to_string(),
        }
    }

    pub fn with_instruction_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.instruction_suffix = suffix.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn invoke(&self, tool: &dyn Tool, query: &str) -> Result<NormalizedText, ToolError> {
        let mut arguments = ToolArguments::new();
        arguments.insert(
            QUERY_ARGUMENT.to_string(),
            format!("{}{}", query, self.instruction_suffix),
        );

        info!(
            tool_name = %tool.name(),
            query = %preview(query, 100),
            timeout_secs = self.timeout.as_secs(),
            "Invoking tool"
        );

        let start = Instant::now();
        let raw = match tokio::time::timeout(self.timeout, tool.invoke(&arguments)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                seconds: self.timeout.as_secs(),
            }),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                warn!(tool_name = %tool.name(), elapsed_ms, error = %e, "Tool invocation failed");
                return Err(e);
            }
        };

        debug!(raw_chars = raw.chars().count(), elapsed_ms, "Tool returned text");

        let normalized = self.normalizer.normalize(&raw);
        if normalized.is_fallback() {
            warn!(tool_name = %tool.name(), "Normalization removed all content, using raw output");
        }

        info!(
            tool_name = %tool.name(),
            elapsed_ms,
            output = %preview(normalized.as_str(), 200),
            "Tool invocation completed"
        );

        Ok(normalized)
    }
}

impl Default for ToolInvoker {
    fn default() -> Self {
        Self::new(Normalizer::default(), DEFAULT_TOOL_TIMEOUT)
    }
}
