//! Environment configuration
//!
//! Values come from the process environment (optionally seeded from a
//! `.env` file). `from_lookup` takes any key lookup so tests never touch
//! the real environment.

use crate::adapter::CompletionBackend;
use crate::agent::{AgentLoop, AgentOptions, DEFAULT_MAX_TURNS};
use crate::cortex::{CortexClient, CortexSettings};
use crate::error::AgentError;
use crate::execution::ToolInvoker;
use crate::normalizer::{Normalizer, NormalizerConfig};
use crate::tools::{AnalystTool, ToolRegistry};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TOOL_NAME: &str = "sales_analyst_tool";
const DEFAULT_TOOL_DESCRIPTION: &str =
    "Useful for product sales, best sellers, and 2025 revenue data.";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet";
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub account_url: String,
    pub token: String,
    pub analyst_url: String,
    pub tool_name: String,
    pub tool_description: String,
    pub model: String,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
    pub tool_timeout: Duration,
    pub model_timeout: Duration,
    pub max_turns: usize,
    pub extra_markers: Vec<String>,
    pub log_filter: String,
    pub port: u16,
}

impl AgentConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| AgentError::ConfigError(format!("{} is not set", key)))
        };

        Ok(Self {
            account_url: require("SNOWFLAKE_ACCOUNT_URL")?,
            token: require("SNOWFLAKE_PAT")?,
            analyst_url: require("ANALYST_AGENT_URL")?,
            tool_name: get("ANALYST_TOOL_NAME").unwrap_or_else(|| DEFAULT_TOOL_NAME.to_string()),
            tool_description: get("ANALYST_TOOL_DESCRIPTION")
                .unwrap_or_else(|| DEFAULT_TOOL_DESCRIPTION.to_string()),
            model: get("CORTEX_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            warehouse: get("SNOWFLAKE_WAREHOUSE"),
            database: get("SNOWFLAKE_DATABASE"),
            schema: get("SNOWFLAKE_SCHEMA"),
            role: get("SNOWFLAKE_ROLE"),
            tool_timeout: Duration::from_secs(parse_or(
                "TOOL_TIMEOUT_SECS",
                get("TOOL_TIMEOUT_SECS"),
                DEFAULT_TOOL_TIMEOUT_SECS,
            )?),
            model_timeout: Duration::from_secs(parse_or(
                "MODEL_TIMEOUT_SECS",
                get("MODEL_TIMEOUT_SECS"),
                DEFAULT_MODEL_TIMEOUT_SECS,
            )?),
            max_turns: parse_max_turns(get("AGENT_MAX_TURNS"))?,
            extra_markers: get("NORMALIZER_EXTRA_MARKERS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            log_filter: get("RUST_LOG")
                .or_else(|| get("LOG_LEVEL"))
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            port: parse_or("PORT", get("PORT").or_else(|| get("API_PORT")), DEFAULT_PORT)?,
        })
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(NormalizerConfig::default().with_extra_markers(self.extra_markers.clone()))
    }

    pub fn cortex_settings(&self) -> CortexSettings {
        CortexSettings {
            account_url: self.account_url.clone(),
            token: self.token.clone(),
            warehouse: self.warehouse.clone(),
            database: self.database.clone(),
            schema: self.schema.clone(),
            role: self.role.clone(),
            timeout: self.model_timeout,
        }
    }

    pub fn tool_registry(&self) -> Result<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(AnalystTool::new(
            self.tool_name.clone(),
            self.tool_description.clone(),
            self.analyst_url.clone(),
            self.token.clone(),
            self.tool_timeout,
        )?));
        Ok(registry)
    }

    /// Build an agent over the given completion backend
    pub fn build_agent_with(&self, backend: Arc<dyn CompletionBackend>) -> Result<AgentLoop> {
        let options = AgentOptions {
            max_turns: self.max_turns,
            invoker: ToolInvoker::new(self.normalizer(), self.tool_timeout),
        };
        Ok(AgentLoop::new(
            backend,
            self.model.clone(),
            Arc::new(self.tool_registry()?),
            options,
        ))
    }

    /// Build an agent backed by Snowflake Cortex
    pub fn build_agent(&self) -> Result<AgentLoop> {
        let backend = Arc::new(CortexClient::new(self.cortex_settings())?);
        self.build_agent_with(backend)
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| AgentError::ConfigError(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

/// A run needs at least one model call to produce an answer
fn parse_max_turns(value: Option<String>) -> Result<usize> {
    match parse_or("AGENT_MAX_TURNS", value, DEFAULT_MAX_TURNS)? {
        0 => Err(AgentError::ConfigError(
            "AGENT_MAX_TURNS must be at least 1".to_string(),
        )),
        max_turns => Ok(max_turns),
    }
}
