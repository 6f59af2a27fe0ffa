//! Analyst Agent
//!
//! A tool-augmented conversational agent that:
//! - Lets a language model decide whether to delegate to an analytical tool
//! - Executes at most one tool call at a time, under a hard timeout
//! - Normalizes noisy tool output before handing it back to the model
//! - Bounds every run by a maximum number of model turns
//! - Always returns a run outcome; failures are recorded as turns
//!
//! LOOP:
//! QUESTION → MODEL → (ANSWER | TOOL → NORMALIZE → MODEL …) → DONE

pub mod adapter;
pub mod agent;
pub mod api;
pub mod config;
pub mod cortex;
pub mod error;
pub mod execution;
pub mod models;
pub mod normalizer;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::{AgentLoop, AgentOptions};
pub use config::AgentConfig;
