//! Scripted completion backend for development & testing
//! Keeps the agent loop runnable without a live model.

use super::{CompletionBackend, PromptEscaping};
use crate::error::BackendError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays queued replies in order and records every prompt it receives
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    repeat: Option<String>,
    prompts: Mutex<Vec<String>>,
    escaping: PromptEscaping,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<String, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            repeat: None,
            prompts: Mutex::new(Vec::new()),
            escaping: PromptEscaping::None,
        }
    }

    /// Backend that answers every call with the same text
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            repeat: Some(reply.into()),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_escaping(mut self, escaping: PromptEscaping) -> Self {
        self.escaping = escaping;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|prompts| prompts.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, _model: &str, prompt: &str) -> Result<String, BackendError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let next = self
            .replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front());

        match (next, &self.repeat) {
            (Some(reply), _) => reply,
            (None, Some(text)) => Ok(text.clone()),
            (None, None) => Err(BackendError::Transport("script exhausted".to_string())),
        }
    }

    fn escaping(&self) -> PromptEscaping {
        self.escaping
    }
}
