//! Agent loop - model/tool state machine
//!
//! AWAITING_MODEL → (answer → DONE | tool call → AWAITING_TOOL)
//! AWAITING_TOOL  → (result or tool error → AWAITING_MODEL | unknown tool → DONE)
//!
//! At most one model or tool call is in flight. Tool failures are handed back
//! to the model as data; only an unknown tool or an exhausted turn budget
//! ends a run with an error turn.

use crate::adapter::{CompletionBackend, ModelAdapter};
use crate::error::RunError;
use crate::execution::ToolInvoker;
use crate::models::{Conversation, ModelReply, RunOutcome, ToolCallRequest, Turn};
use crate::normalizer::preview;
use crate::tools::ToolRegistry;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const DEFAULT_MAX_TURNS: usize = 8;

/// Run-scoped limits and collaborators
pub struct AgentOptions {
    /// Maximum model invocations per run
    pub max_turns: usize,
    pub invoker: ToolInvoker,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            invoker: ToolInvoker::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopState {
    AwaitingModel,
    AwaitingTool(ToolCallRequest),
    Done,
}

pub struct AgentLoop {
    adapter: ModelAdapter,
    registry: Arc<ToolRegistry>,
    invoker: ToolInvoker,
    max_turns: usize,
}

impl AgentLoop {
    /// Bind the registry's tools to a model adapter over `backend`
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        model: impl Into<String>,
        registry: Arc<ToolRegistry>,
        options: AgentOptions,
    ) -> Self {
        let adapter = ModelAdapter::new(backend, model, registry.descriptors());
        Self {
            adapter,
            registry,
            invoker: options.invoker,
            max_turns: options.max_turns,
        }
    }

    pub fn adapter(&self) -> &ModelAdapter {
        &self.adapter
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Answer `question`. Always returns an outcome; failures show up as the
    /// final turn's variant.
    pub async fn run(&self, question: &str) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("agent_run", run_id = %run_id);
        self.drive(run_id, question).instrument(span).await
    }

    async fn drive(&self, run_id: Uuid, question: &str) -> RunOutcome {
        let start = Instant::now();
        let mut conversation = Conversation::new(question);
        let mut state = LoopState::AwaitingModel;
        let mut model_calls = 0;
        let mut tool_calls = 0;

        info!(
            question = %preview(question, 100),
            max_turns = self.max_turns,
            tools = ?self.registry.list(),
            "Agent run started"
        );

        while state != LoopState::Done {
            state = match state {
                LoopState::AwaitingModel => {
                    if model_calls >= self.max_turns {
                        warn!(model_calls, "Turn limit reached without a final answer");
                        conversation.push(Turn::Error {
                            reason: RunError::TurnLimitExceeded,
                        });
                        LoopState::Done
                    } else {
                        model_calls += 1;
                        debug!(model_calls, "Awaiting model");

                        match self.adapter.complete(&conversation).await {
                            ModelReply::FinalAnswer { text } => {
                                conversation.push(Turn::assistant(text));
                                LoopState::Done
                            }
                            ModelReply::ToolCall(call) => {
                                conversation.push(Turn::Assistant {
                                    text: format!(
                                        "I'll use the {} tool to answer your question.",
                                        call.tool_name
                                    ),
                                    tool_call: Some(call.clone()),
                                });
                                LoopState::AwaitingTool(call)
                            }
                        }
                    }
                }

                LoopState::AwaitingTool(call) => match self.registry.get(&call.tool_name) {
                    None => {
                        warn!(tool_name = %call.tool_name, "Model requested an unregistered tool");
                        conversation.push(Turn::Error {
                            reason: RunError::UnknownTool(call.tool_name),
                        });
                        LoopState::Done
                    }
                    Some(tool) => {
                        tool_calls += 1;
                        let query = call.query().unwrap_or_default();

                        let text = match self.invoker.invoke(tool.as_ref(), query).await {
                            Ok(output) => output.into_inner(),
                            Err(e) => e.to_string(),
                        };

                        conversation.push(Turn::ToolResult {
                            tool_name: call.tool_name,
                            text,
                        });
                        LoopState::AwaitingModel
                    }
                },

                LoopState::Done => LoopState::Done,
            };
        }

        let succeeded = matches!(conversation.last(), Some(Turn::Assistant { .. }));
        let final_answer = conversation.final_answer().unwrap_or_default();

        info!(
            succeeded,
            model_calls,
            tool_calls,
            turns = conversation.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            answer = %preview(&final_answer, 200),
            "Agent run finished"
        );

        RunOutcome {
            run_id,
            final_answer,
            turn_count: conversation.len(),
            model_calls,
            tool_calls,
            succeeded,
            conversation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ScriptedBackend;
    use crate::error::{BackendError, ToolError};
    use crate::models::ToolArguments;
    use crate::normalizer::Normalizer;
    use crate::tools::Tool;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SalesTool {
        reply: Result<String, ToolError>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl SalesTool {
        fn answering(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Tool for SalesTool {
        fn name(&self) -> &str {
            "sales_tool"
        }

        fn description(&self) -> &str {
            "Useful for product sales, best sellers, and 2025 revenue data."
        }

        async fn invoke(&self, _arguments: &ToolArguments) -> Result<String, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.reply.clone()
        }
    }

    fn agent(
        backend: Arc<ScriptedBackend>,
        tool: Arc<SalesTool>,
        options: AgentOptions,
    ) -> AgentLoop {
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        AgentLoop::new(backend, "claude-3-5-sonnet", Arc::new(registry), options)
    }

    #[tokio::test]
    async fn test_direct_answer_ends_in_one_model_call() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(
            "Widget A was the best-selling product.".to_string(),
        )]));
        let tool = Arc::new(SalesTool::answering("unused"));
        let agent = agent(backend.clone(), tool.clone(), AgentOptions::default());

        let outcome = agent.run("Which product sold best?").await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.final_answer, "Widget A was the best-selling product.");
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(outcome.tool_calls, 0);
        assert_eq!(outcome.turn_count, 2);
        assert_eq!(backend.calls(), 1);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_one_tool_round_trip() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("TOOL_CALL: sales_tool\nQUERY: best product 2025".to_string()),
            Ok("Widget A was the best-selling product in 2025.".to_string()),
        ]));
        let tool = Arc::new(SalesTool::answering(
            "[Status] Running SQL\nWidget A had the highest 2025 revenue.",
        ));
        let agent = agent(backend.clone(), tool.clone(), AgentOptions::default());

        let outcome = agent.run("Which product had the best sales in 2025?").await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.model_calls, 2);
        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.final_answer, "Widget A was the best-selling product in 2025.");

        let turns = outcome.conversation.turns();
        assert_eq!(turns.len(), 4);
        assert!(matches!(
            &turns[1],
            Turn::Assistant { tool_call: Some(call), .. } if call.tool_name == "sales_tool"
        ));
        assert_eq!(
            turns[2],
            Turn::ToolResult {
                tool_name: "sales_tool".to_string(),
                text: "Widget A had the highest 2025 revenue.".to_string(),
            }
        );

        // The second prompt carries the normalized tool output back to the model
        let prompts = backend.prompts();
        assert!(prompts[1].contains("Tool Result: Widget A had the highest 2025 revenue."));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_terminal() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(
            "TOOL_CALL: weather_tool\nQUERY: rain in Paris".to_string(),
        )]));
        let tool = Arc::new(SalesTool::answering("unused"));
        let agent = agent(backend.clone(), tool.clone(), AgentOptions::default());

        let outcome = agent.run("Will it rain?").await;

        assert!(!outcome.succeeded);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.tool_calls, 0);
        assert_eq!(
            outcome.conversation.last(),
            Some(&Turn::Error {
                reason: RunError::UnknownTool("weather_tool".to_string())
            })
        );
        assert_eq!(outcome.final_answer, "unknown tool: weather_tool");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_timeout_is_fed_back_to_model() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("TOOL_CALL: sales_tool\nQUERY: best product 2025".to_string()),
            Ok("The sales service is not responding right now.".to_string()),
        ]));
        let tool = Arc::new(SalesTool {
            reply: Ok("late".to_string()),
            delay: Duration::from_secs(3600),
            calls: AtomicUsize::new(0),
        });
        let options = AgentOptions {
            invoker: ToolInvoker::new(Normalizer::default(), Duration::from_secs(300)),
            ..AgentOptions::default()
        };
        let agent = agent(backend.clone(), tool, options);

        let outcome = agent.run("Which product sold best?").await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.model_calls, 2);
        assert_eq!(
            outcome.conversation.turns()[2],
            Turn::ToolResult {
                tool_name: "sales_tool".to_string(),
                text: ToolError::Timeout { seconds: 300 }.to_string(),
            }
        );
        assert!(backend.prompts()[1]
            .contains("Tool Result: Tool call timed out after 300 seconds"));
    }

    #[tokio::test]
    async fn test_tool_error_does_not_abort() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("TOOL_CALL: sales_tool\nQUERY: best product".to_string()),
            Ok("I could not reach the sales data.".to_string()),
        ]));
        let tool = Arc::new(SalesTool {
            reply: Err(ToolError::EmptyResponse),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let agent = agent(backend, tool, AgentOptions::default());

        let outcome = agent.run("Which product sold best?").await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(
            outcome.conversation.turns()[2].text(),
            "The analyst tool ran successfully but returned no text data."
        );
    }

    #[tokio::test]
    async fn test_turn_limit_bounds_tool_cycling() {
        let backend = Arc::new(ScriptedBackend::repeating(
            "TOOL_CALL: sales_tool\nQUERY: best product again",
        ));
        let tool = Arc::new(SalesTool::answering("Widget A was the top seller in 2025."));
        let options = AgentOptions {
            max_turns: 3,
            ..AgentOptions::default()
        };
        let agent = agent(backend.clone(), tool.clone(), options);

        let outcome = agent.run("Which product sold best?").await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.model_calls, 3);
        assert_eq!(backend.calls(), 3);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.final_answer, "turn limit exceeded");
        assert_eq!(
            outcome.conversation.last(),
            Some(&Turn::Error {
                reason: RunError::TurnLimitExceeded
            })
        );
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_final_answer() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(BackendError::Transport(
            "dns error".to_string(),
        ))]));
        let tool = Arc::new(SalesTool::answering("unused"));
        let agent = agent(backend, tool, AgentOptions::default());

        let outcome = agent.run("Which product sold best?").await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.model_calls, 1);
        assert!(outcome.final_answer.starts_with("Error calling model:"));
    }

    #[tokio::test]
    async fn test_every_tool_call_is_answered_before_next_model_call() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("TOOL_CALL: sales_tool\nQUERY: q1".to_string()),
            Ok("TOOL_CALL: sales_tool\nQUERY: q2".to_string()),
            Ok("Done: Widget A.".to_string()),
        ]));
        let tool = Arc::new(SalesTool::answering("Widget A was the top seller in 2025."));
        let agent = agent(backend, tool, AgentOptions::default());

        let outcome = agent.run("Which product sold best?").await;
        let turns = outcome.conversation.turns();

        for (i, turn) in turns.iter().enumerate() {
            if let Turn::Assistant {
                tool_call: Some(_), ..
            } = turn
            {
                assert!(matches!(
                    turns.get(i + 1),
                    Some(Turn::ToolResult { .. }) | Some(Turn::Error { .. })
                ));
            }
        }
        assert_eq!(outcome.tool_calls, 2);
        assert_eq!(outcome.turn_count, 6);
    }
}
