//! Thread runtime executor
//!
//! Drives one thread's conversation graph: receives events, applies the
//! pure transition function, and executes the resulting effects
//! (checkpoint writes, LLM requests, tool runs, client notifications).

use super::traits::{LlmClient, Storage, ToolExecutor};
use super::SseEvent;

use crate::db::{ErrorKind, MessageContent, ToolResult};
use crate::graph::state::ToolCall;
use crate::graph::{transition, Effect, Event, ThreadContext, ThreadState, ToolInput};
use crate::llm::{ContentBlock, LlmMessage, LlmRequest, LlmService, MessageRole};
use crate::system_prompt::build_system_prompt;
use crate::title_generator::{self, DEFAULT_TITLE};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Generic thread runtime that can work with any storage, LLM, and tool
/// implementations
pub struct ThreadRuntime<S, L, T>
where
    S: Storage + Clone + 'static,
    L: LlmClient + 'static,
    T: ToolExecutor + 'static,
{
    context: ThreadContext,
    state: ThreadState,
    storage: S,
    llm_client: Arc<L>,
    tool_executor: Arc<T>,
    /// Cheap model for title generation; None falls back to the heuristic
    title_llm: Option<Arc<dyn LlmService>>,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    /// Token to cancel the running tool execution
    tool_cancel_token: Option<CancellationToken>,
    /// Token to cancel the running LLM request
    llm_cancel_token: Option<CancellationToken>,
}

impl<S, L, T> ThreadRuntime<S, L, T>
where
    S: Storage + Clone + 'static,
    L: LlmClient + 'static,
    T: ToolExecutor + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: ThreadContext,
        state: ThreadState,
        storage: S,
        llm_client: L,
        tool_executor: T,
        title_llm: Option<Arc<dyn LlmService>>,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        broadcast_tx: broadcast::Sender<SseEvent>,
    ) -> Self {
        Self {
            context,
            state,
            storage,
            llm_client: Arc::new(llm_client),
            tool_executor: Arc::new(tool_executor),
            title_llm,
            event_rx,
            event_tx,
            broadcast_tx,
            tool_cancel_token: None,
            llm_cancel_token: None,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(thread_id = %self.context.thread_id, "Starting thread runtime");

        // Resume an interrupted LLM request from the checkpointed state
        if let ThreadState::LlmRequesting { .. } = &self.state {
            tracing::info!(thread_id = %self.context.thread_id, "Resuming interrupted LLM request");
            if let Err(e) = self.execute_effect(Effect::RequestLlm).await {
                tracing::error!(error = %e, "Failed to resume LLM request");
                let _ = self.broadcast_tx.send(SseEvent::Error {
                    message: format!("Failed to resume: {e}"),
                });
            }
        }

        while let Some(event) = self.event_rx.recv().await {
            if let Err(e) = self.process_event(event).await {
                tracing::error!(thread_id = %self.context.thread_id, error = %e, "Error handling event");
                let _ = self.broadcast_tx.send(SseEvent::Error { message: e });
            }
        }

        tracing::info!(thread_id = %self.context.thread_id, "Thread runtime stopped");
    }

    async fn process_event(&mut self, event: Event) -> Result<(), String> {
        // Pure state transition
        let result = transition(&self.state, &self.context, event).map_err(|e| e.to_string())?;

        self.state = result.new_state;

        for effect in result.effects {
            self.execute_effect(effect).await?;
        }

        Ok(())
    }

    async fn execute_effect(&mut self, effect: Effect) -> Result<(), String> {
        match effect {
            Effect::PersistMessage { content, usage } => {
                let message = self
                    .storage
                    .add_message(&self.context.thread_id, &content, usage.as_ref())
                    .await?;
                let _ = self.broadcast_tx.send(SseEvent::Message {
                    message: serde_json::to_value(&message).unwrap_or(serde_json::Value::Null),
                });
                Ok(())
            }

            Effect::PersistState => {
                self.storage
                    .update_state(&self.context.thread_id, &self.state)
                    .await
            }

            Effect::RequestLlm => {
                self.spawn_llm_request().await;
                Ok(())
            }

            Effect::ExecuteTool { tool } => {
                self.spawn_tool_execution(tool);
                Ok(())
            }

            Effect::AbortLlm => {
                if let Some(token) = self.llm_cancel_token.take() {
                    token.cancel();
                }
                Ok(())
            }

            Effect::AbortTool { tool_use_id } => {
                tracing::debug!(tool_use_id = %tool_use_id, "Aborting tool");
                if let Some(token) = self.tool_cancel_token.take() {
                    token.cancel();
                }
                Ok(())
            }

            Effect::NotifyClient { event_type, data } => {
                self.notify_client(&event_type, data);
                Ok(())
            }

            Effect::ScheduleRetry { delay, attempt } => {
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = event_tx.send(Event::RetryTimeout { attempt }).await;
                });
                Ok(())
            }
        }
    }

    /// Spawn the LLM request as a background task so the event loop stays
    /// responsive to cancellation
    async fn spawn_llm_request(&mut self) {
        let attempt = match &self.state {
            ThreadState::LlmRequesting { attempt } => *attempt,
            _ => 1,
        };

        let request = match self.build_llm_request().await {
            Ok(r) => r,
            Err(e) => {
                let _ = self
                    .event_tx
                    .send(Event::LlmError {
                        message: e,
                        error_kind: ErrorKind::Unknown,
                        attempt,
                        retry_after: None,
                    })
                    .await;
                return;
            }
        };

        let token = CancellationToken::new();
        self.llm_cancel_token = Some(token.clone());

        let llm_client = self.llm_client.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let event = tokio::select! {
                () = token.cancelled() => Event::LlmError {
                    message: "Request cancelled".to_string(),
                    error_kind: ErrorKind::Cancelled,
                    attempt,
                    retry_after: None,
                },
                result = llm_client.complete(&request) => match result {
                    Ok(response) => {
                        let tool_calls = extract_tool_calls(&response);
                        Event::LlmResponse {
                            content: response.content,
                            tool_calls,
                            usage: response.usage,
                        }
                    }
                    Err(e) => Event::LlmError {
                        message: e.message.clone(),
                        error_kind: e.kind.into(),
                        attempt,
                        retry_after: e.retry_after,
                    },
                },
            };
            let _ = event_tx.send(event).await;
        });
    }

    async fn build_llm_request(&self) -> Result<LlmRequest, String> {
        let messages = self.storage.get_messages(&self.context.thread_id).await?;

        Ok(LlmRequest {
            system: Some(build_system_prompt(&self.context.model_id)),
            messages: fold_llm_messages(&messages),
            tools: self.tool_executor.definitions(),
            max_tokens: None,
        })
    }

    fn spawn_tool_execution(&mut self, tool: ToolCall) {
        let token = CancellationToken::new();
        self.tool_cancel_token = Some(token.clone());

        let tool_executor = self.tool_executor.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let tool_use_id = tool.id.clone();
            let name = tool.name().to_string();

            let result = tokio::select! {
                () = token.cancelled() => {
                    ToolResult::cancelled(tool_use_id.clone(), "Cancelled by user")
                }
                output = tool_executor.execute(&name, tool.input.to_value()) => match output {
                    Some(output) if output.success => {
                        ToolResult::success(tool_use_id.clone(), output.output)
                    }
                    Some(output) => ToolResult::error(tool_use_id.clone(), output.output),
                    None => ToolResult::error(
                        tool_use_id.clone(),
                        format!("Unknown tool: {name}"),
                    ),
                },
            };

            let _ = event_tx
                .send(Event::ToolComplete {
                    tool_use_id,
                    result,
                })
                .await;
        });
    }

    fn notify_client(&self, event_type: &str, data: serde_json::Value) {
        match event_type {
            "state_change" => {
                let state = data
                    .get("state")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                let state_data = data
                    .get("state_data")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                let _ = self.broadcast_tx.send(SseEvent::StateChange {
                    state,
                    data: state_data,
                });
            }
            "turn_done" => {
                let _ = self.broadcast_tx.send(SseEvent::TurnDone);
                self.maybe_spawn_title_generation();
            }
            "error" => {
                let message = data
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string();
                let _ = self.broadcast_tx.send(SseEvent::Error { message });
            }
            other => {
                tracing::warn!(event_type = %other, "Unknown client notification");
            }
        }
    }

    /// Generate a title once the first assistant turn has completed.
    /// Runs in the background; never holds up the event loop.
    fn maybe_spawn_title_generation(&self) {
        let storage = self.storage.clone();
        let title_llm = self.title_llm.clone();
        let thread_id = self.context.thread_id.clone();
        let broadcast_tx = self.broadcast_tx.clone();

        tokio::spawn(async move {
            match storage.get_title(&thread_id).await {
                Ok(Some(title)) if title != DEFAULT_TITLE => return,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(thread_id = %thread_id, error = %e, "Title lookup failed");
                    return;
                }
            }

            let messages = match storage.get_messages(&thread_id).await {
                Ok(m) if !m.is_empty() => m,
                Ok(_) => return,
                Err(e) => {
                    tracing::warn!(thread_id = %thread_id, error = %e, "Loading messages for title failed");
                    return;
                }
            };

            let title = match title_llm {
                Some(llm) => title_generator::generate_title(&messages, llm).await,
                None => title_generator::fallback_title(&messages),
            };

            if title == DEFAULT_TITLE {
                return;
            }

            if let Err(e) = storage.save_title(&thread_id, &title).await {
                tracing::warn!(thread_id = %thread_id, error = %e, "Saving title failed");
                return;
            }

            tracing::info!(thread_id = %thread_id, title = %title, "Thread title generated");
            let _ = broadcast_tx.send(SseEvent::Title { title });
        });
    }
}

/// Extract typed tool calls from an LLM response
fn extract_tool_calls(response: &crate::llm::LlmResponse) -> Vec<ToolCall> {
    response
        .tool_uses()
        .into_iter()
        .map(|(id, name, input)| {
            ToolCall::new(id, ToolInput::from_name_and_value(name, input.clone()))
        })
        .collect()
}

/// Convert the persisted transcript into LLM messages.
///
/// Tool result messages become user-role tool_result blocks; consecutive
/// blocks with the same role are folded into a single message so the
/// providers see an alternating transcript.
fn fold_llm_messages(messages: &[crate::db::Message]) -> Vec<LlmMessage> {
    let mut out: Vec<LlmMessage> = Vec::new();

    for msg in messages {
        let (role, blocks) = match &msg.content {
            MessageContent::User(user) => (
                MessageRole::User,
                vec![ContentBlock::text(user.text.clone())],
            ),
            MessageContent::Agent(content) => (MessageRole::Assistant, content.clone()),
            MessageContent::Tool(tool) => (
                MessageRole::User,
                vec![ContentBlock::tool_result(
                    tool.tool_use_id.clone(),
                    tool.content.clone(),
                    tool.is_error,
                )],
            ),
            // Error records are UI-only
            MessageContent::Error(_) => continue,
        };

        match out.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => out.push(LlmMessage { role, content: blocks }),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Message, MessageType};
    use chrono::Utc;

    fn message(seq: i64, content: MessageContent) -> Message {
        Message {
            message_id: format!("m{seq}"),
            thread_id: "t1".to_string(),
            sequence_id: seq,
            message_type: content.message_type(),
            content,
            usage_data: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fold_merges_consecutive_tool_results_into_one_user_message() {
        let messages = vec![
            message(1, MessageContent::user("look these up")),
            message(
                2,
                MessageContent::agent(vec![
                    ContentBlock::tool_use("c1", "web_search", serde_json::json!({"query": "a"})),
                    ContentBlock::tool_use("c2", "stock_quote", serde_json::json!({"symbol": "b"})),
                ]),
            ),
            message(3, MessageContent::tool("c1", "result a", false)),
            message(4, MessageContent::tool("c2", "result b", false)),
        ];

        let folded = fold_llm_messages(&messages);
        assert_eq!(folded.len(), 3);
        assert_eq!(folded[0].role, MessageRole::User);
        assert_eq!(folded[1].role, MessageRole::Assistant);
        assert_eq!(folded[2].role, MessageRole::User);
        assert_eq!(folded[2].content.len(), 2);
    }

    #[test]
    fn fold_skips_error_records() {
        let messages = vec![
            message(1, MessageContent::user("hi")),
            message(2, MessageContent::error("transient failure")),
            message(3, MessageContent::agent(vec![ContentBlock::text("hello")])),
        ];
        let folded = fold_llm_messages(&messages);
        assert_eq!(folded.len(), 2);
    }

    #[test]
    fn extract_tool_calls_types_known_tools() {
        let response = crate::llm::LlmResponse {
            content: vec![
                ContentBlock::text("checking"),
                ContentBlock::tool_use("c1", "web_search", serde_json::json!({"query": "rust"})),
                ContentBlock::tool_use("c2", "no_such_tool", serde_json::json!({})),
            ],
            end_turn: false,
            usage: crate::llm::Usage::default(),
        };
        let calls = extract_tool_calls(&response);
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0].input, ToolInput::WebSearch(_)));
        assert!(matches!(calls[1].input, ToolInput::Unknown { .. }));
    }
}
