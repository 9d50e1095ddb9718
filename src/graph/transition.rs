//! Pure state transition function for the conversation graph

use super::{Effect, Event, ThreadContext, ThreadState};
use crate::db::ToolResult;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ThreadState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ThreadState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Thread is busy, cannot accept message (cancel current operation first)")]
    ThreadBusy,
    #[error("Cancellation in progress")]
    CancellationInProgress,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs, it always produces the same outputs, with no
/// I/O side effects. All persistence, network and notification work is
/// returned as effects for the runtime to execute.
pub fn transition(
    state: &ThreadState,
    _context: &ThreadContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // User Message Handling
        // ============================================================

        // Idle/Error + UserMessage -> chat node (Error recovers on new input)
        (ThreadState::Idle | ThreadState::Error { .. }, Event::UserMessage { text }) => {
            Ok(TransitionResult::new(ThreadState::LlmRequesting { attempt: 1 })
                .with_effect(Effect::persist_user_message(text))
                .with_effect(Effect::PersistState)
                .with_effect(Effect::RequestLlm))
        }

        // Busy states + UserMessage -> reject
        (
            ThreadState::LlmRequesting { .. } | ThreadState::ToolExecuting { .. },
            Event::UserMessage { .. },
        ) => Err(TransitionError::ThreadBusy),

        (
            ThreadState::CancellingLlm | ThreadState::CancellingTool { .. },
            Event::UserMessage { .. },
        ) => Err(TransitionError::CancellationInProgress),

        // ============================================================
        // LLM Response Processing (the conditional edge)
        // ============================================================

        (
            ThreadState::LlmRequesting { .. },
            Event::LlmResponse {
                content,
                tool_calls,
                usage,
            },
        ) => {
            let usage_data = usage_to_data(&usage);

            if tool_calls.is_empty() {
                // No tool calls: the turn is over -> Idle
                Ok(TransitionResult::new(ThreadState::Idle)
                    .with_effect(Effect::persist_agent_message(content, Some(usage_data)))
                    .with_effect(Effect::PersistState)
                    .with_effect(Effect::notify_turn_done()))
            } else {
                // Tool calls: route to the tools node
                let mut remaining = tool_calls;
                let first = remaining.remove(0);

                Ok(TransitionResult::new(ThreadState::ToolExecuting {
                    current_tool: first.clone(),
                    remaining_tools: remaining,
                })
                .with_effect(Effect::persist_agent_message(content, Some(usage_data)))
                .with_effect(Effect::PersistState)
                .with_effect(Effect::ExecuteTool { tool: first }))
            }
        }

        // ============================================================
        // Error Handling and Retry
        // ============================================================

        // Retryable error under the attempt cap -> retry with backoff
        (
            ThreadState::LlmRequesting { attempt },
            Event::LlmError {
                error_kind,
                retry_after,
                ..
            },
        ) if error_kind.is_retryable() && *attempt < MAX_RETRY_ATTEMPTS => {
            let new_attempt = attempt + 1;
            let delay = retry_after.unwrap_or_else(|| retry_delay(new_attempt));

            Ok(
                TransitionResult::new(ThreadState::LlmRequesting {
                    attempt: new_attempt,
                })
                .with_effect(Effect::PersistState)
                .with_effect(Effect::ScheduleRetry {
                    delay,
                    attempt: new_attempt,
                })
                .with_effect(Effect::notify_state_change(
                    "llm_requesting",
                    json!({
                        "attempt": new_attempt,
                        "max_attempts": MAX_RETRY_ATTEMPTS,
                        "message": format!("Retrying... (attempt {new_attempt})")
                    }),
                )),
            )
        }

        // Non-retryable or exhausted -> Error
        (
            ThreadState::LlmRequesting { attempt },
            Event::LlmError {
                message,
                error_kind,
                ..
            },
        ) => {
            let error_message = if error_kind.is_retryable() {
                format!("Failed after {attempt} attempts: {message}")
            } else {
                message
            };

            Ok(TransitionResult::new(ThreadState::Error {
                message: error_message.clone(),
                error_kind,
            })
            .with_effect(Effect::PersistState)
            .with_effect(Effect::NotifyClient {
                event_type: "error".to_string(),
                data: json!({ "message": error_message }),
            }))
        }

        // RetryTimeout for the current attempt -> make the LLM request
        (ThreadState::LlmRequesting { attempt }, Event::RetryTimeout { attempt: retry_attempt })
            if *attempt == retry_attempt =>
        {
            Ok(
                TransitionResult::new(ThreadState::LlmRequesting { attempt: *attempt })
                    .with_effect(Effect::RequestLlm),
            )
        }

        // Cancel arrived while waiting out a retry delay; the timer is the
        // only pending wakeup, so it settles the cancellation
        (ThreadState::CancellingLlm, Event::RetryTimeout { .. }) => {
            Ok(TransitionResult::new(ThreadState::Idle)
                .with_effect(Effect::PersistState)
                .with_effect(Effect::notify_turn_done()))
        }

        // Stale retry timer (state moved on) -> ignore
        (state, Event::RetryTimeout { .. }) => Ok(TransitionResult::new(state.clone())),

        // ============================================================
        // Tool Execution
        // ============================================================

        // ToolComplete with tools remaining -> next tool
        (
            ThreadState::ToolExecuting {
                current_tool,
                remaining_tools,
            },
            Event::ToolComplete {
                tool_use_id,
                result,
            },
        ) if tool_use_id == current_tool.id && !remaining_tools.is_empty() => {
            let mut remaining = remaining_tools.clone();
            let next = remaining.remove(0);

            Ok(TransitionResult::new(ThreadState::ToolExecuting {
                current_tool: next.clone(),
                remaining_tools: remaining,
            })
            .with_effect(Effect::persist_tool_message(
                result.tool_use_id,
                result.output,
                result.is_error,
            ))
            .with_effect(Effect::PersistState)
            .with_effect(Effect::ExecuteTool { tool: next }))
        }

        // Final ToolComplete -> back to the chat node with the results
        (
            ThreadState::ToolExecuting { current_tool, .. },
            Event::ToolComplete {
                tool_use_id,
                result,
            },
        ) if tool_use_id == current_tool.id => {
            Ok(TransitionResult::new(ThreadState::LlmRequesting { attempt: 1 })
                .with_effect(Effect::persist_tool_message(
                    result.tool_use_id,
                    result.output,
                    result.is_error,
                ))
                .with_effect(Effect::PersistState)
                .with_effect(Effect::RequestLlm))
        }

        // ============================================================
        // Cancellation
        // ============================================================

        (ThreadState::LlmRequesting { .. }, Event::UserCancel) => {
            Ok(TransitionResult::new(ThreadState::CancellingLlm)
                .with_effect(Effect::PersistState)
                .with_effect(Effect::AbortLlm)
                .with_effect(Effect::notify_state_change(
                    "cancelling",
                    json!({ "message": "Cancelling..." }),
                )))
        }

        // CancellingLlm settles on whatever comes back; the response is discarded
        (ThreadState::CancellingLlm, Event::LlmResponse { .. } | Event::LlmError { .. }) => {
            Ok(TransitionResult::new(ThreadState::Idle)
                .with_effect(Effect::PersistState)
                .with_effect(Effect::notify_turn_done()))
        }

        (
            ThreadState::ToolExecuting {
                current_tool,
                remaining_tools,
            },
            Event::UserCancel,
        ) => Ok(TransitionResult::new(ThreadState::CancellingTool {
            tool_use_id: current_tool.id.clone(),
            skipped_tools: remaining_tools.clone(),
        })
        .with_effect(Effect::PersistState)
        .with_effect(Effect::AbortTool {
            tool_use_id: current_tool.id.clone(),
        })
        .with_effect(Effect::notify_state_change(
            "cancelling",
            json!({ "message": "Cancelling..." }),
        ))),

        // The aborted tool settles; persist cancelled results for it and every
        // skipped tool so no tool call is left without a matching result
        (
            ThreadState::CancellingTool {
                tool_use_id,
                skipped_tools,
            },
            Event::ToolComplete {
                tool_use_id: completed_id,
                result,
            },
        ) if completed_id == *tool_use_id => {
            let skipped: Vec<ToolResult> = skipped_tools
                .iter()
                .map(|tool| ToolResult::cancelled(tool.id.clone(), "Skipped due to cancellation"))
                .collect();

            let mut result_effects = vec![Effect::persist_tool_message(
                result.tool_use_id,
                result.output,
                result.is_error,
            )];
            result_effects.extend(skipped.into_iter().map(|r| {
                Effect::persist_tool_message(r.tool_use_id, r.output, r.is_error)
            }));

            Ok(TransitionResult::new(ThreadState::Idle)
                .with_effects(result_effects)
                .with_effect(Effect::PersistState)
                .with_effect(Effect::notify_turn_done()))
        }

        // Cancel with nothing in flight -> no-op
        (
            ThreadState::Idle
            | ThreadState::Error { .. }
            | ThreadState::CancellingLlm
            | ThreadState::CancellingTool { .. },
            Event::UserCancel,
        ) => Ok(TransitionResult::new(state.clone())),

        // ============================================================
        // Invalid Transitions
        // ============================================================

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {state:?} with event {event:?}"
        ))),
    }
}

/// Exponential backoff for LLM retries
fn retry_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(4);
    Duration::from_millis(500 * 2u64.pow(exp))
}

fn usage_to_data(usage: &crate::llm::Usage) -> crate::db::UsageData {
    crate::db::UsageData {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
    }
}
