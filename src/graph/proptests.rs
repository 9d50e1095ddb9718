//! Property tests for the transition function

use super::state::{StockQuoteInput, ToolCall, ToolInput, WebSearchInput};
use super::{transition, Effect, Event, ThreadContext, ThreadState};
use crate::db::{ErrorKind, ToolResult};
use crate::llm::{ContentBlock, Usage};
use proptest::prelude::*;

fn arb_tool_input() -> impl Strategy<Value = ToolInput> {
    prop_oneof![
        "[a-z]{1,12}".prop_map(|query| ToolInput::WebSearch(WebSearchInput { query })),
        "[a-z]{1,6}\\.us".prop_map(|symbol| ToolInput::StockQuote(StockQuoteInput { symbol })),
        "[a-z_]{1,10}".prop_map(|name| ToolInput::Unknown {
            name,
            input: serde_json::Value::Null,
        }),
    ]
}

fn arb_tool_call() -> impl Strategy<Value = ToolCall> {
    ("call_[0-9]{1,3}", arb_tool_input()).prop_map(|(id, input)| ToolCall { id, input })
}

fn arb_error_kind() -> impl Strategy<Value = ErrorKind> {
    prop_oneof![
        Just(ErrorKind::Auth),
        Just(ErrorKind::RateLimit),
        Just(ErrorKind::Network),
        Just(ErrorKind::ServerError),
        Just(ErrorKind::InvalidRequest),
        Just(ErrorKind::Cancelled),
        Just(ErrorKind::Unknown),
    ]
}

fn arb_state() -> impl Strategy<Value = ThreadState> {
    prop_oneof![
        Just(ThreadState::Idle),
        (1u32..=5).prop_map(|attempt| ThreadState::LlmRequesting { attempt }),
        (arb_tool_call(), prop::collection::vec(arb_tool_call(), 0..3)).prop_map(
            |(current_tool, remaining_tools)| ThreadState::ToolExecuting {
                current_tool,
                remaining_tools,
            }
        ),
        Just(ThreadState::CancellingLlm),
        ("call_[0-9]{1,3}", prop::collection::vec(arb_tool_call(), 0..3)).prop_map(
            |(tool_use_id, skipped_tools)| ThreadState::CancellingTool {
                tool_use_id,
                skipped_tools,
            }
        ),
        (".{0,20}", arb_error_kind()).prop_map(|(message, error_kind)| ThreadState::Error {
            message,
            error_kind,
        }),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        ".{0,40}".prop_map(|text| Event::UserMessage { text }),
        Just(Event::UserCancel),
        prop::collection::vec(arb_tool_call(), 0..3).prop_map(|tool_calls| {
            let content = tool_calls
                .iter()
                .map(|call| ContentBlock::tool_use(
                    call.id.clone(),
                    call.name().to_string(),
                    call.input.to_value(),
                ))
                .collect();
            Event::LlmResponse {
                content,
                tool_calls,
                usage: Usage::default(),
            }
        }),
        (".{0,20}", arb_error_kind(), 1u32..=5).prop_map(|(message, error_kind, attempt)| {
            Event::LlmError {
                message,
                error_kind,
                attempt,
                retry_after: None,
            }
        }),
        (1u32..=5).prop_map(|attempt| Event::RetryTimeout { attempt }),
        ("call_[0-9]{1,3}", ".{0,20}").prop_map(|(id, output)| Event::ToolComplete {
            tool_use_id: id.clone(),
            result: ToolResult::success(id, output),
        }),
    ]
}

proptest! {
    /// The transition function never panics, whatever arrives
    #[test]
    fn transition_is_total(state in arb_state(), event in arb_event()) {
        let ctx = ThreadContext::new("t-prop", "mock");
        let _ = transition(&state, &ctx, event);
    }

    /// Every transition that changes state checkpoints the new state
    #[test]
    fn state_changes_are_checkpointed(state in arb_state(), event in arb_event()) {
        let ctx = ThreadContext::new("t-prop", "mock");
        if let Ok(result) = transition(&state, &ctx, event) {
            if result.new_state != state {
                prop_assert!(
                    result.effects.iter().any(|e| matches!(e, Effect::PersistState)),
                    "state changed without a checkpoint: {state:?} -> {:?}",
                    result.new_state
                );
            }
        }
    }

    /// A user message on a ready thread always starts the chat node
    #[test]
    fn ready_thread_accepts_user_message(text in ".{1,40}") {
        let ctx = ThreadContext::new("t-prop", "mock");
        let result = transition(&ThreadState::Idle, &ctx, Event::UserMessage { text }).unwrap();
        prop_assert_eq!(result.new_state, ThreadState::LlmRequesting { attempt: 1 });
        prop_assert!(result.effects.iter().any(|e| matches!(e, Effect::RequestLlm)));
    }

    /// Busy threads never accept user messages
    #[test]
    fn busy_thread_rejects_user_message(
        state in arb_state().prop_filter("busy states only", ThreadState::is_busy),
        text in ".{0,40}",
    ) {
        let ctx = ThreadContext::new("t-prop", "mock");
        let is_err = transition(&state, &ctx, Event::UserMessage { text }).is_err();
        prop_assert!(is_err);
    }

    /// A response with tool calls always routes to the tools node and
    /// executes the first call
    #[test]
    fn tool_calls_route_to_tools_node(calls in prop::collection::vec(arb_tool_call(), 1..4)) {
        let ctx = ThreadContext::new("t-prop", "mock");
        let first_id = calls[0].id.clone();
        let result = transition(
            &ThreadState::LlmRequesting { attempt: 1 },
            &ctx,
            Event::LlmResponse {
                content: vec![],
                tool_calls: calls.clone(),
                usage: Usage::default(),
            },
        ).unwrap();

        match result.new_state {
            ThreadState::ToolExecuting { current_tool, remaining_tools } => {
                prop_assert_eq!(&current_tool.id, &first_id);
                prop_assert_eq!(remaining_tools.len(), calls.len() - 1);
            }
            other => prop_assert!(false, "expected ToolExecuting, got {other:?}"),
        }
        let executes_first = result.effects.iter().any(
            |e| matches!(e, Effect::ExecuteTool { tool } if tool.id == first_id)
        );
        prop_assert!(executes_first);
    }
}
