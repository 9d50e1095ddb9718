//! Events that can occur on a thread

use crate::db::{ErrorKind, ToolResult};
use crate::graph::state::ToolCall;
use crate::llm::{ContentBlock, Usage};
use std::time::Duration;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserMessage {
        text: String,
    },
    UserCancel,

    // LLM events
    LlmResponse {
        content: Vec<ContentBlock>,
        /// Tool calls extracted from the content
        tool_calls: Vec<ToolCall>,
        usage: Usage,
    },
    LlmError {
        message: String,
        error_kind: ErrorKind,
        attempt: u32,
        /// Server-provided backoff hint, if any
        retry_after: Option<Duration>,
    },
    RetryTimeout {
        attempt: u32,
    },

    // Tool events
    ToolComplete {
        tool_use_id: String,
        result: ToolResult,
    },
}
