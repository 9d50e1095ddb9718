//! Thread state types

use crate::db::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Tool Input Types - Strongly typed inputs for each tool
// ============================================================================

/// Input for the `web_search` tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchInput {
    pub query: String,
}

/// Input for the `stock_quote` tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockQuoteInput {
    pub symbol: String,
}

/// Strongly typed tool input enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_tool", rename_all = "snake_case")]
pub enum ToolInput {
    WebSearch(WebSearchInput),
    StockQuote(StockQuoteInput),
    /// Fallback for unknown tools or parsing failures
    Unknown {
        name: String,
        input: Value,
    },
}

impl ToolInput {
    /// Get the tool name
    pub fn tool_name(&self) -> &str {
        match self {
            ToolInput::WebSearch(_) => "web_search",
            ToolInput::StockQuote(_) => "stock_quote",
            ToolInput::Unknown { name, .. } => name,
        }
    }

    /// Convert to JSON Value for tool execution
    pub fn to_value(&self) -> Value {
        match self {
            ToolInput::WebSearch(input) => serde_json::to_value(input).unwrap_or(Value::Null),
            ToolInput::StockQuote(input) => serde_json::to_value(input).unwrap_or(Value::Null),
            ToolInput::Unknown { input, .. } => input.clone(),
        }
    }

    /// Parse from tool name and JSON value
    pub fn from_name_and_value(name: &str, value: Value) -> Self {
        match name {
            "web_search" => serde_json::from_value(value.clone()).map_or_else(
                |_| ToolInput::Unknown {
                    name: name.to_string(),
                    input: value,
                },
                ToolInput::WebSearch,
            ),
            "stock_quote" => serde_json::from_value(value.clone()).map_or_else(
                |_| ToolInput::Unknown {
                    name: name.to_string(),
                    input: value,
                },
                ToolInput::StockQuote,
            ),
            _ => ToolInput::Unknown {
                name: name.to_string(),
                input: value,
            },
        }
    }
}

// ============================================================================
// Tool Call - A tool invocation with ID and typed input
// ============================================================================

/// A tool call from the LLM with typed input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub input: ToolInput,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, input: ToolInput) -> Self {
        Self {
            id: id.into(),
            input,
        }
    }

    /// Get the tool name
    pub fn name(&self) -> &str {
        self.input.tool_name()
    }
}

// ============================================================================
// Thread State
// ============================================================================

/// Checkpointed position of a thread in the conversation graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadState {
    /// Ready for user input, no pending operations
    #[default]
    Idle,

    /// Chat node: LLM request in flight, with retry tracking
    LlmRequesting { attempt: u32 },

    /// Tools node: executing tool calls serially
    ToolExecuting {
        /// The current tool being executed
        current_tool: ToolCall,
        /// Remaining tools to execute after current completes
        remaining_tools: Vec<ToolCall>,
    },

    /// User requested cancellation of LLM request, waiting for it to settle
    CancellingLlm,

    /// User requested cancellation of tool execution, waiting for abort
    CancellingTool {
        /// The tool being aborted
        tool_use_id: String,
        /// Tool calls that will not run
        skipped_tools: Vec<ToolCall>,
    },

    /// Error occurred - UI displays this state directly
    Error {
        message: String,
        error_kind: ErrorKind,
    },
}

impl ThreadState {
    /// Check if the thread is mid-turn (cannot accept a new user message)
    pub fn is_busy(&self) -> bool {
        !matches!(self, ThreadState::Idle | ThreadState::Error { .. })
    }
}

// ============================================================================
// Thread Context
// ============================================================================

/// Context for a thread (immutable configuration)
#[derive(Debug, Clone)]
pub struct ThreadContext {
    pub thread_id: String,
    pub model_id: String,
}

impl ThreadContext {
    pub fn new(thread_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            model_id: model_id.into(),
        }
    }
}
