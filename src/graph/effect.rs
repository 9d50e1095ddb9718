//! Effects produced by state transitions

use crate::db::{MessageContent, UsageData};
use crate::graph::state::ToolCall;
use serde_json::Value;
use std::time::Duration;

/// Effects to be executed after a state transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Persist a message to the database
    PersistMessage {
        content: MessageContent,
        usage: Option<UsageData>,
    },

    /// Persist the new state (checkpoint write)
    PersistState,

    /// Make an LLM request
    RequestLlm,

    /// Execute a tool (spawns as background task)
    ExecuteTool { tool: ToolCall },

    /// Abort the currently running tool
    AbortTool { tool_use_id: String },

    /// Abort the currently running LLM request
    AbortLlm,

    /// Notify connected clients
    NotifyClient { event_type: String, data: Value },

    /// Schedule a retry
    ScheduleRetry { delay: Duration, attempt: u32 },
}

impl Effect {
    pub fn persist_user_message(text: impl Into<String>) -> Self {
        Effect::PersistMessage {
            content: MessageContent::user(text),
            usage: None,
        }
    }

    pub fn persist_agent_message(
        content: Vec<crate::llm::ContentBlock>,
        usage: Option<UsageData>,
    ) -> Self {
        Effect::PersistMessage {
            content: MessageContent::agent(content),
            usage,
        }
    }

    pub fn persist_tool_message(
        tool_use_id: impl Into<String>,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Effect::PersistMessage {
            content: MessageContent::tool(tool_use_id, output, is_error),
            usage: None,
        }
    }

    #[allow(clippy::needless_pass_by_value)] // data is consumed by json! macro
    pub fn notify_state_change(state: &str, data: Value) -> Self {
        Effect::NotifyClient {
            event_type: "state_change".to_string(),
            data: serde_json::json!({
                "state": state,
                "state_data": data
            }),
        }
    }

    pub fn notify_turn_done() -> Self {
        Effect::NotifyClient {
            event_type: "turn_done".to_string(),
            data: Value::Null,
        }
    }
}
