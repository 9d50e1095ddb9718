//! Database schema and types

use crate::llm::ContentBlock;
pub use crate::graph::state::ThreadState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS threads (
    id               TEXT PRIMARY KEY,
    state            TEXT NOT NULL DEFAULT '{"type":"idle"}',
    state_updated_at TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    archived         BOOLEAN NOT NULL DEFAULT 0,
    model            TEXT
);

CREATE INDEX IF NOT EXISTS idx_threads_updated ON threads(updated_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    message_id   TEXT PRIMARY KEY,
    thread_id    TEXT NOT NULL,
    sequence_id  INTEGER NOT NULL,
    message_type TEXT NOT NULL,
    content      TEXT NOT NULL,
    usage_data   TEXT,
    created_at   TEXT NOT NULL,

    FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id, sequence_id);

CREATE TABLE IF NOT EXISTS thread_summaries (
    thread_id   TEXT PRIMARY KEY,
    title       TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Thread record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub state: ThreadState,
    pub state_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived: bool,
    pub model: Option<String>,
    /// Title from `thread_summaries`, if one has been generated
    pub title: Option<String>,
    pub message_count: i64,
}

impl Thread {
    /// Check if the thread is mid-turn
    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }
}

/// A `thread_summaries` row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub title: String,
    pub updated_at: String,
}

/// Error classification for UI display and retry decisions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    RateLimit,
    Network,
    ServerError,
    InvalidRequest,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}

impl From<crate::llm::LlmErrorKind> for ErrorKind {
    fn from(kind: crate::llm::LlmErrorKind) -> Self {
        use crate::llm::LlmErrorKind;
        match kind {
            LlmErrorKind::Auth => ErrorKind::Auth,
            LlmErrorKind::RateLimit => ErrorKind::RateLimit,
            LlmErrorKind::Network => ErrorKind::Network,
            LlmErrorKind::ServerError => ErrorKind::ServerError,
            LlmErrorKind::InvalidRequest => ErrorKind::InvalidRequest,
            LlmErrorKind::Unknown => ErrorKind::Unknown,
        }
    }
}

/// Tool execution result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool_use_id: String, output: String) -> Self {
        Self {
            tool_use_id,
            success: true,
            output,
            is_error: false,
        }
    }

    pub fn error(tool_use_id: String, error: String) -> Self {
        Self {
            tool_use_id,
            success: false,
            output: error,
            is_error: true,
        }
    }

    pub fn cancelled(tool_use_id: String, message: &str) -> Self {
        Self {
            tool_use_id,
            success: false,
            output: message.to_string(),
            is_error: false,
        }
    }
}

// ============================================================
// Message Content Types
// ============================================================

/// User message content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserContent {
    pub text: String,
}

/// Tool result message content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolContent {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

/// Error message content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorContent {
    pub message: String,
}

/// Typed message content
///
/// `message_type` and `content` are stored as separate columns; the type
/// column is the discriminator when deserializing.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    User(UserContent),
    Agent(Vec<ContentBlock>),
    Tool(ToolContent),
    Error(ErrorContent),
}

impl MessageContent {
    /// Get the message type for this content
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::User(_) => MessageType::User,
            Self::Agent(_) => MessageType::Agent,
            Self::Tool(_) => MessageType::Tool,
            Self::Error(_) => MessageType::Error,
        }
    }

    /// Serialize content to JSON value (without type tag)
    pub fn to_json(&self) -> Value {
        match self {
            Self::User(c) => serde_json::to_value(c).unwrap_or(Value::Null),
            Self::Agent(c) => serde_json::to_value(c).unwrap_or(Value::Null),
            Self::Tool(c) => serde_json::to_value(c).unwrap_or(Value::Null),
            Self::Error(c) => serde_json::to_value(c).unwrap_or(Value::Null),
        }
    }

    /// Deserialize content from JSON value using the message type as discriminator
    pub fn from_json(msg_type: MessageType, value: Value) -> Result<Self, String> {
        match msg_type {
            MessageType::User => serde_json::from_value(value)
                .map(Self::User)
                .map_err(|e| format!("Invalid user content: {e}")),
            MessageType::Agent => serde_json::from_value(value)
                .map(Self::Agent)
                .map_err(|e| format!("Invalid agent content: {e}")),
            MessageType::Tool => serde_json::from_value(value)
                .map(Self::Tool)
                .map_err(|e| format!("Invalid tool content: {e}")),
            MessageType::Error => serde_json::from_value(value)
                .map(Self::Error)
                .map_err(|e| format!("Invalid error content: {e}")),
        }
    }

    /// Create user content
    pub fn user(text: impl Into<String>) -> Self {
        Self::User(UserContent { text: text.into() })
    }

    /// Create agent content
    pub fn agent(blocks: Vec<ContentBlock>) -> Self {
        Self::Agent(blocks)
    }

    /// Create tool content
    pub fn tool(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self::Tool(ToolContent {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        })
    }

    /// Create error content
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorContent {
            message: message.into(),
        })
    }
}

// Custom Serialize for MessageContent - just serializes the inner value
impl Serialize for MessageContent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::User(c) => c.serialize(serializer),
            Self::Agent(c) => c.serialize(serializer),
            Self::Tool(c) => c.serialize(serializer),
            Self::Error(c) => c.serialize(serializer),
        }
    }
}

/// Message record
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub message_id: String,
    pub thread_id: String,
    pub sequence_id: i64,
    pub message_type: MessageType,
    pub content: MessageContent,
    pub usage_data: Option<UsageData>,
    pub created_at: DateTime<Utc>,
}

/// Message type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    User,
    Agent,
    Tool,
    Error,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::User => write!(f, "user"),
            MessageType::Agent => write!(f, "agent"),
            MessageType::Tool => write!(f, "tool"),
            MessageType::Error => write!(f, "error"),
        }
    }
}

impl MessageType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "agent" => Some(Self::Agent),
            "tool" => Some(Self::Tool),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Usage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageData {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
