//! API request and response types

use serde::{Deserialize, Serialize};

/// Request to create a new thread
#[derive(Debug, Default, Deserialize)]
pub struct CreateThreadRequest {
    /// Optional model override; the registry default is used otherwise
    #[serde(default)]
    pub model: Option<String>,
}

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Request to rename a thread
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

/// Response with a list of threads
#[derive(Debug, Serialize)]
pub struct ThreadListResponse {
    pub threads: Vec<serde_json::Value>,
}

/// Response with all thread summaries
#[derive(Debug, Serialize)]
pub struct SummaryListResponse {
    pub summaries: Vec<crate::db::ThreadSummary>,
}

/// Response with a single thread
#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub thread: serde_json::Value,
}

/// Response with a thread and its replayed messages
#[derive(Debug, Serialize)]
pub struct ThreadWithMessagesResponse {
    pub thread: serde_json::Value,
    pub messages: Vec<serde_json::Value>,
    pub busy: bool,
}

/// Response for chat action
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub queued: bool,
}

/// Response for cancel action
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub ok: bool,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Model information with metadata
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub description: String,
    pub context_window: usize,
}

/// Response for model list
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub default: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
