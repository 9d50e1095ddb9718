//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::db::{Message, MessageContent, ThreadState, UsageData};
use crate::llm::{LlmError, LlmRequest, LlmResponse};
use crate::tools::ToolOutput;
use async_trait::async_trait;
use serde_json::Value;

/// Storage for thread messages
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message to the thread
    async fn add_message(
        &self,
        thread_id: &str,
        content: &MessageContent,
        usage_data: Option<&UsageData>,
    ) -> Result<Message, String>;

    /// Get all messages for a thread
    async fn get_messages(&self, thread_id: &str) -> Result<Vec<Message>, String>;
}

/// Storage for checkpointed thread state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Update the thread state (checkpoint write)
    async fn update_state(&self, thread_id: &str, state: &ThreadState) -> Result<(), String>;

    /// Get the current thread state
    #[allow(dead_code)] // API completeness
    async fn get_state(&self, thread_id: &str) -> Result<ThreadState, String>;
}

/// Storage for thread titles
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Get the stored title, if any
    async fn get_title(&self, thread_id: &str) -> Result<Option<String>, String>;

    /// Save (upsert) the title
    async fn save_title(&self, thread_id: &str, title: &str) -> Result<(), String>;
}

/// Client for making LLM requests
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete an LLM request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    #[allow(dead_code)] // API completeness
    fn model_id(&self) -> &str;
}

/// Executor for tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a tool by name; None when no such tool exists
    async fn execute(&self, name: &str, input: Value) -> Option<ToolOutput>;

    /// Get tool definitions for the LLM
    fn definitions(&self) -> Vec<crate::llm::ToolDefinition>;
}

/// Combined storage trait for convenience
pub trait Storage: MessageStore + StateStore + SummaryStore {}
impl<T: MessageStore + StateStore + SummaryStore> Storage for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

use std::sync::Arc;

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn add_message(
        &self,
        thread_id: &str,
        content: &MessageContent,
        usage_data: Option<&UsageData>,
    ) -> Result<Message, String> {
        (**self).add_message(thread_id, content, usage_data).await
    }

    async fn get_messages(&self, thread_id: &str) -> Result<Vec<Message>, String> {
        (**self).get_messages(thread_id).await
    }
}

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn update_state(&self, thread_id: &str, state: &ThreadState) -> Result<(), String> {
        (**self).update_state(thread_id, state).await
    }

    async fn get_state(&self, thread_id: &str) -> Result<ThreadState, String> {
        (**self).get_state(thread_id).await
    }
}

#[async_trait]
impl<T: SummaryStore + ?Sized> SummaryStore for Arc<T> {
    async fn get_title(&self, thread_id: &str) -> Result<Option<String>, String> {
        (**self).get_title(thread_id).await
    }

    async fn save_title(&self, thread_id: &str, title: &str) -> Result<(), String> {
        (**self).save_title(thread_id, title).await
    }
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).complete(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(&self, name: &str, input: Value) -> Option<ToolOutput> {
        (**self).execute(name, input).await
    }

    fn definitions(&self) -> Vec<crate::llm::ToolDefinition> {
        (**self).definitions()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

use crate::db::Database;
use crate::llm::ModelRegistry;
use crate::tools::ToolRegistry;

/// Adapter to use Database as Storage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for DatabaseStorage {
    async fn add_message(
        &self,
        thread_id: &str,
        content: &MessageContent,
        usage_data: Option<&UsageData>,
    ) -> Result<Message, String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.db
            .add_message(&id, thread_id, content, usage_data)
            .map_err(|e| e.to_string())
    }

    async fn get_messages(&self, thread_id: &str) -> Result<Vec<Message>, String> {
        self.db.get_messages(thread_id).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl StateStore for DatabaseStorage {
    async fn update_state(&self, thread_id: &str, state: &ThreadState) -> Result<(), String> {
        self.db
            .update_thread_state(thread_id, state)
            .map_err(|e| e.to_string())
    }

    async fn get_state(&self, thread_id: &str) -> Result<ThreadState, String> {
        let thread = self.db.get_thread(thread_id).map_err(|e| e.to_string())?;
        Ok(thread.state)
    }
}

#[async_trait]
impl SummaryStore for DatabaseStorage {
    async fn get_title(&self, thread_id: &str) -> Result<Option<String>, String> {
        self.db
            .get_thread_summary(thread_id)
            .map_err(|e| e.to_string())
    }

    async fn save_title(&self, thread_id: &str, title: &str) -> Result<(), String> {
        self.db
            .save_thread_summary(thread_id, title)
            .map_err(|e| e.to_string())
    }
}

/// Adapter to use `ModelRegistry` as `LlmClient`
pub struct RegistryLlmClient {
    registry: Arc<ModelRegistry>,
    model_id: String,
}

impl RegistryLlmClient {
    pub fn new(registry: Arc<ModelRegistry>, model_id: String) -> Self {
        Self { registry, model_id }
    }
}

#[async_trait]
impl LlmClient for RegistryLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let llm = self
            .registry
            .get(&self.model_id)
            .or_else(|| self.registry.default())
            .ok_or_else(|| LlmError::network("No LLM available"))?;
        llm.complete(request).await
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Adapter to use `ToolRegistry` as `ToolExecutor`
pub struct ToolRegistryExecutor {
    registry: ToolRegistry,
}

impl ToolRegistryExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistryExecutor {
    async fn execute(&self, name: &str, input: Value) -> Option<ToolOutput> {
        self.registry.execute(name, input).await
    }

    fn definitions(&self) -> Vec<crate::llm::ToolDefinition> {
        self.registry.definitions()
    }
}
