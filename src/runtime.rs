//! Runtime for executing threads
//!
//! One runtime task per thread, started lazily and cached. Each runtime
//! owns an event queue in and a broadcast channel out; SSE clients
//! subscribe to the broadcast side.

mod executor;
pub mod traits;

#[cfg(test)]
mod testing;

pub use executor::ThreadRuntime;
pub use traits::*;

use crate::db::Database;
use crate::graph::{Event, ThreadContext};
use crate::llm::ModelRegistry;
use crate::tools::ToolRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

/// Type alias for production runtime with concrete implementations
pub type ProductionRuntime =
    ThreadRuntime<DatabaseStorage, RegistryLlmClient, ToolRegistryExecutor>;

/// Manager for all thread runtimes
pub struct ThreadManager {
    db: Database,
    llm_registry: Arc<ModelRegistry>,
    runtimes: RwLock<HashMap<String, ThreadHandle>>,
}

/// Handle to interact with a running thread
pub struct ThreadHandle {
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_tx: broadcast::Sender<SseEvent>,
}

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    /// Replay of checkpointed state on connect
    Init {
        thread: serde_json::Value,
        messages: Vec<serde_json::Value>,
        busy: bool,
        last_sequence_id: i64,
    },
    Message {
        message: serde_json::Value,
    },
    StateChange {
        state: String,
        data: serde_json::Value,
    },
    Title {
        title: String,
    },
    TurnDone,
    Error {
        message: String,
    },
}

impl ThreadManager {
    pub fn new(db: Database, llm_registry: Arc<ModelRegistry>) -> Self {
        Self {
            db,
            llm_registry,
            runtimes: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create a runtime for a thread
    pub async fn get_or_create(&self, thread_id: &str) -> Result<ThreadHandle, String> {
        {
            let runtimes = self.runtimes.read().await;
            if let Some(handle) = runtimes.get(thread_id) {
                return Ok(ThreadHandle {
                    event_tx: handle.event_tx.clone(),
                    broadcast_tx: handle.broadcast_tx.clone(),
                });
            }
        }

        let thread = self.db.get_thread(thread_id).map_err(|e| e.to_string())?;

        let model_id = thread
            .model
            .clone()
            .unwrap_or_else(|| self.llm_registry.default_model_id().to_string());
        let context = ThreadContext::new(&thread.id, model_id.clone());

        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(128);

        let storage = DatabaseStorage::new(self.db.clone());
        let llm_client = RegistryLlmClient::new(self.llm_registry.clone(), model_id);
        let tool_executor = ToolRegistryExecutor::new(ToolRegistry::new());
        let title_llm = self.llm_registry.get_cheap_model();

        // Resume from the checkpointed state; an interrupted LLM request
        // is re-issued by the runtime on startup
        let runtime: ProductionRuntime = ThreadRuntime::new(
            context,
            thread.state.clone(),
            storage,
            llm_client,
            tool_executor,
            title_llm,
            event_rx,
            event_tx.clone(),
            broadcast_tx.clone(),
        );

        let id = thread_id.to_string();
        tokio::spawn(async move {
            runtime.run().await;
            tracing::info!(thread_id = %id, "Thread runtime finished");
        });

        let handle = ThreadHandle {
            event_tx: event_tx.clone(),
            broadcast_tx: broadcast_tx.clone(),
        };

        self.runtimes.write().await.insert(
            thread_id.to_string(),
            ThreadHandle {
                event_tx,
                broadcast_tx,
            },
        );

        Ok(handle)
    }

    /// Send an event to a thread
    pub async fn send_event(&self, thread_id: &str, event: Event) -> Result<(), String> {
        let handle = self.get_or_create(thread_id).await?;
        handle
            .event_tx
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {e}"))
    }

    /// Subscribe to thread updates
    pub async fn subscribe(
        &self,
        thread_id: &str,
    ) -> Result<broadcast::Receiver<SseEvent>, String> {
        let handle = self.get_or_create(thread_id).await?;
        Ok(handle.broadcast_tx.subscribe())
    }

    /// Drop a cached runtime handle (after delete/archive)
    pub async fn evict(&self, thread_id: &str) {
        self.runtimes.write().await.remove(thread_id);
    }

    /// Get the database handle
    pub fn db(&self) -> &Database {
        &self.db
    }
}
