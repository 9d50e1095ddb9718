//! HTTP API
//!
//! The HTTP + SSE surface is the UI contract: clients replay a thread's
//! checkpointed state from the `init` SSE event and re-render on the
//! incremental events that follow.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::db::Database;
use crate::llm::ModelRegistry;
use crate::runtime::ThreadManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ThreadManager>,
    pub llm_registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(db: Database, llm_registry: Arc<ModelRegistry>) -> Self {
        Self {
            runtime: Arc::new(ThreadManager::new(db, llm_registry.clone())),
            llm_registry,
        }
    }
}
