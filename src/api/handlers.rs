//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    CancelResponse, ChatRequest, ChatResponse, CreateThreadRequest, ErrorResponse, ModelsResponse,
    RenameRequest, SuccessResponse, SummaryListResponse, ThreadListResponse, ThreadResponse,
    ThreadWithMessagesResponse,
};
use super::AppState;
use crate::graph::Event;
use crate::runtime::SseEvent;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Thread listing
        .route("/api/threads", get(list_threads))
        .route("/api/summaries", get(list_summaries))
        // Thread creation
        .route("/api/threads/new", post(create_thread))
        // Thread retrieval (replay)
        .route("/api/threads/:id", get(get_thread))
        // SSE streaming
        .route("/api/threads/:id/stream", get(stream_thread))
        // User actions
        .route("/api/threads/:id/chat", post(send_chat))
        .route("/api/threads/:id/cancel", post(cancel_thread))
        // Lifecycle
        .route("/api/threads/:id/archive", post(archive_thread))
        .route("/api/threads/:id/unarchive", post(unarchive_thread))
        .route("/api/threads/:id/delete", post(delete_thread))
        .route("/api/threads/:id/rename", post(rename_thread))
        // Model info
        .route("/api/models", get(list_models))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Thread Listing
// ============================================================

async fn list_threads(
    State(state): State<AppState>,
) -> Result<Json<ThreadListResponse>, AppError> {
    let threads = state
        .runtime
        .db()
        .list_threads()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let json_threads: Vec<Value> = threads
        .into_iter()
        .map(|t| serde_json::to_value(t).unwrap_or(Value::Null))
        .collect();

    Ok(Json(ThreadListResponse {
        threads: json_threads,
    }))
}

/// Raw `thread_summaries` rows, most recently updated first
async fn list_summaries(
    State(state): State<AppState>,
) -> Result<Json<SummaryListResponse>, AppError> {
    let summaries = state
        .runtime
        .db()
        .load_thread_summaries()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(SummaryListResponse { summaries }))
}

// ============================================================
// Thread Creation
// ============================================================

async fn create_thread(
    State(state): State<AppState>,
    Json(req): Json<CreateThreadRequest>,
) -> Result<Json<ThreadResponse>, AppError> {
    if let Some(model) = &req.model {
        if state.llm_registry.get(model).is_none() {
            return Err(AppError::BadRequest(format!("Unknown model: {model}")));
        }
    }

    let id = uuid::Uuid::new_v4().to_string();

    let thread = state
        .runtime
        .db()
        .create_thread(&id, req.model.as_deref())
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(ThreadResponse {
        thread: serde_json::to_value(thread).unwrap_or(Value::Null),
    }))
}

// ============================================================
// Thread Retrieval (replay)
// ============================================================

#[derive(Debug, Deserialize)]
struct GetThreadQuery {
    after_sequence: Option<i64>,
}

async fn get_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<GetThreadQuery>,
) -> Result<Json<ThreadWithMessagesResponse>, AppError> {
    let thread = state
        .runtime
        .db()
        .get_thread(&id)
        .map_err(|e| AppError::NotFound(e.to_string()))?;

    let messages = if let Some(after) = query.after_sequence {
        state.runtime.db().get_messages_after(&id, after)
    } else {
        state.runtime.db().get_messages(&id)
    }
    .map_err(|e| AppError::Internal(e.to_string()))?;

    let json_msgs: Vec<Value> = messages
        .iter()
        .map(|m| serde_json::to_value(m).unwrap_or(Value::Null))
        .collect();

    Ok(Json(ThreadWithMessagesResponse {
        busy: thread.is_busy(),
        thread: serde_json::to_value(&thread).unwrap_or(Value::Null),
        messages: json_msgs,
    }))
}

// ============================================================
// SSE Streaming
// ============================================================

#[derive(Debug, Deserialize)]
struct StreamQuery {
    after: Option<i64>,
}

async fn stream_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<impl IntoResponse, AppError> {
    let thread = state
        .runtime
        .db()
        .get_thread(&id)
        .map_err(|e| AppError::NotFound(e.to_string()))?;

    let messages = if let Some(after) = query.after {
        state.runtime.db().get_messages_after(&id, after)
    } else {
        state.runtime.db().get_messages(&id)
    }
    .map_err(|e| AppError::Internal(e.to_string()))?;

    let last_sequence_id = state.runtime.db().get_last_sequence_id(&id).unwrap_or(0);

    let json_msgs: Vec<Value> = messages
        .iter()
        .map(|m| serde_json::to_value(m).unwrap_or(Value::Null))
        .collect();

    // Subscribe to updates before building the replay so nothing is missed
    let broadcast_rx = state
        .runtime
        .subscribe(&id)
        .await
        .map_err(AppError::Internal)?;

    let init_event = SseEvent::Init {
        busy: thread.is_busy(),
        thread: serde_json::to_value(&thread).unwrap_or(Value::Null),
        messages: json_msgs,
        last_sequence_id,
    };

    Ok(sse_stream(init_event, broadcast_rx))
}

// ============================================================
// User Actions
// ============================================================

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Message text is empty".to_string()));
    }

    state
        .runtime
        .send_event(&id, Event::UserMessage { text: req.text })
        .await
        .map_err(AppError::BadRequest)?;

    Ok(Json(ChatResponse { queued: true }))
}

async fn cancel_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    state
        .runtime
        .send_event(&id, Event::UserCancel)
        .await
        .map_err(AppError::BadRequest)?;

    Ok(Json(CancelResponse { ok: true }))
}

// ============================================================
// Lifecycle
// ============================================================

async fn archive_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .runtime
        .db()
        .archive_thread(&id)
        .map_err(|e| AppError::NotFound(e.to_string()))?;

    Ok(Json(SuccessResponse { success: true }))
}

async fn unarchive_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .runtime
        .db()
        .unarchive_thread(&id)
        .map_err(|e| AppError::NotFound(e.to_string()))?;

    Ok(Json(SuccessResponse { success: true }))
}

async fn delete_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .runtime
        .db()
        .delete_thread(&id)
        .map_err(|e| AppError::NotFound(e.to_string()))?;

    state.runtime.evict(&id).await;

    Ok(Json(SuccessResponse { success: true }))
}

async fn rename_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<ThreadResponse>, AppError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("Title is empty".to_string()));
    }

    // Ensure the thread exists before writing the summary row
    state
        .runtime
        .db()
        .get_thread(&id)
        .map_err(|e| AppError::NotFound(e.to_string()))?;

    state
        .runtime
        .db()
        .save_thread_summary(&id, title)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let thread = state
        .runtime
        .db()
        .get_thread(&id)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(ThreadResponse {
        thread: serde_json::to_value(thread).unwrap_or(Value::Null),
    }))
}

// ============================================================
// Model Info
// ============================================================

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = state.llm_registry.available_model_info();

    Json(ModelsResponse {
        models,
        default: state.llm_registry.default_model_id().to_string(),
    })
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("quill ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
