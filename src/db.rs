//! Database module
//!
//! Persistence for threads, messages and thread summaries. Thread state
//! is checkpointed as JSON in the `threads.state` column; replaying a
//! thread is loading that state plus the append-only message log.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Thread Operations ====================

    /// Create a new thread
    pub fn create_thread(&self, id: &str, model: Option<&str>) -> DbResult<Thread> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let idle_state = serde_json::to_string(&ThreadState::Idle).unwrap();

        conn.execute(
            "INSERT INTO threads (id, state, state_updated_at, created_at, updated_at, archived, model)
             VALUES (?1, ?2, ?3, ?3, ?3, 0, ?4)",
            params![id, idle_state, now.to_rfc3339(), model],
        )?;

        Ok(Thread {
            id: id.to_string(),
            state: ThreadState::Idle,
            state_updated_at: now,
            created_at: now,
            updated_at: now,
            archived: false,
            model: model.map(String::from),
            title: None,
            message_count: 0,
        })
    }

    /// Get thread by ID
    pub fn get_thread(&self, id: &str) -> DbResult<Thread> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.state, t.state_updated_at, t.created_at, t.updated_at,
                    t.archived, t.model, s.title,
                    (SELECT COUNT(*) FROM messages m WHERE m.thread_id = t.id) as message_count
             FROM threads t
             LEFT JOIN thread_summaries s ON s.thread_id = t.id
             WHERE t.id = ?1",
        )?;

        stmt.query_row(params![id], row_to_thread).map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::ThreadNotFound(id.to_string()),
            other => DbError::Sqlite(other),
        })
    }

    /// List active (non-archived) threads, most recently updated first
    pub fn list_threads(&self) -> DbResult<Vec<Thread>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.state, t.state_updated_at, t.created_at, t.updated_at,
                    t.archived, t.model, s.title,
                    (SELECT COUNT(*) FROM messages m WHERE m.thread_id = t.id) as message_count
             FROM threads t
             LEFT JOIN thread_summaries s ON s.thread_id = t.id
             WHERE t.archived = 0
             ORDER BY t.updated_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_thread)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Update thread state (checkpoint write)
    pub fn update_thread_state(&self, id: &str, state: &ThreadState) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let state_json = serde_json::to_string(state).unwrap();

        let updated = conn.execute(
            "UPDATE threads SET state = ?1, state_updated_at = ?2, updated_at = ?2 WHERE id = ?3",
            params![state_json, now.to_rfc3339(), id],
        )?;

        if updated == 0 {
            return Err(DbError::ThreadNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Archive a thread
    pub fn archive_thread(&self, id: &str) -> DbResult<()> {
        self.set_archived(id, true)
    }

    /// Unarchive a thread
    pub fn unarchive_thread(&self, id: &str) -> DbResult<()> {
        self.set_archived(id, false)
    }

    fn set_archived(&self, id: &str, archived: bool) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let updated = conn.execute(
            "UPDATE threads SET archived = ?1, updated_at = ?2 WHERE id = ?3",
            params![archived, now.to_rfc3339(), id],
        )?;

        if updated == 0 {
            return Err(DbError::ThreadNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete a thread, its messages and its summary
    pub fn delete_thread(&self, id: &str) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();

        // Messages are deleted by CASCADE; the summary row is independent
        conn.execute("DELETE FROM thread_summaries WHERE thread_id = ?1", params![id])?;
        let deleted = conn.execute("DELETE FROM threads WHERE id = ?1", params![id])?;

        if deleted == 0 {
            return Err(DbError::ThreadNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Reset all threads to idle on server restart.
    /// Also repairs any orphaned tool call by injecting a synthetic tool result.
    pub fn reset_all_to_idle(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let idle_state = serde_json::to_string(&ThreadState::Idle).unwrap();

        self.repair_orphaned_tool_calls_internal(&conn, &now)?;

        conn.execute(
            "UPDATE threads SET state = ?1, state_updated_at = ?2, updated_at = ?2
             WHERE json_extract(state, '$.type') != 'idle'",
            params![idle_state, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Scan all threads for agent messages whose tool calls have no matching
    /// tool result in the following messages, and inject a synthetic result.
    /// Without this the next LLM request would be rejected by the provider.
    fn repair_orphaned_tool_calls_internal(
        &self,
        conn: &Connection,
        now: &DateTime<Utc>,
    ) -> DbResult<()> {
        use crate::llm::ContentBlock;

        let mut thread_stmt = conn.prepare("SELECT id FROM threads")?;
        let thread_ids: Vec<String> = thread_stmt
            .query_map([], |row| row.get(0))?
            .filter_map(Result::ok)
            .collect();

        for thread_id in thread_ids {
            let mut msg_stmt = conn.prepare(
                "SELECT sequence_id, message_type, content
                 FROM messages WHERE thread_id = ?1 ORDER BY sequence_id ASC",
            )?;

            let messages: Vec<(i64, String, String)> = msg_stmt
                .query_map(params![thread_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .filter_map(Result::ok)
                .collect();

            let mut pending_tool_ids: Vec<String> = Vec::new();
            let mut max_sequence_id: i64 = 0;

            for (seq_id, msg_type, content) in &messages {
                max_sequence_id = *seq_id;

                if msg_type == "agent" {
                    if let Ok(blocks) = serde_json::from_str::<Vec<ContentBlock>>(content) {
                        for block in blocks {
                            if let ContentBlock::ToolUse { id, .. } = block {
                                pending_tool_ids.push(id);
                            }
                        }
                    }
                } else if msg_type == "tool" {
                    if let Ok(tool_content) = serde_json::from_str::<ToolContent>(content) {
                        pending_tool_ids.retain(|id| id != &tool_content.tool_use_id);
                    }
                }
            }

            for tool_id in pending_tool_ids {
                max_sequence_id += 1;
                let msg_id = uuid::Uuid::new_v4().to_string();
                let content = MessageContent::tool(
                    &tool_id,
                    "[Tool execution interrupted by server restart]",
                    true,
                );
                let content_json =
                    serde_json::to_string(&content).unwrap_or_else(|_| "{}".to_string());

                conn.execute(
                    "INSERT INTO messages (message_id, thread_id, sequence_id, message_type, content, created_at)
                     VALUES (?1, ?2, ?3, 'tool', ?4, ?5)",
                    params![msg_id, thread_id, max_sequence_id, content_json, now.to_rfc3339()],
                )?;

                tracing::info!(
                    thread_id = %thread_id,
                    tool_id = %tool_id,
                    "Injected synthetic tool result for orphaned tool call"
                );
            }
        }

        Ok(())
    }

    // ==================== Message Operations ====================

    /// Add a message to a thread, assigning the next sequence id
    pub fn add_message(
        &self,
        message_id: &str,
        thread_id: &str,
        content: &MessageContent,
        usage_data: Option<&UsageData>,
    ) -> DbResult<Message> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let sequence_id: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM messages WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;

        let message_type = content.message_type();
        let content_json = serde_json::to_string(&content.to_json()).unwrap();
        let usage_json = usage_data.map(|u| serde_json::to_string(u).unwrap());

        conn.execute(
            "INSERT INTO messages (message_id, thread_id, sequence_id, message_type, content, usage_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message_id,
                thread_id,
                sequence_id,
                message_type.to_string(),
                content_json,
                usage_json,
                now.to_rfc3339()
            ],
        )?;

        conn.execute(
            "UPDATE threads SET updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), thread_id],
        )?;

        Ok(Message {
            message_id: message_id.to_string(),
            thread_id: thread_id.to_string(),
            sequence_id,
            message_type,
            content: content.clone(),
            usage_data: usage_data.cloned(),
            created_at: now,
        })
    }

    /// Get all messages for a thread in sequence order
    pub fn get_messages(&self, thread_id: &str) -> DbResult<Vec<Message>> {
        self.query_messages(
            "SELECT message_id, thread_id, sequence_id, message_type, content, usage_data, created_at
             FROM messages WHERE thread_id = ?1 ORDER BY sequence_id ASC",
            params![thread_id],
        )
    }

    /// Get messages after a given sequence id
    pub fn get_messages_after(&self, thread_id: &str, after: i64) -> DbResult<Vec<Message>> {
        self.query_messages(
            "SELECT message_id, thread_id, sequence_id, message_type, content, usage_data, created_at
             FROM messages WHERE thread_id = ?1 AND sequence_id > ?2 ORDER BY sequence_id ASC",
            params![thread_id, after],
        )
    }

    fn query_messages(
        &self,
        sql: &str,
        query_params: impl rusqlite::Params,
    ) -> DbResult<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;

        let rows = stmt.query_map(query_params, |row| {
            let message_type_str: String = row.get(3)?;
            let content_str: String = row.get(4)?;
            let usage_str: Option<String> = row.get(5)?;

            let message_type = MessageType::parse(&message_type_str)
                .unwrap_or(MessageType::Error);
            let content_value: serde_json::Value =
                serde_json::from_str(&content_str).unwrap_or(serde_json::Value::Null);
            let content = MessageContent::from_json(message_type, content_value)
                .unwrap_or_else(|e| MessageContent::error(format!("Unreadable message: {e}")));
            let usage_data = usage_str.and_then(|s| serde_json::from_str(&s).ok());

            Ok(Message {
                message_id: row.get(0)?,
                thread_id: row.get(1)?,
                sequence_id: row.get(2)?,
                message_type,
                content,
                usage_data,
                created_at: parse_datetime(&row.get::<_, String>(6)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Get the highest sequence id in a thread (0 when empty)
    pub fn get_last_sequence_id(&self, thread_id: &str) -> DbResult<i64> {
        let conn = self.conn.lock().unwrap();
        let last: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_id), 0) FROM messages WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;
        Ok(last)
    }

    // ==================== Summary Operations ====================

    /// Save (upsert) a thread title
    pub fn save_thread_summary(&self, thread_id: &str, title: &str) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO thread_summaries (thread_id, title, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(thread_id) DO UPDATE SET
                 title = excluded.title,
                 updated_at = excluded.updated_at",
            params![thread_id, title],
        )?;
        Ok(())
    }

    /// Get the stored title for a thread, if any
    pub fn get_thread_summary(&self, thread_id: &str) -> DbResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT title FROM thread_summaries WHERE thread_id = ?1")?;
        let mut rows = stmt.query_map(params![thread_id], |row| row.get(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Load all thread summaries, most recently updated first
    pub fn load_thread_summaries(&self) -> DbResult<Vec<ThreadSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT thread_id, title, updated_at FROM thread_summaries ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ThreadSummary {
                thread_id: row.get(0)?,
                title: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<Thread> {
    let state_json: String = row.get(1)?;
    let state: ThreadState = serde_json::from_str(&state_json).unwrap_or_default();
    Ok(Thread {
        id: row.get(0)?,
        state,
        state_updated_at: parse_datetime(&row.get::<_, String>(2)?),
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
        archived: row.get(5)?,
        model: row.get(6)?,
        title: row.get(7)?,
        message_count: row.get(8)?,
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
