//! Dialog state persistence
//!
//! One row per conversation holding its dialog stack as JSON. Each save is a
//! single UPSERT, so a stack is either fully written or not at all.

mod schema;

pub use schema::*;

use crate::dialog::DialogStack;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to encode dialog stack: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Stored dialog stack for {conversation_id} is unreadable: {reason}")]
    CorruptStack {
        conversation_id: String,
        reason: String,
    },
    #[error("Database lock poisoned")]
    LockPoisoned,
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

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Dialog Stack Operations ====================

    /// Stack for a conversation; empty if none was ever saved
    pub fn load_dialog_stack(&self, conversation_id: &str) -> DbResult<DialogStack> {
        Ok(self
            .get_stored_stack(conversation_id)?
            .map(|stored| stored.stack)
            .unwrap_or_default())
    }

    pub fn get_stored_stack(&self, conversation_id: &str) -> DbResult<Option<StoredStack>> {
        let conn = self.conn()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT stack, updated_at FROM dialog_stacks WHERE conversation_id = ?1",
                params![conversation_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((json, updated_at)) = row else {
            return Ok(None);
        };
        let stack: DialogStack =
            serde_json::from_str(&json).map_err(|e| DbError::CorruptStack {
                conversation_id: conversation_id.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Some(StoredStack {
            conversation_id: conversation_id.to_string(),
            stack,
            updated_at: parse_datetime(&updated_at),
        }))
    }

    /// Replace the stored stack in one statement
    pub fn save_dialog_stack(&self, conversation_id: &str, stack: &DialogStack) -> DbResult<()> {
        let json = serde_json::to_string(stack)?;
        let depth = i64::try_from(stack.depth()).unwrap_or(i64::MAX);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO dialog_stacks (conversation_id, stack, depth, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(conversation_id) DO UPDATE SET
                stack = excluded.stack,
                depth = excluded.depth,
                updated_at = excluded.updated_at",
            params![conversation_id, json, depth, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Remove a conversation's stack; true if one existed
    pub fn clear_dialog_stack(&self, conversation_id: &str) -> DbResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM dialog_stacks WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        Ok(removed > 0)
    }

    /// All conversations with saved state, most recently touched first
    pub fn list_dialog_stacks(&self) -> DbResult<Vec<StackSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT conversation_id, depth, updated_at FROM dialog_stacks ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let depth: i64 = row.get(1)?;
            Ok(StackSummary {
                conversation_id: row.get(0)?,
                depth: usize::try_from(depth).unwrap_or_default(),
                updated_at: parse_datetime(&row.get::<_, String>(2)?),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
