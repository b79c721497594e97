//! Database schema and types

use crate::dialog::DialogStack;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS dialog_stacks (
    conversation_id TEXT PRIMARY KEY,
    stack TEXT NOT NULL,
    depth INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dialog_stacks_updated ON dialog_stacks(updated_at DESC);
";

/// Persisted dialog position of one conversation
#[derive(Debug, Clone, Serialize)]
pub struct StoredStack {
    pub conversation_id: String,
    pub stack: DialogStack,
    pub updated_at: DateTime<Utc>,
}

/// Listing row; the stack itself is not decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackSummary {
    pub conversation_id: String,
    pub depth: usize,
    pub updated_at: DateTime<Utc>,
}
