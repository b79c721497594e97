//! Trait abstractions for runtime I/O
//!
//! The token and Graph seams live next to their production clients in
//! `crate::auth` and `crate::graph`; this module holds dialog state storage.

use crate::db::{Database, DbError};
use crate::dialog::DialogStack;
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for per-conversation dialog stacks
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Saved stack, empty when the conversation has none
    async fn load_stack(&self, conv_id: &str) -> Result<DialogStack, String>;

    /// Replace the saved stack atomically
    async fn save_stack(&self, conv_id: &str, stack: &DialogStack) -> Result<(), String>;

    async fn clear_stack(&self, conv_id: &str) -> Result<(), String>;

    /// Conversations that currently have a saved stack
    async fn conversations(&self) -> Result<Vec<String>, String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn load_stack(&self, conv_id: &str) -> Result<DialogStack, String> {
        (**self).load_stack(conv_id).await
    }

    async fn save_stack(&self, conv_id: &str, stack: &DialogStack) -> Result<(), String> {
        (**self).save_stack(conv_id, stack).await
    }

    async fn clear_stack(&self, conv_id: &str) -> Result<(), String> {
        (**self).clear_stack(conv_id).await
    }

    async fn conversations(&self) -> Result<Vec<String>, String> {
        (**self).conversations().await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a StateStore
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
impl StateStore for DatabaseStorage {
    async fn load_stack(&self, conv_id: &str) -> Result<DialogStack, String> {
        match self.db.load_dialog_stack(conv_id) {
            Ok(stack) => Ok(stack),
            // A stack we cannot read would wedge the conversation forever;
            // start it over instead
            Err(DbError::CorruptStack { reason, .. }) => {
                tracing::warn!(conv_id = %conv_id, reason = %reason, "Discarding unreadable dialog stack");
                Ok(DialogStack::new())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    async fn save_stack(&self, conv_id: &str, stack: &DialogStack) -> Result<(), String> {
        self.db
            .save_dialog_stack(conv_id, stack)
            .map_err(|e| e.to_string())
    }

    async fn clear_stack(&self, conv_id: &str) -> Result<(), String> {
        self.db
            .clear_dialog_stack(conv_id)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn conversations(&self) -> Result<Vec<String>, String> {
        self.db
            .list_dialog_stacks()
            .map(|rows| rows.into_iter().map(|row| row.conversation_id).collect())
            .map_err(|e| e.to_string())
    }
}
