//! Runtime for executing conversation turns
//!
//! Each conversation gets one actor task that drains its turn queue in order.
//! The actor keeps no dialog state in memory between turns; it loads the stack
//! from storage at the start of every turn and writes it back at the end.

mod dispatch;
mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::ConversationRuntime;
pub use traits::*;

use crate::auth::{SignInCard, TokenProvider};
use crate::dialog::{
    ConversationRef, DialogContext, DialogStack, FlowId, FlowRegistry, InboundEvent,
    StepExecutionError, TurnPayload,
};
use crate::graph::GraphApi;
use chrono::TimeDelta;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};

/// Type alias for the production runtime manager
pub type ProductionManager = RuntimeManager<
    DatabaseStorage,
    crate::auth::LoggingTokenProvider<crate::auth::BotTokenService>,
    crate::graph::GraphClient,
>;

const TURN_QUEUE_DEPTH: usize = 32;
const BROADCAST_CAPACITY: usize = 128;

/// Stands in for a token in messages broadcast to stream subscribers
pub const REDACTED: &str = "<redacted>";

/// Message the bot sends to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text { text: String },
    SignInCard(SignInCard),
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundMessage::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            OutboundMessage::Text { text } => Some(text),
            OutboundMessage::SignInCard(_) => None,
        }
    }

    /// Copy with every occurrence of a secret masked
    pub fn redacted(&self, secrets: &[String]) -> Self {
        match self {
            OutboundMessage::Text { text } => OutboundMessage::Text {
                text: secrets
                    .iter()
                    .filter(|secret| !secret.is_empty())
                    .fold(text.clone(), |text, secret| {
                        text.replace(secret.as_str(), REDACTED)
                    }),
            },
            OutboundMessage::SignInCard(_) => self.clone(),
        }
    }
}

/// How a turn left the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnStatus {
    /// Waiting for the next event at the given frame
    Suspended {
        depth: usize,
        active_flow: FlowId,
        step_index: usize,
    },
    /// The flow ran to completion; the next message starts it again
    Completed,
    /// The user logged out and the dialog state was dropped
    SignedOut,
    /// Dialog state was dropped on request
    Cleared,
    /// Nothing in the dialog changed
    Unchanged,
}

impl TurnStatus {
    pub fn suspended_at(stack: &DialogStack) -> Self {
        match stack.top() {
            Some(frame) => TurnStatus::Suspended {
                depth: stack.depth(),
                active_flow: frame.flow,
                step_index: frame.step_index,
            },
            None => TurnStatus::Completed,
        }
    }
}

/// Everything a turn produced
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    /// Matches the `turn_complete` event broadcast for the same turn
    pub turn_id: String,
    pub conversation_id: String,
    pub status: TurnStatus,
    pub messages: Vec<OutboundMessage>,
}

impl TurnReport {
    /// Plain texts sent during the turn, in order
    pub fn texts(&self) -> Vec<&str> {
        self.messages.iter().filter_map(OutboundMessage::as_text).collect()
    }

    pub fn sign_in_card(&self) -> Option<&SignInCard> {
        self.messages.iter().find_map(|message| match message {
            OutboundMessage::SignInCard(card) => Some(card),
            OutboundMessage::Text { .. } => None,
        })
    }
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Step(#[from] StepExecutionError),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Turn did not settle after {0} token round trips")]
    Unsettled(usize),
    #[error("Conversation runtime stopped")]
    RuntimeStopped,
}

/// One queued turn; `reply` is absent for internally generated turns
#[derive(Debug)]
pub struct TurnRequest {
    pub event: InboundEvent,
    pub reply: Option<oneshot::Sender<Result<TurnReport, TurnError>>>,
}

/// Events sent to SSE clients. The stream is unauthenticated, so message
/// texts never carry a token obtained during the turn.
#[derive(Debug, Clone)]
pub enum SseEvent {
    Init {
        conversation_id: String,
        stack: DialogStack,
    },
    Message {
        message: OutboundMessage,
    },
    TurnComplete {
        turn_id: String,
        status: TurnStatus,
    },
    Error {
        message: String,
    },
}

/// Settings shared by every conversation runtime
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub connection_name: String,
    pub sign_in_timeout: TimeDelta,
}

impl RuntimeSettings {
    pub fn dialog_context(&self, conversation_id: &str) -> DialogContext {
        DialogContext::new(conversation_id, self.connection_name.clone())
            .with_sign_in_timeout(self.sign_in_timeout)
    }
}

/// Handle to interact with a running conversation
#[derive(Clone)]
pub struct ConversationHandle {
    pub request_tx: mpsc::Sender<TurnRequest>,
    pub broadcast_tx: broadcast::Sender<SseEvent>,
}

/// Manager for all conversation runtimes
pub struct RuntimeManager<S, A, G>
where
    S: StateStore + Clone + 'static,
    A: TokenProvider + 'static,
    G: GraphApi + 'static,
{
    storage: S,
    tokens: Arc<A>,
    graph: Arc<G>,
    registry: Arc<FlowRegistry>,
    settings: RuntimeSettings,
    runtimes: RwLock<HashMap<String, ConversationHandle>>,
}

impl<S, A, G> RuntimeManager<S, A, G>
where
    S: StateStore + Clone + 'static,
    A: TokenProvider + 'static,
    G: GraphApi + 'static,
{
    pub fn new(storage: S, tokens: A, graph: G, settings: RuntimeSettings) -> Self {
        Self {
            storage,
            tokens: Arc::new(tokens),
            graph: Arc::new(graph),
            registry: Arc::new(FlowRegistry::standard()),
            settings,
            runtimes: RwLock::new(HashMap::new()),
        }
    }

    /// Get or spawn the runtime for a conversation
    pub async fn get_or_create(&self, conversation_id: &str) -> ConversationHandle {
        {
            let runtimes = self.runtimes.read().await;
            if let Some(handle) = runtimes.get(conversation_id) {
                if !handle.request_tx.is_closed() {
                    return handle.clone();
                }
            }
        }

        let mut runtimes = self.runtimes.write().await;
        // Another caller may have won the race for the write lock
        if let Some(handle) = runtimes.get(conversation_id) {
            if !handle.request_tx.is_closed() {
                return handle.clone();
            }
        }

        let (request_tx, request_rx) = mpsc::channel(TURN_QUEUE_DEPTH);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        let runtime = ConversationRuntime::new(
            self.settings.dialog_context(conversation_id),
            Arc::clone(&self.registry),
            self.storage.clone(),
            Arc::clone(&self.tokens),
            Arc::clone(&self.graph),
            request_rx,
            request_tx.downgrade(),
            broadcast_tx.clone(),
        );
        tokio::spawn(runtime.run());

        let handle = ConversationHandle {
            request_tx,
            broadcast_tx,
        };
        runtimes.insert(conversation_id.to_string(), handle.clone());
        handle
    }

    /// Queue a turn and wait for its report
    pub async fn submit(&self, event: InboundEvent) -> Result<TurnReport, TurnError> {
        let handle = self.get_or_create(&event.conversation.conversation_id).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .request_tx
            .send(TurnRequest {
                event,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| TurnError::RuntimeStopped)?;
        reply_rx.await.map_err(|_| TurnError::RuntimeStopped)?
    }

    /// Drop a conversation's dialog state
    pub async fn reset(&self, conversation_id: &str) -> Result<TurnReport, TurnError> {
        self.submit(InboundEvent {
            conversation: ConversationRef::new(conversation_id, "", ""),
            payload: TurnPayload::Reset,
        })
        .await
    }

    pub async fn subscribe(&self, conversation_id: &str) -> broadcast::Receiver<SseEvent> {
        self.get_or_create(conversation_id)
            .await
            .broadcast_tx
            .subscribe()
    }

    /// Saved stack as the next turn would see it
    pub async fn load_stack(&self, conversation_id: &str) -> Result<DialogStack, TurnError> {
        self.storage
            .load_stack(conversation_id)
            .await
            .map_err(TurnError::Storage)
    }

    /// Start runtimes for every conversation with saved state, so sign-in
    /// prompts left waiting by a previous process still time out
    pub async fn rearm_sign_in_timers(&self) -> Result<usize, TurnError> {
        let conversations = self
            .storage
            .conversations()
            .await
            .map_err(TurnError::Storage)?;
        for conversation_id in &conversations {
            self.get_or_create(conversation_id).await;
        }
        tracing::info!(count = conversations.len(), "Restored conversation runtimes");
        Ok(conversations.len())
    }
}
