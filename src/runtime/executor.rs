//! Conversation runtime executor

use super::dispatch::dispatch;
use super::traits::StateStore;
use super::{OutboundMessage, SseEvent, TurnError, TurnReport, TurnRequest, TurnStatus};

use crate::auth::{TokenLookup, TokenProvider};
use crate::dialog::{
    advance, Advance, ConversationRef, DialogContext, DialogStack, Effect, FlowRegistry,
    FlowStatus, InboundEvent, StepResult, TurnPayload,
};
use crate::graph::GraphApi;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

pub const SIGNED_OUT: &str = "You have been signed out.";
pub const WELCOME: &str =
    "Welcome to AuthenticationBot. Type anything to get logged in. Type 'logout' to sign-out.";

/// Token lookups that answer immediately re-enter the sequencer within the
/// same turn; the standard flows need at most a handful
const MAX_TOKEN_ROUND_TRIPS: usize = 8;

/// Fire the sign-in timer slightly after the deadline so the expiry check sees it passed
const TIMER_SLACK: Duration = Duration::from_millis(50);

/// Generic conversation runtime that can work with any storage, token and Graph implementations
pub struct ConversationRuntime<S, A, G>
where
    S: StateStore + 'static,
    A: TokenProvider + 'static,
    G: GraphApi + 'static,
{
    context: DialogContext,
    registry: Arc<FlowRegistry>,
    storage: S,
    tokens: Arc<A>,
    graph: Arc<G>,
    request_rx: mpsc::Receiver<TurnRequest>,
    /// Weak so the runtime stops once every external handle is gone
    request_tx: mpsc::WeakSender<TurnRequest>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    /// Cancels the pending sign-in timeout, if one is armed
    sign_in_timer: Option<CancellationToken>,
    /// Most recent sender, used to address timer-driven turns
    last_user: Option<ConversationRef>,
    /// Tokens seen during the current turn, masked in broadcasts
    turn_secrets: Vec<String>,
}

impl<S, A, G> ConversationRuntime<S, A, G>
where
    S: StateStore + 'static,
    A: TokenProvider + 'static,
    G: GraphApi + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: DialogContext,
        registry: Arc<FlowRegistry>,
        storage: S,
        tokens: Arc<A>,
        graph: Arc<G>,
        request_rx: mpsc::Receiver<TurnRequest>,
        request_tx: mpsc::WeakSender<TurnRequest>,
        broadcast_tx: broadcast::Sender<SseEvent>,
    ) -> Self {
        Self {
            context,
            registry,
            storage,
            tokens,
            graph,
            request_rx,
            request_tx,
            broadcast_tx,
            sign_in_timer: None,
            last_user: None,
            turn_secrets: Vec::new(),
        }
    }

    fn conv_id(&self) -> &str {
        &self.context.conversation_id
    }

    pub async fn run(mut self) {
        tracing::info!(conv_id = %self.conv_id(), "Starting conversation runtime");

        // A prompt saved by an earlier process still needs its timeout
        match self.storage.load_stack(&self.context.conversation_id).await {
            Ok(stack) => self.sync_sign_in_timer(&stack),
            Err(e) => tracing::warn!(conv_id = %self.conv_id(), error = %e, "Could not restore sign-in timer"),
        }

        while let Some(request) = self.request_rx.recv().await {
            let TurnRequest { event, reply } = request;
            let result = self.process_turn(event).await;

            match &result {
                Ok(report) => {
                    let _ = self.broadcast_tx.send(SseEvent::TurnComplete {
                        turn_id: report.turn_id.clone(),
                        status: report.status.clone(),
                    });
                }
                Err(e) => {
                    tracing::error!(conv_id = %self.conv_id(), error = %e, "Error handling turn");
                    let _ = self.broadcast_tx.send(SseEvent::Error {
                        message: e.to_string(),
                    });
                }
            }

            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        }

        self.cancel_sign_in_timer();
        tracing::info!(conv_id = %self.conv_id(), "Conversation runtime stopped");
    }

    /// Run one turn to completion: load, advance, execute effects, persist
    pub async fn process_turn(&mut self, event: InboundEvent) -> Result<TurnReport, TurnError> {
        let InboundEvent {
            conversation,
            payload,
        } = event;
        if !conversation.user_id.is_empty() {
            self.last_user = Some(conversation.clone());
        }
        self.turn_secrets.clear();
        tracing::debug!(conv_id = %self.conv_id(), payload = payload.kind(), "Processing turn");

        let mut outbox = Vec::new();
        let status = match payload {
            TurnPayload::MembersAdded { members, bot_id } => {
                for _ in members.iter().filter(|member| **member != bot_id) {
                    self.emit(OutboundMessage::text(WELCOME), &mut outbox);
                }
                TurnStatus::Unchanged
            }
            TurnPayload::Reset => {
                self.clear_state().await?;
                TurnStatus::Cleared
            }
            TurnPayload::Message { text } if is_logout(&text) => {
                if let Err(e) = self
                    .tokens
                    .sign_out(&conversation, &self.context.connection_name)
                    .await
                {
                    tracing::warn!(conv_id = %self.conv_id(), error = %e, "Sign-out failed, clearing dialog anyway");
                }
                self.clear_state().await?;
                self.emit(OutboundMessage::text(SIGNED_OUT), &mut outbox);
                TurnStatus::SignedOut
            }
            TurnPayload::SignInTimeout => {
                let stack = self.load_stack().await?;
                match stack.pending_sign_in() {
                    Some(expires_at) if Utc::now() >= expires_at => {
                        tracing::info!(conv_id = %self.conv_id(), "Sign-in timed out");
                        self.run_dialog(&conversation, stack, StepResult::None, &mut outbox)
                            .await?
                    }
                    // Stale timer: the prompt was answered or replaced
                    _ => TurnStatus::Unchanged,
                }
            }
            other => {
                let input = other.into_step_result().unwrap_or_default();
                let stack = self.load_stack().await?;
                self.run_dialog(&conversation, stack, input, &mut outbox)
                    .await?
            }
        };

        Ok(TurnReport {
            turn_id: uuid::Uuid::new_v4().to_string(),
            conversation_id: self.context.conversation_id.clone(),
            status,
            messages: outbox,
        })
    }

    /// Advance the stack, feeding immediate token answers back in, then persist
    async fn run_dialog(
        &mut self,
        conversation: &ConversationRef,
        stack: DialogStack,
        input: StepResult,
        outbox: &mut Vec<OutboundMessage>,
    ) -> Result<TurnStatus, TurnError> {
        let mut stack = stack;
        let mut input = input;
        let mut round_trips = 0;

        loop {
            if let StepResult::Token(token) = &input {
                self.turn_secrets.push(token.token.clone());
            }
            let Advance {
                stack: next,
                status,
                effects,
                transitions,
            } = advance(&self.registry, &stack, &self.context, input, Utc::now())?;
            tracing::debug!(conv_id = %self.conv_id(), ?transitions, "Stack advanced");
            stack = next;

            let mut feedback = None;
            for effect in effects {
                if let Some(result) = self.execute_effect(conversation, effect, outbox).await {
                    if feedback.is_some() {
                        tracing::warn!(conv_id = %self.conv_id(), "Dropping extra token answer in one step");
                    } else {
                        feedback = Some(result);
                    }
                }
            }

            match (status, feedback) {
                (FlowStatus::Suspended, Some(result)) => {
                    round_trips += 1;
                    if round_trips > MAX_TOKEN_ROUND_TRIPS {
                        return Err(TurnError::Unsettled(MAX_TOKEN_ROUND_TRIPS));
                    }
                    input = result;
                }
                (FlowStatus::Suspended, None) => {
                    self.storage
                        .save_stack(&self.context.conversation_id, &stack)
                        .await
                        .map_err(TurnError::Storage)?;
                    self.sync_sign_in_timer(&stack);
                    return Ok(TurnStatus::suspended_at(&stack));
                }
                (FlowStatus::Completed(_), _) => {
                    tracing::info!(conv_id = %self.conv_id(), "Dialog completed");
                    self.clear_state().await?;
                    return Ok(TurnStatus::Completed);
                }
            }
        }
    }

    /// Execute an effect; token answers come back as the next step input
    async fn execute_effect(
        &mut self,
        conversation: &ConversationRef,
        effect: Effect,
        outbox: &mut Vec<OutboundMessage>,
    ) -> Option<StepResult> {
        match effect {
            Effect::SendText { text } => {
                self.emit(OutboundMessage::Text { text }, outbox);
                None
            }
            Effect::RequestToken { connection_name } => {
                match self.tokens.request_token(conversation, &connection_name).await {
                    Ok(TokenLookup::Token(token)) => Some(StepResult::Token(token)),
                    Ok(TokenLookup::SignIn(card)) => {
                        self.emit(OutboundMessage::SignInCard(card), outbox);
                        None
                    }
                    Ok(TokenLookup::Declined) => Some(StepResult::None),
                    Err(e) => {
                        // Indistinguishable from a declined sign-in for the flow
                        tracing::warn!(conv_id = %self.conv_id(), error = %e, "Token request failed");
                        Some(StepResult::None)
                    }
                }
            }
            Effect::ExchangeMagicCode {
                connection_name,
                code,
            } => {
                match self
                    .tokens
                    .exchange_magic_code(conversation, &connection_name, &code)
                    .await
                {
                    Ok(Some(token)) => Some(StepResult::Token(token)),
                    Ok(None) => {
                        tracing::debug!(conv_id = %self.conv_id(), "Magic code not accepted");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(conv_id = %self.conv_id(), error = %e, "Magic code exchange failed");
                        None
                    }
                }
            }
            Effect::Dispatch { command, token } => {
                for text in dispatch(self.graph.as_ref(), &command, &token).await {
                    self.emit(OutboundMessage::Text { text }, outbox);
                }
                None
            }
        }
    }

    /// Deliver to the turn's reply in full and to stream subscribers with
    /// tokens masked
    fn emit(&self, message: OutboundMessage, outbox: &mut Vec<OutboundMessage>) {
        let _ = self.broadcast_tx.send(SseEvent::Message {
            message: message.redacted(&self.turn_secrets),
        });
        outbox.push(message);
    }

    async fn load_stack(&self) -> Result<DialogStack, TurnError> {
        self.storage
            .load_stack(&self.context.conversation_id)
            .await
            .map_err(TurnError::Storage)
    }

    async fn clear_state(&mut self) -> Result<(), TurnError> {
        self.cancel_sign_in_timer();
        self.storage
            .clear_stack(&self.context.conversation_id)
            .await
            .map_err(TurnError::Storage)
    }

    // ==================== Sign-in timeout ====================

    /// Arm the timer for a waiting sign-in prompt, or disarm it when none waits
    fn sync_sign_in_timer(&mut self, stack: &DialogStack) {
        match stack.pending_sign_in() {
            Some(expires_at) => self.arm_sign_in_timer(expires_at),
            None => self.cancel_sign_in_timer(),
        }
    }

    fn arm_sign_in_timer(&mut self, expires_at: DateTime<Utc>) {
        self.cancel_sign_in_timer();

        let cancel = CancellationToken::new();
        self.sign_in_timer = Some(cancel.clone());

        let delay = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO) + TIMER_SLACK;
        let request_tx = self.request_tx.clone();
        let conversation = self.last_user.clone().unwrap_or_else(|| {
            ConversationRef::new(self.context.conversation_id.clone(), "", "")
        });
        tracing::debug!(conv_id = %self.conv_id(), delay_ms = %delay.as_millis(), "Armed sign-in timer");

        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let Some(tx) = request_tx.upgrade() else {
                        return;
                    };
                    let request = TurnRequest {
                        event: InboundEvent {
                            conversation,
                            payload: TurnPayload::SignInTimeout,
                        },
                        reply: None,
                    };
                    if tx.send(request).await.is_err() {
                        tracing::debug!("Runtime gone before sign-in timeout fired");
                    }
                }
            }
        });
    }

    fn cancel_sign_in_timer(&mut self) {
        if let Some(cancel) = self.sign_in_timer.take() {
            cancel.cancel();
        }
    }
}

/// `logout` anywhere in the dialog signs the user out
fn is_logout(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("logout")
}
