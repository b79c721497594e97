//! Inbound events that drive a conversation turn

use super::result::{FoundChoice, StepResult, TokenResponse};

/// Who a turn belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRef {
    pub conversation_id: String,
    pub user_id: String,
    pub channel_id: String,
}

impl ConversationRef {
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

/// One inbound activity for a conversation
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub conversation: ConversationRef,
    pub payload: TurnPayload,
}

/// What arrived
#[derive(Debug, Clone)]
pub enum TurnPayload {
    /// Free text typed by the user
    Message { text: String },

    /// Sign-in completed out of band (token response event)
    AuthCallback { token: TokenResponse },

    /// Teams-style sign-in completion carrying a magic code
    VerifyState { state: String },

    /// The user clicked a card button
    ChoiceSelected { index: usize, value: String },

    /// Participants joined the conversation
    MembersAdded {
        members: Vec<String>,
        bot_id: String,
    },

    /// The sign-in timer for this conversation fired
    SignInTimeout,

    /// Drop all dialog state for the conversation
    Reset,
}

impl TurnPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            TurnPayload::Message { .. } => "message",
            TurnPayload::AuthCallback { .. } => "auth_callback",
            TurnPayload::VerifyState { .. } => "verify_state",
            TurnPayload::ChoiceSelected { .. } => "choice_selected",
            TurnPayload::MembersAdded { .. } => "members_added",
            TurnPayload::SignInTimeout => "sign_in_timeout",
            TurnPayload::Reset => "reset",
        }
    }

    /// The step result this payload delivers to the active step, for payloads
    /// that feed the dialog directly
    pub fn into_step_result(self) -> Option<StepResult> {
        match self {
            TurnPayload::Message { text } => Some(StepResult::Text(text)),
            TurnPayload::AuthCallback { token } => Some(StepResult::Token(token)),
            TurnPayload::VerifyState { state } => Some(StepResult::VerifyState(state)),
            TurnPayload::ChoiceSelected { index, value } => {
                Some(StepResult::Choice(FoundChoice { index, value }))
            }
            TurnPayload::MembersAdded { .. } | TurnPayload::SignInTimeout | TurnPayload::Reset => {
                None
            }
        }
    }
}
