//! API request and response types

use crate::dialog::{ConversationRef, DialogStack, InboundEvent, TokenResponse, TurnPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_channel() -> String {
    "directline".to_string()
}

/// Inbound activity posted by the channel connector
#[derive(Debug, Deserialize)]
pub struct ActivityRequest {
    /// Sender's user id on the channel
    pub from: String,
    #[serde(default = "default_channel")]
    pub channel_id: String,
    #[serde(flatten)]
    pub activity: Activity,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Activity {
    Message {
        #[serde(default)]
        text: String,
    },
    /// Sign-in completed; carries the user token
    TokenResponse {
        token: String,
        connection_name: String,
        #[serde(default)]
        expiration: Option<DateTime<Utc>>,
    },
    /// Teams `signin/verifyState` invoke
    VerifyState { state: String },
    /// Card button pressed
    Choice { index: usize, value: String },
    MembersAdded {
        members: Vec<String>,
        bot_id: String,
    },
}

impl ActivityRequest {
    pub fn into_event(self, conversation_id: &str) -> InboundEvent {
        let payload = match self.activity {
            Activity::Message { text } => TurnPayload::Message { text },
            Activity::TokenResponse {
                token,
                connection_name,
                expiration,
            } => TurnPayload::AuthCallback {
                token: TokenResponse {
                    token,
                    expiration,
                    connection_name,
                },
            },
            Activity::VerifyState { state } => TurnPayload::VerifyState { state },
            Activity::Choice { index, value } => TurnPayload::ChoiceSelected { index, value },
            Activity::MembersAdded { members, bot_id } => {
                TurnPayload::MembersAdded { members, bot_id }
            }
        };
        InboundEvent {
            conversation: ConversationRef::new(conversation_id, self.from, self.channel_id),
            payload,
        }
    }
}

/// Saved dialog position of a conversation
#[derive(Debug, Serialize)]
pub struct StackResponse {
    pub conversation_id: String,
    pub depth: usize,
    pub frames: DialogStack,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_sign_in: Option<DateTime<Utc>>,
}

impl StackResponse {
    pub fn new(conversation_id: String, stack: DialogStack) -> Self {
        Self {
            conversation_id,
            depth: stack.depth(),
            pending_sign_in: stack.pending_sign_in(),
            frames: stack,
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
