//! Effects produced by steps, executed by the runtime after the step returns

use super::result::TokenResponse;
use crate::command::Command;

/// Side effects requested by a step
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Plain text message to the user
    SendText { text: String },

    /// Ask the token capability for a token; the answer (token or nothing)
    /// feeds back into the waiting sign-in prompt, unless it needs the user
    /// to sign in interactively
    RequestToken { connection_name: String },

    /// Redeem a magic code typed by the user (or sent by a verify-state callback)
    ExchangeMagicCode {
        connection_name: String,
        code: String,
    },

    /// Run a parsed command against the mail/identity API
    Dispatch {
        command: Command,
        token: TokenResponse,
    },
}

impl Effect {
    pub fn send_text(text: impl Into<String>) -> Self {
        Effect::SendText { text: text.into() }
    }

    pub fn request_token(connection_name: impl Into<String>) -> Self {
        Effect::RequestToken {
            connection_name: connection_name.into(),
        }
    }

    /// Text of a `SendText` effect
    pub fn text(&self) -> Option<&str> {
        match self {
            Effect::SendText { text } => Some(text),
            _ => None,
        }
    }
}
