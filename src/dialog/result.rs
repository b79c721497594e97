//! Values flowing from one step into the next

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bearer credential returned by the token capability.
///
/// Lives only for the turn that obtained it. No frame-values type can hold one,
/// so a token never reaches persisted dialog state.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    pub connection_name: String,
}

impl TokenResponse {
    pub fn new(token: impl Into<String>, connection_name: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expiration: None,
            connection_name: connection_name.into(),
        }
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token", &"<redacted>")
            .field("expiration", &self.expiration)
            .field("connection_name", &self.connection_name)
            .finish()
    }
}

/// A card choice picked by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundChoice {
    pub index: usize,
    pub value: String,
}

/// The single value handed from a finished step (or popped child) to the next step
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StepResult {
    /// Nothing produced; also what a declined or expired sign-in yields
    #[default]
    None,
    Token(TokenResponse),
    Boolean(bool),
    Text(String),
    Choice(FoundChoice),
    /// Sign-in completion state from a Teams `signin/verifyState` invoke;
    /// only the sign-in prompt consumes it
    VerifyState(String),
}

impl StepResult {
    pub fn kind(&self) -> &'static str {
        match self {
            StepResult::None => "none",
            StepResult::Token(_) => "token",
            StepResult::Boolean(_) => "boolean",
            StepResult::Text(_) => "text",
            StepResult::Choice(_) => "choice",
            StepResult::VerifyState(_) => "verify_state",
        }
    }

    /// The token, if this result carries one
    pub fn into_token(self) -> Option<TokenResponse> {
        match self {
            StepResult::Token(token) => Some(token),
            _ => None,
        }
    }
}
