//! Token acquisition capability
//!
//! The dialog engine never talks to an identity provider directly. It emits a
//! token request and the runtime asks a [`TokenProvider`], which either has a
//! cached user token, needs the user to sign in, or has been told no.

mod error;
mod token_service;

pub use error::{AuthError, AuthErrorKind};
pub use token_service::{BotTokenService, TokenServiceConfig, DEFAULT_TOKEN_SERVICE_URL};

use crate::dialog::{ConversationRef, TokenResponse};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Sign-in request shown to the user as a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignInCard {
    pub text: String,
    pub sign_in_link: String,
    pub connection_name: String,
}

/// Answer to a token request
#[derive(Debug, Clone, PartialEq)]
pub enum TokenLookup {
    /// A valid token was already available
    Token(TokenResponse),
    /// The user has to sign in; the token arrives on a later turn
    SignIn(SignInCard),
    /// The provider will not issue a token for this user
    Declined,
}

/// Identity provider seam
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn request_token(
        &self,
        user: &ConversationRef,
        connection_name: &str,
    ) -> Result<TokenLookup, AuthError>;

    /// Redeem a six-digit code for a token; `None` if the code was not accepted
    async fn exchange_magic_code(
        &self,
        user: &ConversationRef,
        connection_name: &str,
        code: &str,
    ) -> Result<Option<TokenResponse>, AuthError>;

    async fn sign_out(&self, user: &ConversationRef, connection_name: &str)
        -> Result<(), AuthError>;
}

#[async_trait]
impl<T: TokenProvider + ?Sized> TokenProvider for Arc<T> {
    async fn request_token(
        &self,
        user: &ConversationRef,
        connection_name: &str,
    ) -> Result<TokenLookup, AuthError> {
        (**self).request_token(user, connection_name).await
    }

    async fn exchange_magic_code(
        &self,
        user: &ConversationRef,
        connection_name: &str,
        code: &str,
    ) -> Result<Option<TokenResponse>, AuthError> {
        (**self).exchange_magic_code(user, connection_name, code).await
    }

    async fn sign_out(
        &self,
        user: &ConversationRef,
        connection_name: &str,
    ) -> Result<(), AuthError> {
        (**self).sign_out(user, connection_name).await
    }
}

/// Logging wrapper for token providers
pub struct LoggingTokenProvider<T> {
    inner: T,
}

impl<T> LoggingTokenProvider<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: TokenProvider> TokenProvider for LoggingTokenProvider<T> {
    async fn request_token(
        &self,
        user: &ConversationRef,
        connection_name: &str,
    ) -> Result<TokenLookup, AuthError> {
        let start = std::time::Instant::now();
        let result = self.inner.request_token(user, connection_name).await;
        let duration = start.elapsed();

        match &result {
            Ok(lookup) => {
                let outcome = match lookup {
                    TokenLookup::Token(_) => "token",
                    TokenLookup::SignIn(_) => "sign_in",
                    TokenLookup::Declined => "declined",
                };
                tracing::info!(
                    conv_id = %user.conversation_id,
                    connection = %connection_name,
                    duration_ms = %duration.as_millis(),
                    outcome,
                    "Token lookup completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    conv_id = %user.conversation_id,
                    connection = %connection_name,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Token lookup failed"
                );
            }
        }

        result
    }

    async fn exchange_magic_code(
        &self,
        user: &ConversationRef,
        connection_name: &str,
        code: &str,
    ) -> Result<Option<TokenResponse>, AuthError> {
        let result = self
            .inner
            .exchange_magic_code(user, connection_name, code)
            .await;
        match &result {
            Ok(token) => tracing::info!(
                conv_id = %user.conversation_id,
                accepted = token.is_some(),
                "Magic code exchanged"
            ),
            Err(e) => tracing::error!(
                conv_id = %user.conversation_id,
                error = %e.message,
                "Magic code exchange failed"
            ),
        }
        result
    }

    async fn sign_out(
        &self,
        user: &ConversationRef,
        connection_name: &str,
    ) -> Result<(), AuthError> {
        let result = self.inner.sign_out(user, connection_name).await;
        if let Err(e) = &result {
            tracing::error!(conv_id = %user.conversation_id, error = %e.message, "Sign-out failed");
        } else {
            tracing::info!(conv_id = %user.conversation_id, "User signed out");
        }
        result
    }
}
