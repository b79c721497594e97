//! Token service error types

use thiserror::Error;

/// Token service error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub message: String,
}

impl AuthError {
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Network, message)
    }

    pub fn credentials(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Credentials, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::ServerError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Unknown, message)
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => Self::credentials(format!("Token service rejected credentials: {body}")),
            400 => Self::invalid_request(format!("Invalid token service request: {body}")),
            500..=599 => Self::server_error(format!("Token service error: {body}")),
            _ => Self::unknown(format!("HTTP {status}: {body}")),
        }
    }

    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            Self::network(format!("Connection failed: {e}"))
        } else {
            Self::unknown(format!("Request failed: {e}"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Network issues, timeouts
    Network,
    /// The bot's own app credentials were rejected (401, 403)
    Credentials,
    /// Server error (5xx)
    ServerError,
    /// Bad request (400), usually an unknown connection name
    InvalidRequest,
    Unknown,
}

impl AuthErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::ServerError)
    }
}
