//! Downstream Microsoft Graph capability used by the command dispatcher

mod client;

pub use client::{GraphClient, DEFAULT_GRAPH_BASE_URL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Signed-in user profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub display_name: String,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

/// One inbox entry as listed by `recent`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailSummary {
    pub from: String,
    pub subject: String,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Graph request failed: {0}")]
    Network(String),
    /// The user token was rejected (401, 403)
    #[error("Graph rejected the token: {0}")]
    Unauthorized(String),
    #[error("Graph returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Unexpected Graph response: {0}")]
    Decode(String),
}

/// Graph operations the bot performs on behalf of the signed-in user
#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn get_self(&self, token: &str) -> Result<UserProfile, GraphError>;

    async fn send_mail(&self, token: &str, recipient: &str) -> Result<(), GraphError>;

    async fn list_recent_mail(&self, token: &str) -> Result<Vec<MailSummary>, GraphError>;
}

#[async_trait]
impl<T: GraphApi + ?Sized> GraphApi for Arc<T> {
    async fn get_self(&self, token: &str) -> Result<UserProfile, GraphError> {
        (**self).get_self(token).await
    }

    async fn send_mail(&self, token: &str, recipient: &str) -> Result<(), GraphError> {
        (**self).send_mail(token, recipient).await
    }

    async fn list_recent_mail(&self, token: &str) -> Result<Vec<MailSummary>, GraphError> {
        (**self).list_recent_mail(token).await
    }
}
