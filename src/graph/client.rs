//! Microsoft Graph v1.0 client

use super::{GraphApi, GraphError, MailSummary, UserProfile};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const RECENT_MAIL_COUNT: u32 = 5;
const MAIL_SUBJECT: &str = "Message from a bot!";

pub struct GraphClient {
    client: Client,
    base_url: String,
}

impl GraphClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GraphError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GraphError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: Response) -> Result<String, GraphError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GraphError::Network(format!("Failed to read response: {e}")))?;
        match status.as_u16() {
            200..=299 => Ok(body),
            401 | 403 => Err(GraphError::Unauthorized(error_message(&body))),
            code => Err(GraphError::Api {
                status: code,
                message: error_message(&body),
            }),
        }
    }
}

#[async_trait]
impl GraphApi for GraphClient {
    async fn get_self(&self, token: &str) -> Result<UserProfile, GraphError> {
        let response = self
            .client
            .get(self.url("/me"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(network)?;
        let body = Self::check(response).await?;
        serde_json::from_str(&body).map_err(|e| GraphError::Decode(e.to_string()))
    }

    async fn send_mail(&self, token: &str, recipient: &str) -> Result<(), GraphError> {
        let profile = self.get_self(token).await?;
        let request = SendMailRequest {
            message: OutgoingMessage {
                subject: MAIL_SUBJECT.to_string(),
                body: ItemBody {
                    content_type: "Text".to_string(),
                    content: format!(
                        "Hi there! I had this message sent from a bot. - Your friend, {}",
                        profile.display_name
                    ),
                },
                to_recipients: vec![Recipient {
                    email_address: EmailAddress {
                        address: recipient.to_string(),
                        name: None,
                    },
                }],
            },
            save_to_sent_items: true,
        };

        let response = self
            .client
            .post(self.url("/me/sendMail"))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(network)?;
        Self::check(response).await.map(|_| ())
    }

    async fn list_recent_mail(&self, token: &str) -> Result<Vec<MailSummary>, GraphError> {
        let response = self
            .client
            .get(self.url("/me/mailFolders/inbox/messages"))
            .query(&[
                ("$top", RECENT_MAIL_COUNT.to_string()),
                ("$select", "subject,from".to_string()),
                ("$orderby", "receivedDateTime desc".to_string()),
            ])
            .bearer_auth(token)
            .send()
            .await
            .map_err(network)?;
        let body = Self::check(response).await?;
        let page: MessagePage =
            serde_json::from_str(&body).map_err(|e| GraphError::Decode(e.to_string()))?;
        Ok(page.value.into_iter().map(MailSummary::from).collect())
    }
}

fn network(e: reqwest::Error) -> GraphError {
    if e.is_timeout() {
        GraphError::Network(format!("Request timeout: {e}"))
    } else {
        GraphError::Network(e.to_string())
    }
}

/// Graph wraps failures as `{"error": {"code", "message"}}`
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

impl From<GraphMessage> for MailSummary {
    fn from(message: GraphMessage) -> Self {
        let from = message
            .from
            .map(|r| r.email_address)
            .map(|addr| addr.name.unwrap_or(addr.address))
            .unwrap_or_default();
        Self {
            from,
            subject: message.subject.unwrap_or_default(),
        }
    }
}

// Graph API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailRequest {
    message: OutgoingMessage,
    save_to_sent_items: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingMessage {
    subject: String,
    body: ItemBody,
    to_recipients: Vec<Recipient>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemBody {
    content_type: String,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    email_address: EmailAddress,
}

#[derive(Debug, Serialize, Deserialize)]
struct EmailAddress {
    #[serde(default)]
    address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    value: Vec<GraphMessage>,
}

#[derive(Debug, Deserialize)]
struct GraphMessage {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<Recipient>,
}
