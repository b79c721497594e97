//! Bot Framework token service client
//!
//! User tokens are stored by the token service against an OAuth connection
//! configured on the bot registration. The bot authenticates itself with an app
//! token obtained through the client credentials grant.

use super::{AuthError, SignInCard, TokenLookup, TokenProvider};
use crate::dialog::{ConversationRef, TokenResponse};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const DEFAULT_TOKEN_SERVICE_URL: &str = "https://token.botframework.com";
pub const DEFAULT_LOGIN_URL: &str =
    "https://login.microsoftonline.com/botframework.com/oauth2/v2.0/token";
const APP_TOKEN_SCOPE: &str = "https://api.botframework.com/.default";
const SIGN_IN_TEXT: &str = "Please sign in";

/// Refresh the app token this long before it actually expires
const APP_TOKEN_SKEW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct TokenServiceConfig {
    pub app_id: String,
    pub app_password: String,
    pub base_url: String,
    pub login_url: String,
}

impl TokenServiceConfig {
    pub fn new(app_id: impl Into<String>, app_password: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_password: app_password.into(),
            base_url: DEFAULT_TOKEN_SERVICE_URL.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

struct AppToken {
    token: String,
    refresh_at: Instant,
}

pub struct BotTokenService {
    client: Client,
    config: TokenServiceConfig,
    app_token: Mutex<Option<AppToken>>,
}

impl BotTokenService {
    pub fn new(config: TokenServiceConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            app_token: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Bearer token for the bot itself. Empty app id means a local emulator
    /// setup where calls go unauthenticated.
    async fn app_token(&self) -> Result<Option<String>, AuthError> {
        if self.config.app_id.is_empty() {
            return Ok(None);
        }

        let mut cached = self.app_token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(Some(token.token.clone()));
            }
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.app_id.as_str()),
            ("client_secret", self.config.app_password.as_str()),
            ("scope", APP_TOKEN_SCOPE),
        ];
        let response = self
            .client
            .post(&self.config.login_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::from_reqwest(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::network(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(AuthError::from_status(status, &body));
        }

        let parsed: AppTokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::unknown(format!("Failed to parse app token: {e}")))?;
        let lifetime = Duration::from_secs(parsed.expires_in).saturating_sub(APP_TOKEN_SKEW);
        tracing::debug!(lifetime_secs = lifetime.as_secs(), "Refreshed app token");

        *cached = Some(AppToken {
            token: parsed.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(Some(parsed.access_token))
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<(StatusCode, String), AuthError> {
        let mut request = self.client.get(url).query(query);
        if let Some(token) = self.app_token().await? {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| AuthError::from_reqwest(&e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::network(format!("Failed to read response: {e}")))?;
        Ok((status, body))
    }

    /// Stored user token, optionally redeeming a magic code. 404 means none.
    async fn user_token(
        &self,
        user: &ConversationRef,
        connection_name: &str,
        code: Option<&str>,
    ) -> Result<Option<TokenResponse>, AuthError> {
        let mut query = vec![
            ("userId", user.user_id.as_str()),
            ("connectionName", connection_name),
            ("channelId", user.channel_id.as_str()),
        ];
        if let Some(code) = code {
            query.push(("code", code));
        }

        let (status, body) = self
            .get(&self.endpoint("/api/usertoken/GetToken"), &query)
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AuthError::from_status(status, &body));
        }

        let parsed: UserTokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::unknown(format!("Failed to parse user token: {e}")))?;
        if parsed.token.is_empty() {
            return Ok(None);
        }
        Ok(Some(TokenResponse {
            token: parsed.token,
            expiration: parsed.expiration,
            connection_name: parsed
                .connection_name
                .unwrap_or_else(|| connection_name.to_string()),
        }))
    }

    async fn sign_in_link(
        &self,
        user: &ConversationRef,
        connection_name: &str,
    ) -> Result<String, AuthError> {
        let state = sign_in_state(user, connection_name, &self.config.app_id)?;
        let (status, body) = self
            .get(
                &self.endpoint("/api/botsignin/GetSignInUrl"),
                &[("state", state.as_str())],
            )
            .await?;
        if !status.is_success() {
            return Err(AuthError::from_status(status, &body));
        }
        Ok(body.trim().trim_matches('"').to_string())
    }
}

#[async_trait]
impl TokenProvider for BotTokenService {
    async fn request_token(
        &self,
        user: &ConversationRef,
        connection_name: &str,
    ) -> Result<TokenLookup, AuthError> {
        if let Some(token) = self.user_token(user, connection_name, None).await? {
            return Ok(TokenLookup::Token(token));
        }

        let link = self.sign_in_link(user, connection_name).await?;
        if link.is_empty() {
            return Ok(TokenLookup::Declined);
        }
        Ok(TokenLookup::SignIn(SignInCard {
            text: SIGN_IN_TEXT.to_string(),
            sign_in_link: link,
            connection_name: connection_name.to_string(),
        }))
    }

    async fn exchange_magic_code(
        &self,
        user: &ConversationRef,
        connection_name: &str,
        code: &str,
    ) -> Result<Option<TokenResponse>, AuthError> {
        self.user_token(user, connection_name, Some(code)).await
    }

    async fn sign_out(
        &self,
        user: &ConversationRef,
        connection_name: &str,
    ) -> Result<(), AuthError> {
        let mut request = self
            .client
            .delete(self.endpoint("/api/usertoken/SignOut"))
            .query(&[
                ("userId", user.user_id.as_str()),
                ("connectionName", connection_name),
                ("channelId", user.channel_id.as_str()),
            ]);
        if let Some(token) = self.app_token().await? {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| AuthError::from_reqwest(&e))?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AuthError::from_status(status, &body))
    }
}

/// Opaque `state` parameter for GetSignInUrl: base64 of the JSON token exchange state
fn sign_in_state(
    user: &ConversationRef,
    connection_name: &str,
    app_id: &str,
) -> Result<String, AuthError> {
    let state = TokenExchangeState {
        connection_name,
        conversation: ConversationReference {
            user: ChannelAccount { id: &user.user_id },
            conversation: ConversationAccount {
                id: &user.conversation_id,
            },
            channel_id: &user.channel_id,
        },
        ms_app_id: app_id,
    };
    let json = serde_json::to_vec(&state)
        .map_err(|e| AuthError::unknown(format!("Failed to encode sign-in state: {e}")))?;
    Ok(BASE64.encode(json))
}

// Token service wire types

#[derive(Debug, Deserialize)]
struct AppTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserTokenResponse {
    #[serde(default)]
    connection_name: Option<String>,
    #[serde(default)]
    token: String,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TokenExchangeState<'a> {
    connection_name: &'a str,
    conversation: ConversationReference<'a>,
    ms_app_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationReference<'a> {
    user: ChannelAccount<'a>,
    conversation: ConversationAccount<'a>,
    channel_id: &'a str,
}

#[derive(Serialize)]
struct ChannelAccount<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct ConversationAccount<'a> {
    id: &'a str,
}
