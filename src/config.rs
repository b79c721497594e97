//! Environment configuration

use crate::auth::{TokenServiceConfig, DEFAULT_TOKEN_SERVICE_URL};
use crate::dialog::flow::DEFAULT_SIGN_IN_TIMEOUT_SECS;
use crate::graph::DEFAULT_GRAPH_BASE_URL;
use crate::runtime::RuntimeSettings;
use chrono::TimeDelta;
use thiserror::Error;

/// Longest sign-in window accepted from the environment (one day)
const MAX_SIGN_IN_TIMEOUT_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is required")]
    Missing { name: &'static str },
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub db_path: String,
    pub port: u16,
    /// OAuth connection configured on the bot registration
    pub connection_name: String,
    /// Empty for local emulator runs
    pub app_id: String,
    pub app_password: String,
    pub token_service_url: String,
    pub graph_base_url: String,
    pub sign_in_timeout: TimeDelta,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let db_path = var("BOT_DB_PATH").unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.graph-auth-bot/bot.db")
        });

        let port = match var("BOT_PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "BOT_PORT",
                value,
            })?,
            None => 3978,
        };

        let connection_name = var("OAUTH_CONNECTION_NAME").ok_or(ConfigError::Missing {
            name: "OAUTH_CONNECTION_NAME",
        })?;

        let app_id = var("MICROSOFT_APP_ID").unwrap_or_default();
        let app_password = var("MICROSOFT_APP_PASSWORD").unwrap_or_default();
        if !app_id.is_empty() && app_password.is_empty() {
            return Err(ConfigError::Missing {
                name: "MICROSOFT_APP_PASSWORD",
            });
        }

        let sign_in_timeout = match var("SIGN_IN_TIMEOUT_SECS") {
            Some(value) => match value
                .parse::<i64>()
                .ok()
                .filter(|secs| (0..=MAX_SIGN_IN_TIMEOUT_SECS).contains(secs))
                .and_then(TimeDelta::try_seconds)
            {
                Some(timeout) => timeout,
                None => {
                    return Err(ConfigError::Invalid {
                        name: "SIGN_IN_TIMEOUT_SECS",
                        value,
                    })
                }
            },
            None => TimeDelta::seconds(DEFAULT_SIGN_IN_TIMEOUT_SECS),
        };

        Ok(Self {
            db_path,
            port,
            connection_name,
            app_id,
            app_password,
            token_service_url: var("TOKEN_SERVICE_URL")
                .unwrap_or_else(|| DEFAULT_TOKEN_SERVICE_URL.to_string()),
            graph_base_url: var("GRAPH_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string()),
            sign_in_timeout,
        })
    }

    pub fn token_service(&self) -> TokenServiceConfig {
        TokenServiceConfig::new(&self.app_id, &self.app_password)
            .with_base_url(&self.token_service_url)
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            connection_name: self.connection_name.clone(),
            sign_in_timeout: self.sign_in_timeout,
        }
    }
}
