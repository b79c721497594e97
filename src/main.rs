//! Graph auth bot
//!
//! A conversational bot that signs the user in through an OAuth prompt and
//! then runs Microsoft Graph commands on their behalf. Dialog state survives
//! restarts; tokens never touch the disk.

mod api;
mod auth;
mod command;
mod config;
mod db;
mod dialog;
mod graph;
mod runtime;

use api::{create_router, AppState};
use auth::{BotTokenService, LoggingTokenProvider};
use config::BotConfig;
use db::Database;
use graph::GraphClient;
use runtime::{DatabaseStorage, RuntimeManager};
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "graph_auth_bot=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = BotConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    if config.app_id.is_empty() {
        tracing::warn!("MICROSOFT_APP_ID not set; token service calls are unauthenticated");
    }
    let tokens = LoggingTokenProvider::new(BotTokenService::new(config.token_service())?);
    let graph = GraphClient::new(config.graph_base_url.clone())?;

    let runtime = RuntimeManager::new(
        DatabaseStorage::new(db),
        tokens,
        graph,
        config.runtime_settings(),
    );

    let rearmed = runtime.rearm_sign_in_timers().await?;
    tracing::info!(
        conversations = rearmed,
        connection = %config.connection_name,
        "Dialog runtime ready"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(AppState::new(runtime))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Bot listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
