//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{ActivityRequest, ErrorResponse, StackResponse};
use super::AppState;
use crate::runtime::{SseEvent, TurnError, TurnReport};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Inbound activities from the channel
        .route(
            "/api/conversations/:id/activities",
            post(post_activity),
        )
        .route("/api/conversations/:id/reset", post(reset_conversation))
        // Inspection
        .route("/api/conversations/:id/stack", get(get_stack))
        .route("/api/conversations/:id/stream", get(stream_conversation))
        .route("/version", get(get_version))
        .with_state(state)
}

async fn post_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ActivityRequest>,
) -> Result<Json<TurnReport>, AppError> {
    if id.trim().is_empty() {
        return Err(AppError::BadRequest("conversation id is required".to_string()));
    }
    if req.from.trim().is_empty() {
        return Err(AppError::BadRequest("from is required".to_string()));
    }

    let event = req.into_event(&id);
    tracing::debug!(conv_id = %id, kind = event.payload.kind(), "Activity received");

    let report = state.runtime.submit(event).await?;
    Ok(Json(report))
}

async fn reset_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TurnReport>, AppError> {
    Ok(Json(state.runtime.reset(&id).await?))
}

async fn get_stack(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StackResponse>, AppError> {
    let stack = state.runtime.load_stack(&id).await?;
    Ok(Json(StackResponse::new(id, stack)))
}

async fn stream_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // Subscribe before reading the stack so no turn falls between the two
    let broadcast_rx = state.runtime.subscribe(&id).await;
    let stack = state.runtime.load_stack(&id).await?;

    let init_event = SseEvent::Init {
        conversation_id: id,
        stack,
    };

    Ok(sse_stream(init_event, broadcast_rx))
}

async fn get_version() -> &'static str {
    concat!("graph_auth_bot ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl From<TurnError> for AppError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::RuntimeStopped => AppError::Unavailable(err.to_string()),
            TurnError::Step(_) | TurnError::Storage(_) | TurnError::Unsettled(_) => {
                tracing::error!(error = %err, "Turn failed");
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
