//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{ChatRequest, ChatResponse, ErrorResponse, TranscriptResponse};
use super::AppState;
use crate::session::SendRejected;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/assistant/transcript", get(get_transcript))
        .route("/api/assistant/stream", get(stream_transcript))
        .route("/api/assistant/messages", post(send_message))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Transcript
// ============================================================

async fn get_transcript(State(state): State<AppState>) -> Json<TranscriptResponse> {
    Json(TranscriptResponse {
        snapshot: state.controller.snapshot(),
        ready: state.controller.is_ready(),
    })
}

async fn stream_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let (init, snapshots) = state.controller.subscribe_with_snapshot();
    sse_stream(init, snapshots, state.shutdown.clone())
}

// ============================================================
// User Actions
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), AppError> {
    let pending = state.controller.admit(&req.text)?;
    tracing::debug!(turn_index = pending.turn_index(), "Message queued");
    tokio::spawn(pending.run());

    Ok((StatusCode::ACCEPTED, Json(ChatResponse { queued: true })))
}

async fn get_version() -> &'static str {
    concat!("synthos-assistant ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
}

impl From<SendRejected> for AppError {
    fn from(rejected: SendRejected) -> Self {
        let message = rejected.to_string();
        match rejected {
            SendRejected::EmptyInput => AppError::BadRequest(message),
            SendRejected::TurnInFlight => AppError::Conflict(message),
            SendRejected::NotStarted | SendRejected::NotConfigured => {
                AppError::Unavailable(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
