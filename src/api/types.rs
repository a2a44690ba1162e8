//! API request and response types

use crate::session::TranscriptSnapshot;
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Response for an admitted message
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub queued: bool,
}

/// Current transcript plus whether messages can be sent
#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    #[serde(flatten)]
    pub snapshot: TranscriptSnapshot,
    pub ready: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
