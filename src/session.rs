//! Chat session management
//!
//! The controller owns the transcript and the remote session; the stream
//! consumer drives one assistant turn at a time into it.

mod consumer;
mod controller;
pub mod transcript;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub mod testing;

#[allow(unused_imports)] // Public API re-exports
pub use consumer::{StreamConsumer, TurnBinding, TurnOutcome, TurnSink};
#[allow(unused_imports)]
pub use controller::{PendingTurn, SendRejected, SessionController};
#[allow(unused_imports)]
pub use transcript::{Role, Transcript, TranscriptSnapshot, Turn, TurnStatus};

use crate::llm::RemoteAssistantClient;
use std::sync::Arc;

/// Controller as shared by the HTTP layer
pub type SharedController = Arc<SessionController<Arc<dyn RemoteAssistantClient>>>;
