//! Remote assistant abstraction
//!
//! The session controller only needs two capabilities: open a session bound
//! to a behavioral profile, and request a stream of text fragments per turn.
//! How fragments are framed on the wire is the provider's concern.

mod config;
mod error;
mod gemini;

pub use config::AssistantConfig;
pub use error::{AssistantError, AssistantErrorKind};
pub use gemini::GeminiClient;

use crate::profile::BehaviorProfile;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Ordered, awaitable sequence of text fragments for one turn
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, AssistantError>> + Send>>;

/// Capability that can open assistant sessions
#[async_trait]
pub trait RemoteAssistantClient: Send + Sync {
    /// Open a session bound to `profile`.
    ///
    /// Fails with a configuration error when no credential is available.
    async fn open_session(
        &self,
        profile: &BehaviorProfile,
    ) -> Result<Arc<dyn AssistantSession>, AssistantError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// An open conversation with the remote assistant
#[async_trait]
pub trait AssistantSession: Send + Sync {
    /// Request the reply to `text` as a fragment stream
    async fn send_turn(&self, text: &str) -> Result<FragmentStream, AssistantError>;
}

#[async_trait]
impl<T: RemoteAssistantClient + ?Sized> RemoteAssistantClient for Arc<T> {
    async fn open_session(
        &self,
        profile: &BehaviorProfile,
    ) -> Result<Arc<dyn AssistantSession>, AssistantError> {
        (**self).open_session(profile).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Logging wrapper for assistant clients
pub struct LoggingClient {
    inner: Arc<dyn RemoteAssistantClient>,
    model_id: String,
}

impl LoggingClient {
    pub fn new(inner: Arc<dyn RemoteAssistantClient>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl RemoteAssistantClient for LoggingClient {
    async fn open_session(
        &self,
        profile: &BehaviorProfile,
    ) -> Result<Arc<dyn AssistantSession>, AssistantError> {
        match self.inner.open_session(profile).await {
            Ok(session) => {
                let session_id = uuid::Uuid::new_v4().to_string();
                tracing::info!(model = %self.model_id, session_id = %session_id, "Assistant session opened");
                Ok(Arc::new(LoggingSession {
                    inner: session,
                    model_id: self.model_id.clone(),
                    session_id,
                }))
            }
            Err(e) => {
                tracing::warn!(
                    model = %self.model_id,
                    error = %e.message,
                    kind = ?e.kind,
                    "Assistant session could not be opened"
                );
                Err(e)
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

struct LoggingSession {
    inner: Arc<dyn AssistantSession>,
    model_id: String,
    session_id: String,
}

#[async_trait]
impl AssistantSession for LoggingSession {
    async fn send_turn(&self, text: &str) -> Result<FragmentStream, AssistantError> {
        let start = Instant::now();
        let stream = match self.inner.send_turn(text).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    session_id = %self.session_id,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    "Assistant turn failed to open"
                );
                return Err(e);
            }
        };

        tracing::debug!(
            session_id = %self.session_id,
            duration_ms = %start.elapsed().as_millis(),
            "Assistant turn stream opened"
        );

        let log = TurnLog {
            inner: stream,
            session_id: self.session_id.clone(),
            start,
            fragments: 0,
            bytes: 0,
            done: false,
        };

        Ok(Box::pin(futures::stream::unfold(log, |mut log| async move {
            if log.done {
                return None;
            }
            match log.inner.next().await {
                Some(Ok(fragment)) => {
                    log.fragments += 1;
                    log.bytes += fragment.len();
                    Some((Ok(fragment), log))
                }
                Some(Err(e)) => {
                    log.done = true;
                    tracing::error!(
                        session_id = %log.session_id,
                        duration_ms = %log.start.elapsed().as_millis(),
                        fragments = log.fragments,
                        error = %e.message,
                        kind = ?e.kind,
                        "Assistant turn stream failed"
                    );
                    Some((Err(e), log))
                }
                None => {
                    tracing::info!(
                        session_id = %log.session_id,
                        duration_ms = %log.start.elapsed().as_millis(),
                        fragments = log.fragments,
                        bytes = log.bytes,
                        "Assistant turn completed"
                    );
                    None
                }
            }
        })))
    }
}

struct TurnLog {
    inner: FragmentStream,
    session_id: String,
    start: Instant,
    fragments: usize,
    bytes: usize,
    done: bool,
}
