//! Mock assistant for controller tests
//!
//! Turns are served in the order they were queued. A turn is fully scripted
//! up front, fed fragment by fragment through a channel, or never opens.

use crate::llm::{AssistantError, AssistantSession, FragmentStream, RemoteAssistantClient};
use crate::profile::BehaviorProfile;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A reply known in advance
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    open_error: Option<AssistantError>,
    fragments: Vec<String>,
    trailing_error: Option<AssistantError>,
}

impl ScriptedTurn {
    pub fn fragments(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }

    /// The stream fails after its fragments
    pub fn then_fail(mut self, error: AssistantError) -> Self {
        self.trailing_error = Some(error);
        self
    }

    /// The stream never opens
    pub fn open_error(error: AssistantError) -> Self {
        Self {
            open_error: Some(error),
            ..Default::default()
        }
    }
}

enum TurnScript {
    Scripted(ScriptedTurn),
    Fed(mpsc::UnboundedReceiver<Result<String, AssistantError>>),
    /// `send_turn` never returns
    Stalled,
}

#[derive(Default)]
struct MockState {
    turns: Mutex<VecDeque<TurnScript>>,
    recorded: Mutex<Vec<String>>,
}

/// Mock client handing out sessions that replay queued turns
pub struct MockAssistantClient {
    state: Arc<MockState>,
    open_attempts: AtomicUsize,
    sessions_opened: AtomicUsize,
    configured: bool,
    /// When set, `open_session` waits for a permit before returning
    open_gate: Option<Arc<Notify>>,
}

impl MockAssistantClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState::default()),
            open_attempts: AtomicUsize::new(0),
            sessions_opened: AtomicUsize::new(0),
            configured: true,
            open_gate: None,
        }
    }

    /// Client whose `open_session` blocks until `gate` is notified
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            open_gate: Some(gate),
            ..Self::new()
        }
    }

    /// Client whose `open_session` fails as if no credential were set
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn queue_turn(&self, turn: ScriptedTurn) {
        self.state
            .turns
            .lock()
            .unwrap()
            .push_back(TurnScript::Scripted(turn));
    }

    /// Queue a turn fed by the returned sender; dropping it ends the stream
    pub fn queue_channel_turn(&self) -> mpsc::UnboundedSender<Result<String, AssistantError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.turns.lock().unwrap().push_back(TurnScript::Fed(rx));
        tx
    }

    /// Queue a turn whose stream never opens
    pub fn queue_stalled_turn(&self) {
        self.state.turns.lock().unwrap().push_back(TurnScript::Stalled);
    }

    /// Texts passed to `send_turn`, across all sessions
    pub fn recorded_turns(&self) -> Vec<String> {
        self.state.recorded.lock().unwrap().clone()
    }

    /// Calls to `open_session` that have started, gated or not
    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteAssistantClient for MockAssistantClient {
    async fn open_session(
        &self,
        _profile: &BehaviorProfile,
    ) -> Result<Arc<dyn AssistantSession>, AssistantError> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.open_gate {
            gate.notified().await;
        }
        if !self.configured {
            return Err(AssistantError::configuration("API key not configured"));
        }
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSession {
            state: Arc::clone(&self.state),
        }))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

struct MockSession {
    state: Arc<MockState>,
}

#[async_trait]
impl AssistantSession for MockSession {
    async fn send_turn(&self, text: &str) -> Result<FragmentStream, AssistantError> {
        self.state.recorded.lock().unwrap().push(text.to_string());
        let script = self.state.turns.lock().unwrap().pop_front();

        match script {
            None => Err(AssistantError::network("No mock turn queued")),
            Some(TurnScript::Fed(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            Some(TurnScript::Stalled) => futures::future::pending().await,
            Some(TurnScript::Scripted(turn)) => {
                if let Some(error) = turn.open_error {
                    return Err(error);
                }
                let items: Vec<Result<String, AssistantError>> = turn
                    .fragments
                    .into_iter()
                    .map(Ok)
                    .chain(turn.trailing_error.map(Err))
                    .collect();
                Ok(futures::stream::iter(items).boxed())
            }
        }
    }
}
