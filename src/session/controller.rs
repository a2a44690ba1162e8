//! Session controller: sole owner of the transcript and the remote session
//!
//! All transcript writes happen under one lock, and each write publishes
//! exactly one snapshot before the lock is released, so subscribers see
//! mutations in the order they happened. The lock is never held across an
//! `.await`.

use super::consumer::{StreamConsumer, TurnBinding, TurnOutcome, TurnSink};
use super::transcript::{Transcript, TranscriptSnapshot};
use crate::llm::{AssistantError, AssistantErrorKind, AssistantSession, RemoteAssistantClient};
use crate::profile::{BehaviorProfile, FALLBACK_MESSAGE, GREETING};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;

const SNAPSHOT_CHANNEL_CAPACITY: usize = 256;

/// Why a `send` was not admitted. The transcript is never touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendRejected {
    #[error("Message is empty")]
    EmptyInput,
    #[error("Assistant is still replying to the previous message")]
    TurnInFlight,
    #[error("Assistant session is not started")]
    NotStarted,
    #[error("Assistant is not configured")]
    NotConfigured,
}

struct ControllerState {
    transcript: Transcript,
    session: Option<Arc<dyn AssistantSession>>,
    /// Binding of the assistant turn currently being driven
    in_flight: Option<TurnBinding>,
    /// Bumped on teardown so bindings from an old session go stale
    epoch: u64,
    revision: u64,
    /// Kind of the last `start()` failure, cleared on success or teardown
    start_failure: Option<AssistantErrorKind>,
}

impl ControllerState {
    fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            revision: self.revision,
            turns: self.transcript.turns().into(),
            in_flight: self.in_flight.is_some(),
        }
    }

    fn is_active(&self, binding: &TurnBinding) -> bool {
        !binding.cancel.is_cancelled()
            && self
                .in_flight
                .as_ref()
                .is_some_and(|active| active.same_turn(binding))
            && self.transcript.streaming_index() == Some(binding.turn_index)
    }
}

/// Owner of the single active conversation
pub struct SessionController<C: RemoteAssistantClient> {
    client: C,
    profile: BehaviorProfile,
    stream_timeout: Option<Duration>,
    state: Mutex<ControllerState>,
    /// Serializes `start()` so concurrent calls open at most one session
    start_lock: tokio::sync::Mutex<()>,
    snapshots: broadcast::Sender<TranscriptSnapshot>,
}

impl<C: RemoteAssistantClient> SessionController<C> {
    pub fn new(client: C, profile: BehaviorProfile, stream_timeout: Option<Duration>) -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            client,
            profile,
            stream_timeout,
            state: Mutex::new(ControllerState {
                transcript: Transcript::new(),
                session: None,
                in_flight: None,
                epoch: 0,
                revision: 0,
                start_failure: None,
            }),
            start_lock: tokio::sync::Mutex::new(()),
            snapshots,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one mutation and publish it while the lock is still held
    fn publish(&self, state: &mut ControllerState) {
        state.revision += 1;
        let snapshot = state.snapshot();
        debug_assert!(snapshot.streaming_invariant_holds());
        // No receivers is fine; the view may not be connected yet
        let _ = self.snapshots.send(snapshot);
    }

    /// Current transcript
    pub fn snapshot(&self) -> TranscriptSnapshot {
        self.lock().snapshot()
    }

    /// Receive one snapshot per transcript mutation
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptSnapshot> {
        self.snapshots.subscribe()
    }

    /// Current snapshot plus a receiver for every mutation after it
    pub fn subscribe_with_snapshot(&self) -> (TranscriptSnapshot, broadcast::Receiver<TranscriptSnapshot>) {
        let state = self.lock();
        (state.snapshot(), self.subscribe())
    }

    /// A session is open and `send` can be admitted
    pub fn is_ready(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Open the session and seed the greeting. Idempotent.
    ///
    /// Never fails: a missing credential is logged and leaves the controller
    /// usable, with `send` rejected as `NotConfigured`.
    pub async fn start(&self) {
        let _guard = self.start_lock.lock().await;

        let epoch = {
            let mut state = self.lock();
            if state.transcript.is_empty() {
                state.transcript.push_assistant(GREETING);
                self.publish(&mut state);
            }
            if state.session.is_some() {
                return;
            }
            state.epoch
        };

        let opened = self.client.open_session(&self.profile).await;

        let mut state = self.lock();
        if state.epoch != epoch {
            // Torn down while opening; stay stopped until the next start()
            tracing::info!(epoch = state.epoch, "Discarding session opened across teardown");
            return;
        }
        match opened {
            Ok(session) => {
                state.session = Some(session);
                state.start_failure = None;
                tracing::info!(model = %self.client.model_id(), epoch, "Assistant session started");
            }
            Err(e) => {
                if e.kind == AssistantErrorKind::Configuration {
                    tracing::warn!(error = %e.message, "Assistant not configured; chat disabled");
                } else {
                    tracing::error!(error = %e.message, kind = ?e.kind, "Failed to start assistant session");
                }
                state.start_failure = Some(e.kind);
            }
        }
    }

    /// Release the session. Any turn still streaming is failed and its
    /// consumer stops touching the transcript.
    pub fn teardown(&self) {
        let mut state = self.lock();
        let had_session = state.session.take().is_some();
        state.start_failure = None;
        state.epoch += 1;

        if let Some(binding) = state.in_flight.take() {
            binding.cancel.cancel();
            state.transcript.fail(binding.turn_index, FALLBACK_MESSAGE);
            self.publish(&mut state);
            tracing::info!(turn_index = binding.turn_index, "Abandoned in-flight turn on teardown");
        }

        if had_session {
            tracing::info!(epoch = state.epoch, "Assistant session torn down");
        }
    }
}

impl<C: RemoteAssistantClient + 'static> SessionController<C> {
    /// Admit `text` and drive the assistant's reply to completion
    pub async fn send(self: &Arc<Self>, text: &str) -> Result<TurnOutcome, SendRejected> {
        let pending = self.admit(text)?;
        Ok(pending.run().await)
    }

    /// Admission step of `send`: validates preconditions and appends the
    /// user turn and an empty streaming assistant turn.
    pub fn admit(self: &Arc<Self>, text: &str) -> Result<PendingTurn<C>, SendRejected> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SendRejected::EmptyInput);
        }

        let mut state = self.lock();
        let Some(session) = state.session.clone() else {
            return Err(match state.start_failure {
                Some(AssistantErrorKind::Configuration) => SendRejected::NotConfigured,
                _ => SendRejected::NotStarted,
            });
        };
        if state.in_flight.is_some() || state.transcript.streaming_index().is_some() {
            return Err(SendRejected::TurnInFlight);
        }

        // Both appends are published as in flight; the assistant turn lands
        // right after the user turn
        let turn_index = state.transcript.turns().len() + 1;
        let binding = TurnBinding::new(turn_index, state.epoch);
        state.in_flight = Some(binding.clone());

        state.transcript.push_user(text);
        self.publish(&mut state);

        let opened = state.transcript.open_assistant();
        debug_assert_eq!(opened, Some(turn_index));
        self.publish(&mut state);

        tracing::debug!(turn_index, epoch = binding.epoch, "Turn admitted");

        Ok(PendingTurn {
            controller: Arc::clone(self),
            session,
            binding,
            text: text.to_string(),
        })
    }
}

impl<C: RemoteAssistantClient> TurnSink for SessionController<C> {
    fn append(&self, binding: &TurnBinding, fragment: &str) -> bool {
        let mut state = self.lock();
        if !state.is_active(binding) {
            return false;
        }
        if state.transcript.append(binding.turn_index, fragment).is_none() {
            return false;
        }
        self.publish(&mut state);
        true
    }

    fn complete(&self, binding: &TurnBinding) -> bool {
        let mut state = self.lock();
        if !state.is_active(binding) {
            return false;
        }
        state.transcript.complete(binding.turn_index);
        state.in_flight = None;
        self.publish(&mut state);
        true
    }

    fn fail(&self, binding: &TurnBinding, error: &AssistantError) -> bool {
        tracing::warn!(
            turn_index = binding.turn_index,
            error = %error.message,
            kind = ?error.kind,
            transport = error.kind.is_transport(),
            "Assistant turn failed"
        );
        let mut state = self.lock();
        if !state.is_active(binding) {
            return false;
        }
        state.transcript.fail(binding.turn_index, FALLBACK_MESSAGE);
        state.in_flight = None;
        self.publish(&mut state);
        true
    }
}

/// An admitted turn waiting to be driven
pub struct PendingTurn<C: RemoteAssistantClient> {
    controller: Arc<SessionController<C>>,
    session: Arc<dyn AssistantSession>,
    binding: TurnBinding,
    text: String,
}

impl<C: RemoteAssistantClient> PendingTurn<C> {
    pub fn turn_index(&self) -> usize {
        self.binding.turn_index
    }

    /// Open the turn stream and consume it until the turn is frozen
    pub async fn run(self) -> TurnOutcome {
        let start = Instant::now();
        let controller = self.controller.as_ref();
        let timeout = controller.stream_timeout;

        let opened = tokio::select! {
            biased;

            () = self.binding.cancel.cancelled() => return TurnOutcome::Abandoned,

            opened = open_turn(self.session.as_ref(), &self.text, timeout) => opened,
        };

        let outcome = match opened {
            Ok(stream) => {
                StreamConsumer::new(self.binding.clone(), timeout)
                    .consume(stream, controller)
                    .await
            }
            Err(e) => {
                if controller.fail(&self.binding, &e) {
                    TurnOutcome::Failed
                } else {
                    TurnOutcome::Abandoned
                }
            }
        };

        tracing::info!(
            turn_index = self.binding.turn_index,
            duration_ms = %start.elapsed().as_millis(),
            outcome = ?outcome,
            "Turn finished"
        );
        outcome
    }
}

async fn open_turn(
    session: &dyn AssistantSession,
    text: &str,
    timeout: Option<Duration>,
) -> Result<crate::llm::FragmentStream, AssistantError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, session.send_turn(text))
            .await
            .map_err(|_| {
                AssistantError::timeout(format!(
                    "Turn stream did not open within {}ms",
                    limit.as_millis()
                ))
            })?,
        None => session.send_turn(text).await,
    }
}
