//! Transcript model
//!
//! The transcript only grows. Every mutation goes through a method that
//! keeps the streaming invariant: at most one turn is `Streaming` and it is
//! always the last one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Complete,
    Streaming,
    Failed,
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub status: TurnStatus,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    fn new(role: Role, text: impl Into<String>, status: TurnStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            status,
            created_at: Utc::now(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.status == TurnStatus::Streaming
    }
}

/// Ordered, append-only list of turns
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Index of the trailing streaming turn, if any
    pub fn streaming_index(&self) -> Option<usize> {
        self.turns
            .last()
            .filter(|turn| turn.is_streaming())
            .map(|_| self.turns.len() - 1)
    }

    /// Append a complete assistant turn (the greeting)
    pub fn push_assistant(&mut self, text: impl Into<String>) -> usize {
        self.push(Turn::new(Role::Assistant, text, TurnStatus::Complete))
    }

    /// Append a complete user turn
    pub fn push_user(&mut self, text: impl Into<String>) -> usize {
        self.push(Turn::new(Role::User, text, TurnStatus::Complete))
    }

    /// Append an empty streaming assistant turn.
    ///
    /// Returns `None` if another turn is still streaming.
    pub fn open_assistant(&mut self) -> Option<usize> {
        if self.streaming_index().is_some() {
            return None;
        }
        Some(self.push(Turn::new(Role::Assistant, "", TurnStatus::Streaming)))
    }

    /// Append `fragment` to the streaming turn at `index`.
    ///
    /// Returns the cumulative text, or `None` if that turn is not streaming.
    pub fn append(&mut self, index: usize, fragment: &str) -> Option<&str> {
        let turn = self.streaming_turn_mut(index)?;
        turn.text.push_str(fragment);
        Some(turn.text.as_str())
    }

    /// Freeze the streaming turn at `index` with its accumulated text
    pub fn complete(&mut self, index: usize) -> bool {
        match self.streaming_turn_mut(index) {
            Some(turn) => {
                turn.status = TurnStatus::Complete;
                true
            }
            None => false,
        }
    }

    /// Fail the streaming turn at `index`, replacing its text with `fallback`
    pub fn fail(&mut self, index: usize, fallback: &str) -> bool {
        match self.streaming_turn_mut(index) {
            Some(turn) => {
                turn.status = TurnStatus::Failed;
                fallback.clone_into(&mut turn.text);
                true
            }
            None => false,
        }
    }

    fn push(&mut self, turn: Turn) -> usize {
        debug_assert!(
            self.streaming_index().is_none(),
            "cannot append behind a streaming turn"
        );
        self.turns.push(turn);
        self.turns.len() - 1
    }

    fn streaming_turn_mut(&mut self, index: usize) -> Option<&mut Turn> {
        if self.streaming_index() != Some(index) {
            return None;
        }
        self.turns.get_mut(index)
    }
}

/// Immutable view of the transcript published to subscribers
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptSnapshot {
    /// Increments by one per transcript mutation
    pub revision: u64,
    pub turns: Arc<[Turn]>,
    /// A turn is being driven; the view shows a typing indicator
    pub in_flight: bool,
}

impl TranscriptSnapshot {
    #[allow(dead_code)] // Used by tests
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// At most one streaming turn, and only in last position
    pub fn streaming_invariant_holds(&self) -> bool {
        let streaming: Vec<usize> = self
            .turns
            .iter()
            .enumerate()
            .filter(|(_, turn)| turn.is_streaming())
            .map(|(i, _)| i)
            .collect();
        match streaming.as_slice() {
            [] => true,
            [i] => *i + 1 == self.turns.len(),
            _ => false,
        }
    }
}
