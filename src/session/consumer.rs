//! Drains a turn's fragment stream into the transcript

use crate::llm::{AssistantError, FragmentStream};
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Identity of the turn a consumer is allowed to update
#[derive(Debug, Clone)]
pub struct TurnBinding {
    /// Position of the assistant turn in the transcript
    pub turn_index: usize,
    /// Session epoch the turn was admitted in; teardown bumps it
    pub epoch: u64,
    pub cancel: CancellationToken,
}

impl TurnBinding {
    pub fn new(turn_index: usize, epoch: u64) -> Self {
        Self {
            turn_index,
            epoch,
            cancel: CancellationToken::new(),
        }
    }

    pub fn same_turn(&self, other: &TurnBinding) -> bool {
        self.turn_index == other.turn_index && self.epoch == other.epoch
    }
}

/// Receiver of a consumer's progress.
///
/// Each method returns `false` when `binding` no longer names the active
/// trailing turn; the consumer then stops without touching anything else.
pub trait TurnSink: Send + Sync {
    /// Append a fragment to the bound turn
    fn append(&self, binding: &TurnBinding, fragment: &str) -> bool;

    /// The stream ended normally
    fn complete(&self, binding: &TurnBinding) -> bool;

    /// The stream failed
    fn fail(&self, binding: &TurnBinding, error: &AssistantError) -> bool;
}

/// How a consumed turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed,
    /// The binding went stale (teardown or cancellation) before the end
    Abandoned,
}

/// Applies one turn's fragments, in arrival order, to a sink
pub struct StreamConsumer {
    binding: TurnBinding,
    idle_timeout: Option<Duration>,
}

impl StreamConsumer {
    pub fn new(binding: TurnBinding, idle_timeout: Option<Duration>) -> Self {
        Self {
            binding,
            idle_timeout,
        }
    }

    pub async fn consume<S: TurnSink + ?Sized>(
        &self,
        mut stream: FragmentStream,
        sink: &S,
    ) -> TurnOutcome {
        let mut fragments = 0usize;

        loop {
            let next = tokio::select! {
                biased;

                () = self.binding.cancel.cancelled() => {
                    tracing::debug!(turn_index = self.binding.turn_index, fragments, "Stream consumer cancelled");
                    return TurnOutcome::Abandoned;
                }

                next = next_fragment(&mut stream, self.idle_timeout) => next,
            };

            match next {
                Ok(Some(fragment)) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    if !sink.append(&self.binding, &fragment) {
                        return TurnOutcome::Abandoned;
                    }
                    fragments += 1;
                }
                Ok(None) => {
                    tracing::debug!(turn_index = self.binding.turn_index, fragments, "Turn stream ended");
                    return if sink.complete(&self.binding) {
                        TurnOutcome::Completed
                    } else {
                        TurnOutcome::Abandoned
                    };
                }
                Err(e) => {
                    return if sink.fail(&self.binding, &e) {
                        TurnOutcome::Failed
                    } else {
                        TurnOutcome::Abandoned
                    };
                }
            }
        }
    }
}

/// Await the next fragment, failing with a timeout error if it stalls
async fn next_fragment(
    stream: &mut FragmentStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<String>, AssistantError> {
    let next = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, stream.next())
            .await
            .map_err(|_| {
                AssistantError::timeout(format!(
                    "No response fragment within {}ms",
                    limit.as_millis()
                ))
            })?,
        None => stream.next().await,
    };
    next.transpose()
}
