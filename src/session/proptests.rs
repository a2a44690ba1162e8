//! Property-based tests for the session controller
//!
//! Any fragment sequence, optionally cut short by a failure, must leave the
//! transcript consistent in every published snapshot.

use super::testing::{MockAssistantClient, ScriptedTurn};
use super::transcript::{Role, TranscriptSnapshot, TurnStatus};
use super::{SessionController, TurnOutcome};
use crate::llm::AssistantError;
use crate::profile::{BehaviorProfile, FALLBACK_MESSAGE};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_fragments() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-zA-Z0-9 .,!?é日]{0,8}", 0..12)
}

fn arb_turn() -> impl Strategy<Value = (Vec<String>, bool)> {
    (arb_fragments(), any::<bool>())
}

// ============================================================================
// Helpers
// ============================================================================

fn script(fragments: &[String], fails: bool) -> ScriptedTurn {
    let refs: Vec<&str> = fragments.iter().map(String::as_str).collect();
    let turn = ScriptedTurn::fragments(&refs);
    if fails {
        turn.then_fail(AssistantError::network("connection reset"))
    } else {
        turn
    }
}

/// Run the given turns and collect every snapshot published along the way
fn run_turns(turns: &[(Vec<String>, bool)]) -> (Vec<TurnOutcome>, Vec<TranscriptSnapshot>, TranscriptSnapshot) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let mock = Arc::new(MockAssistantClient::new());
        for (fragments, fails) in turns {
            mock.queue_turn(script(fragments, *fails));
        }
        let controller = Arc::new(SessionController::new(
            Arc::clone(&mock),
            BehaviorProfile::default(),
            None,
        ));
        let mut rx = controller.subscribe();
        controller.start().await;

        let mut outcomes = Vec::new();
        for i in 0..turns.len() {
            outcomes.push(controller.send(&format!("message {i}")).await.unwrap());
        }

        let mut snapshots = Vec::new();
        while let Ok(snapshot) = rx.try_recv() {
            snapshots.push(snapshot);
        }
        (outcomes, snapshots, controller.snapshot())
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A completed reply is exactly the concatenation of its fragments
    #[test]
    fn prop_completed_text_is_concatenation(fragments in arb_fragments()) {
        let (outcomes, _, last) = run_turns(&[(fragments.clone(), false)]);
        prop_assert_eq!(outcomes, vec![TurnOutcome::Completed]);

        let reply = last.last().unwrap();
        prop_assert_eq!(reply.role, Role::Assistant);
        prop_assert_eq!(reply.status, TurnStatus::Complete);
        prop_assert_eq!(&reply.text, &fragments.concat());
    }

    /// A failed reply never shows partial content
    #[test]
    fn prop_failed_text_is_fallback(fragments in arb_fragments()) {
        let (outcomes, _, last) = run_turns(&[(fragments, true)]);
        prop_assert_eq!(outcomes, vec![TurnOutcome::Failed]);

        let reply = last.last().unwrap();
        prop_assert_eq!(reply.status, TurnStatus::Failed);
        prop_assert_eq!(reply.text.as_str(), FALLBACK_MESSAGE);
    }

    /// Every published snapshot keeps the streaming turn last and unique,
    /// and revisions advance by one
    #[test]
    fn prop_snapshots_keep_streaming_invariant(turns in proptest::collection::vec(arb_turn(), 1..5)) {
        let (_, snapshots, last) = run_turns(&turns);

        prop_assert!(!snapshots.is_empty());
        for snapshot in &snapshots {
            prop_assert!(snapshot.streaming_invariant_holds());
        }
        for pair in snapshots.windows(2) {
            prop_assert_eq!(pair[1].revision, pair[0].revision + 1);
        }

        // greeting, then a user/assistant pair per turn
        prop_assert_eq!(last.turns.len(), 1 + 2 * turns.len());
        prop_assert!(!last.in_flight);
        prop_assert!(last.turns.iter().all(|turn| !turn.is_streaming()));
    }

    /// The transcript only grows, and frozen turns never change
    #[test]
    fn prop_transcript_is_append_only(turns in proptest::collection::vec(arb_turn(), 1..4)) {
        let (_, snapshots, _) = run_turns(&turns);

        for pair in snapshots.windows(2) {
            let (before, after) = (&pair[0], &pair[1]);
            prop_assert!(after.turns.len() >= before.turns.len());
            for (old, new) in before.turns.iter().zip(after.turns.iter()) {
                prop_assert_eq!(&old.id, &new.id);
                if !old.is_streaming() {
                    prop_assert_eq!(old, new);
                }
            }
        }
    }
}
