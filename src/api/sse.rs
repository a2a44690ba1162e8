//! Server-Sent Events support
//!
//! A subscriber gets the current transcript as `init`, then one
//! `transcript` event per mutation.

use crate::session::TranscriptSnapshot;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Convert snapshot broadcasts to an SSE stream that ends on shutdown
pub fn sse_stream(
    init: TranscriptSnapshot,
    snapshots: broadcast::Receiver<TranscriptSnapshot>,
    shutdown: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move { Ok(snapshot_event("init", &init)) });

    // Every snapshot is complete, so skipping lagged ones loses nothing
    let updates = BroadcastStream::new(snapshots).filter_map(|result| match result {
        Ok(snapshot) => Some(Ok(snapshot_event("transcript", &snapshot))),
        Err(_) => None,
    });

    let combined = futures::StreamExt::take_until(init.chain(updates), shutdown.cancelled_owned());

    Sse::new(combined).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn snapshot_event(event_type: &str, snapshot: &TranscriptSnapshot) -> Event {
    let data = json!({
        "type": event_type,
        "revision": snapshot.revision,
        "turns": snapshot.turns,
        "in_flight": snapshot.in_flight,
    });
    Event::default().event(event_type).data(data.to_string())
}
