//! Server-sent event encoding of stream parts.
//!
//! Every part is one `data:` event holding the part's JSON. A complete stream
//! ends with a literal `data: [DONE]` event. A live stream whose consumer
//! lagged is cut short without it, so the client knows to resume.

use std::convert::Infallible;
use std::pin::Pin;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast;
use tracing::warn;

use parley_core::StreamPart;

pub const DONE: &str = "[DONE]";

pub type SseEventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

fn part_event(part: &StreamPart) -> Event {
    match serde_json::to_string(part) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            warn!(error = %e, kind = part.kind(), "Failed to encode stream part");
            Event::default().comment("encode error")
        }
    }
}

fn done_event() -> Event {
    Event::default().data(DONE)
}

/// Relay a live session until it closes.
pub fn live(receiver: broadcast::Receiver<StreamPart>) -> Sse<SseEventStream> {
    let events = stream::unfold(
        (receiver, false),
        |(mut receiver, done)| async move {
            if done {
                return None;
            }
            match receiver.recv().await {
                Ok(part) => Some((Ok::<_, Infallible>(part_event(&part)), (receiver, false))),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Stream consumer lagged, ending stream");
                    Some((
                        Ok(Event::default().comment(format!("lagged by {} parts", n))),
                        (receiver, true),
                    ))
                }
                Err(broadcast::error::RecvError::Closed) => {
                    Some((Ok(done_event()), (receiver, true)))
                }
            }
        },
    );
    Sse::new(Box::pin(events) as SseEventStream).keep_alive(KeepAlive::default())
}

/// A fixed list of parts followed by `[DONE]`.
pub fn fixed(parts: Vec<StreamPart>) -> Sse<SseEventStream> {
    let events = stream::iter(parts)
        .map(|part| Ok::<_, Infallible>(part_event(&part)))
        .chain(stream::once(async { Ok(done_event()) }));
    Sse::new(Box::pin(events) as SseEventStream).keep_alive(KeepAlive::default())
}
