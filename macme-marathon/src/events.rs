//! The `/v2/events` subscription (§4.3).
//!
//! `get_events` opens one connection and returns a stream that ends the
//! moment the connection does; reconnection with backoff is the
//! supervisor's job (C8), not this crate's, since Marathon exposes no
//! cursor to resume from.

use std::collections::{HashSet, VecDeque};

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use macme_core::{CoreError, CoreResult};
use macme_sse::SseDecoder;

/// One dispatched Marathon event whose SSE event name was in the
/// subscription's requested type set.
#[derive(Debug, Clone)]
pub struct MarathonEvent {
    pub event_type: String,
    pub body: serde_json::Value,
}

struct StreamState {
    bytes: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<(String, String)>,
    types: HashSet<String>,
    done: bool,
}

/// Wraps a raw SSE byte stream, filtering to the requested event types and
/// parsing each matching record's data as JSON.
pub(crate) fn decode_events(
    bytes: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    types: &[&str],
) -> impl Stream<Item = CoreResult<MarathonEvent>> {
    let state = StreamState {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        types: types.iter().map(|s| s.to_string()).collect(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }

        loop {
            if let Some((event_type, data)) = state.pending.pop_front() {
                if !state.types.contains(&event_type) {
                    continue;
                }
                return match serde_json::from_str(&data) {
                    Ok(body) => Some((Ok(MarathonEvent { event_type, body }), state)),
                    Err(e) => {
                        state.done = true;
                        Some((Err(CoreError::Transient(e.to_string())), state))
                    }
                };
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let outcome = state.decoder.feed(&chunk);
                    state.pending.extend(outcome.events);
                    if outcome.disconnect {
                        state.done = true;
                        return Some((
                            Err(CoreError::Transient(
                                "SSE line exceeded the maximum length".to_string(),
                            )),
                            state,
                        ));
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(CoreError::Transient(e.to_string())), state));
                }
                None => {
                    state.done = true;
                    return None;
                }
            }
        }
    })
}
