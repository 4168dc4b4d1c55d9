//! Server-Sent Events endpoint for device updates.

use axum::extract::{Query, State};
use axum::response::sse::Sse;
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tracing::info;

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Only stream events of this device.
    pub device: Option<String>,
}

/// Subscribe to device events.
///
/// Streams one message per event, named after its kind: devices added,
/// updated or removed, discovery results, path changes and streaming status
/// changes. `?device=<name>` narrows the stream to one device.
///
/// ```javascript
/// const events = new EventSource('http://localhost:59983/api/events?device=cam');
/// events.addEventListener('StreamingStatus', (e) => console.log(JSON.parse(e.data)));
/// ```
pub async fn events_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    match &query.device {
        Some(device) => info!(
            "New SSE client for device {} (total subscribers: {})",
            device,
            state.events().subscriber_count() + 1
        ),
        None => info!(
            "New SSE client connected (total subscribers: {})",
            state.events().subscriber_count() + 1
        ),
    }
    state.events().subscribe(query.device)
}
