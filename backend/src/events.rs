//! Device event fan-out to in-process consumers and SSE clients.
//!
//! Each SSE message carries the event kind as its `event:` name and the JSON
//! encoded [`DeviceEvent`] as data, so browser clients can attach listeners
//! per kind. A subscription can be narrowed to one device; events that concern
//! no single device, such as discovery results, reach every subscriber.

use axum::response::sse::{Event, KeepAlive};
use axum::response::Sse;
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, warn};
use usbcam_types::DeviceEvent;

/// Events buffered per subscriber before a slow one starts losing them.
const DEFAULT_BUFFER_SIZE: usize = 100;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct EventBroadcaster {
    sender: Arc<broadcast::Sender<DeviceEvent>>,
}

impl EventBroadcaster {
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn broadcast(&self, event: DeviceEvent) {
        debug!("Broadcasting event: {}", event.description());
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Raw receiver, for in-process consumers.
    pub fn receiver(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }

    /// SSE stream of events, limited to `device` when given.
    pub fn subscribe(
        &self,
        device: Option<String>,
    ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let stream = BroadcastStream::new(self.sender.subscribe());

        let event_stream = stream.filter_map(move |result| match result {
            Ok(event) if concerns(&event, device.as_deref()) => to_sse(&event).map(Ok),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!("SSE client lagging, skipped {} event(s)", skipped);
                None
            }
        });

        Sse::new(event_stream).keep_alive(
            KeepAlive::new()
                .interval(KEEP_ALIVE_INTERVAL)
                .text("keep-alive"),
        )
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

/// Whether a subscription limited to `device` receives `event`.
fn concerns(event: &DeviceEvent, device: Option<&str>) -> bool {
    match (device, event.device_name()) {
        (Some(wanted), Some(name)) => wanted == name,
        _ => true,
    }
}

fn to_sse(event: &DeviceEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.kind()).data(json)),
        Err(e) => {
            error!("Failed to serialize event {}: {}", event.kind(), e);
            None
        }
    }
}
