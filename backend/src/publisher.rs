//! Asynchronous publishing of streaming status changes.

use crate::events::EventBroadcaster;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};
use usbcam_types::command::ValueType;
use usbcam_types::{CommandValue, DeviceEvent, StreamingStatus};

/// Pending status updates before new ones are dropped.
pub const DEFAULT_QUEUE_SIZE: usize = 64;

#[derive(Debug)]
struct StatusUpdate {
    device_name: String,
    resource_name: String,
    status: StreamingStatus,
}

/// Queues streaming status updates and delivers them as [`DeviceEvent`]s
/// from a single worker task.
#[derive(Clone)]
pub struct StatusPublisher {
    tx: mpsc::Sender<StatusUpdate>,
    cancel: CancellationToken,
}

impl StatusPublisher {
    /// Spawn the delivery worker on `tracker`.
    pub fn start(events: EventBroadcaster, queue_size: usize, tracker: &TaskTracker) -> Self {
        let (tx, rx) = mpsc::channel(queue_size);
        let cancel = CancellationToken::new();
        tracker.spawn(deliver(rx, events, cancel.clone()));
        Self { tx, cancel }
    }

    /// Queue a status update. Never blocks; a full queue drops the update.
    pub fn publish(&self, device_name: &str, resource_name: &str, status: &StreamingStatus) {
        let update = StatusUpdate {
            device_name: device_name.to_string(),
            resource_name: resource_name.to_string(),
            status: status.clone(),
        };
        match self.tx.try_send(update) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(update)) => warn!(
                "Status queue full, dropping streaming status of {}",
                update.device_name
            ),
            Err(mpsc::error::TrySendError::Closed(update)) => debug!(
                "Status publisher stopped, dropping streaming status of {}",
                update.device_name
            ),
        }
    }

    /// Stop accepting updates. Queued updates are still delivered.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn deliver(
    mut rx: mpsc::Receiver<StatusUpdate>,
    events: EventBroadcaster,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Some(update) => send(&events, update),
                None => break,
            },
            _ = cancel.cancelled() => {
                rx.close();
                while let Some(update) = rx.recv().await {
                    send(&events, update);
                }
                break;
            }
        }
    }
    debug!("Status publisher stopped");
}

fn send(events: &EventBroadcaster, update: StatusUpdate) {
    let reading = match CommandValue::new(&update.resource_name, ValueType::Object, &update.status) {
        Ok(reading) => reading,
        Err(e) => {
            error!("Failed to encode streaming status of {}: {}", update.device_name, e);
            return;
        }
    };
    events.broadcast(DeviceEvent::StreamingStatus {
        device_name: update.device_name,
        reading,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_broadcasts_status() {
        let events = EventBroadcaster::new(16);
        let mut rx = events.receiver();
        let tracker = TaskTracker::new();
        let publisher = StatusPublisher::start(events, 8, &tracker);

        let status = StreamingStatus {
            is_streaming: true,
            ..Default::default()
        };
        publisher.publish("cam", "StreamingStatus", &status);

        match rx.recv().await.unwrap() {
            DeviceEvent::StreamingStatus {
                device_name,
                reading,
            } => {
                assert_eq!(device_name, "cam");
                assert_eq!(reading.resource_name, "StreamingStatus");
                assert_eq!(reading.value["IsStreaming"], true);
            }
            other => panic!("unexpected event {:?}", other),
        }

        publisher.shutdown();
        tracker.close();
        tracker.wait().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let events = EventBroadcaster::new(16);
        let mut rx = events.receiver();
        let tracker = TaskTracker::new();
        let publisher = StatusPublisher::start(events, 8, &tracker);

        for _ in 0..3 {
            publisher.publish("cam", "StreamingStatus", &StreamingStatus::default());
        }
        publisher.shutdown();
        tracker.close();
        tracker.wait().await;

        let mut delivered = 0;
        while rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, 3);
    }
}
