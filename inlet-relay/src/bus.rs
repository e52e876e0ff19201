//! In-process event bus.
//!
//! Bounded hand-off of relayed events to the orchestrator worker. The
//! channel never sheds events: `publish` completes only once the event
//! is actually queued, so a full channel backpressures the relay
//! instead of dropping work the relay has already deleted from the
//! buffer. A publish that cannot be queued (the consumer is gone) is
//! an error, and the relay leaves the message in the buffer.

use crate::publisher::{BusPublisher, PublishError};
use async_trait::async_trait;
use inlet_domain::BusEvent;
use tokio::sync::mpsc;

/// Bounded bus for relayed events.
///
/// Created together with its single [`BusReceiver`]; events published
/// before the receiver is first polled are held in the channel, not
/// lost.
pub struct EventBus {
    sender: mpsc::Sender<BusEvent>,
}

impl EventBus {
    /// Create a new bus with the specified capacity.
    ///
    /// Capacity determines how many events can be queued before
    /// `publish` starts waiting for the consumer to catch up.
    pub fn new(capacity: usize) -> (Self, BusReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, BusReceiver { receiver })
    }

    /// Whether the consumer side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[async_trait]
impl BusPublisher for EventBus {
    async fn publish(&self, event: BusEvent) -> Result<(), PublishError> {
        // Waits for channel capacity rather than shedding the event;
        // the relay's delete-after-ack contract depends on it.
        self.sender
            .send(event)
            .await
            .map_err(|_| PublishError("bus consumer dropped".to_string()))
    }
}

/// Receiver for bus events.
pub struct BusReceiver {
    receiver: mpsc::Receiver<BusEvent>,
}

impl BusReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` once the bus is dropped and the channel is empty.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        self.receiver.recv().await
    }

    /// Take an already-queued event without blocking.
    ///
    /// Returns `None` if no event is immediately available.
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        self.receiver.try_recv().ok()
    }
}

// =============================================================================
// Tests
// =============================================================================
