//! Relay worker: polls the ingestion buffer and republishes onto the bus.

use crate::publisher::BusPublisher;
use inlet_buffer::{Buffer, BufferError};
use inlet_domain::BusEvent;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Buffer error
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Messages dequeued per drain pass
    pub batch_size: usize,
    /// Lease duration for dequeued messages
    pub visibility_timeout: Duration,
    /// Delay between drain passes when the loop runs continuously
    pub poll_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            visibility_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Messages published and deleted
    pub relayed: usize,
    /// Messages whose publish failed; left for redelivery
    pub deferred: usize,
}

/// The relay worker.
pub struct Relay<B: Buffer + ?Sized, P: BusPublisher + ?Sized> {
    buffer: Arc<B>,
    bus: Arc<P>,
    config: RelayConfig,
}

impl<B: Buffer + ?Sized, P: BusPublisher + ?Sized> Relay<B, P> {
    /// Create a relay between a buffer and a bus.
    pub fn new(buffer: Arc<B>, bus: Arc<P>, config: RelayConfig) -> Self {
        Self { buffer, bus, config }
    }

    /// Run the relay loop until shutdown is signaled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), RelayError> {
        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Relay started"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.tick().await; // First tick is immediate

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Relay shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    match self.drain_once().await {
                        Ok(report) if report.relayed > 0 || report.deferred > 0 => {
                            debug!(
                                relayed = report.relayed,
                                deferred = report.deferred,
                                "Drain pass complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            // Buffer unavailable: back off to the next tick.
                            error!(error = %e, "Drain pass failed (will retry)");
                        }
                    }
                }
            }
        }

        info!("Relay stopped");
        Ok(())
    }

    /// One drain pass: dequeue a batch, publish each message, delete
    /// after the publish is acknowledged.
    pub async fn drain_once(&self) -> Result<DrainReport, RelayError> {
        let leased = self
            .buffer
            .dequeue(self.config.batch_size, self.config.visibility_timeout)
            .await?;

        let mut report = DrainReport::default();
        for message in leased {
            let event = BusEvent::from_relay(
                message.payload.clone(),
                message.receipt.delivery_token,
            );

            match self.bus.publish(event).await {
                Ok(()) => {
                    // Publish acknowledged; only now is deletion safe.
                    let deleted = self.buffer.delete(&message.receipt).await?;
                    if !deleted {
                        // Lease lapsed mid-publish; the message will be
                        // redelivered and published again. Duplicates
                        // are absorbed downstream.
                        warn!(
                            message_id = %message.receipt.message_id,
                            "Receipt stale after publish; duplicate expected"
                        );
                    }
                    report.relayed += 1;
                }
                Err(e) => {
                    warn!(
                        message_id = %message.receipt.message_id,
                        receive_count = message.receive_count,
                        error = %e,
                        "Publish failed; leaving message for redelivery"
                    );
                    report.deferred += 1;
                }
            }
        }

        Ok(report)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::PublishError;
    use async_trait::async_trait;
    use inlet_buffer::MemoryBuffer;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Bus fake that records events and can be switched to fail.
    #[derive(Default)]
    struct RecordingBus {
        events: Mutex<Vec<BusEvent>>,
        fail: AtomicBool,
        publish_calls: AtomicUsize,
    }

    #[async_trait]
    impl BusPublisher for RecordingBus {
        async fn publish(&self, event: BusEvent) -> Result<(), PublishError> {
            self.publish_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(PublishError("bus down".to_string()));
            }
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn relay_over(
        buffer: Arc<MemoryBuffer>,
        bus: Arc<RecordingBus>,
    ) -> Relay<MemoryBuffer, RecordingBus> {
        Relay::new(buffer, bus, RelayConfig::default())
    }

    #[tokio::test]
    async fn test_relay_publishes_then_deletes() {
        let buffer = Arc::new(MemoryBuffer::new());
        let bus = Arc::new(RecordingBus::default());
        buffer.enqueue(b"p1".to_vec()).await.unwrap();

        let relay = relay_over(buffer.clone(), bus.clone());
        let report = relay.drain_once().await.unwrap();

        assert_eq!(report, DrainReport { relayed: 1, deferred: 0 });
        assert_eq!(buffer.depth().await.unwrap(), 0);

        let events = bus.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, b"p1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_publish_leaves_message_redeliverable() {
        let buffer = Arc::new(MemoryBuffer::new());
        let bus = Arc::new(RecordingBus::default());
        bus.fail.store(true, Ordering::SeqCst);
        buffer.enqueue(b"p1".to_vec()).await.unwrap();

        let relay = relay_over(buffer.clone(), bus.clone());
        let report = relay.drain_once().await.unwrap();
        assert_eq!(report, DrainReport { relayed: 0, deferred: 1 });

        // The message survived the failed publish.
        assert_eq!(buffer.depth().await.unwrap(), 1);

        // After the visibility timeout it is delivered again, and this
        // time the publish succeeds.
        bus.fail.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(31)).await;

        let report = relay.drain_once().await.unwrap();
        assert_eq!(report, DrainReport { relayed: 1, deferred: 0 });
        assert_eq!(buffer.depth().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poison_message_ends_in_dead_letter_buffer() {
        let buffer = Arc::new(MemoryBuffer::new());
        let bus = Arc::new(RecordingBus::default());
        bus.fail.store(true, Ordering::SeqCst);
        buffer.enqueue(b"poison".to_vec()).await.unwrap();

        let relay = relay_over(buffer.clone(), bus.clone());

        // Three failed relay attempts...
        for _ in 0..3 {
            relay.drain_once().await.unwrap();
            tokio::time::advance(Duration::from_secs(31)).await;
        }
        // ...and the next pass isolates the message instead of
        // delivering it a fourth time.
        let report = relay.drain_once().await.unwrap();
        assert_eq!(report, DrainReport::default());
        assert_eq!(buffer.dead_letter_count(), 1);
        assert_eq!(bus.publish_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_loop_drains_and_stops_on_cancel() {
        let buffer = Arc::new(MemoryBuffer::new());
        let bus = Arc::new(RecordingBus::default());
        buffer.enqueue(b"p1".to_vec()).await.unwrap();

        let relay = relay_over(buffer.clone(), bus.clone());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(relay.run(shutdown.clone()));

        // Wait for the first drain pass to pick the message up.
        for _ in 0..50 {
            if buffer.depth().await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(buffer.depth().await.unwrap(), 0);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
