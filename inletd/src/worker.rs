//! Orchestrator worker: consumes bus events and commits them to the
//! event log.
//!
//! The worker owns the single bus receiver. An event the orchestrator
//! cannot settle (malformed payload, retry budget spent) is escalated
//! to the dead-letter buffer so the payload is never silently lost;
//! escalation itself is retried in place when the buffer is briefly
//! unavailable, because at this point the event no longer exists
//! anywhere else.

use crate::error::DaemonResult;
use inlet_buffer::Buffer;
use inlet_domain::BusEvent;
use inlet_eventlog::EventLog;
use inlet_orchestrator::{AppendDisposition, Orchestrator};
use inlet_relay::BusReceiver;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Back-off ceiling for dead-letter escalation retries.
const ESCALATE_MAX_DELAY: Duration = Duration::from_secs(5);

/// How long the shutdown drain may keep retrying escalations.
const DRAIN_GRACE: Duration = Duration::from_secs(10);

/// The orchestrator worker.
pub struct OrchestratorWorker {
    receiver: BusReceiver,
    orchestrator: Orchestrator<dyn EventLog>,
    buffer: Arc<dyn Buffer>,
}

impl OrchestratorWorker {
    /// Create a worker over the bus receiver.
    pub fn new(
        receiver: BusReceiver,
        orchestrator: Orchestrator<dyn EventLog>,
        buffer: Arc<dyn Buffer>,
    ) -> Self {
        Self {
            receiver,
            orchestrator,
            buffer,
        }
    }

    /// Run the worker loop.
    ///
    /// Returns when shutdown is signaled via cancellation token, or
    /// when the bus closes. Events already queued on the bus at
    /// shutdown are settled before returning: the relay has deleted
    /// their buffer entries, so abandoning them would lose them.
    pub async fn run(mut self, shutdown: CancellationToken) -> DaemonResult<()> {
        info!("Orchestrator worker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Orchestrator worker shutdown requested");
                    self.drain_queued().await;
                    break;
                }
                received = self.receiver.recv() => {
                    match received {
                        Some(event) => self.handle_event(event, &shutdown).await,
                        None => {
                            info!("Bus closed; orchestrator worker stopping");
                            break;
                        }
                    }
                }
            }
        }

        info!("Orchestrator worker stopped");
        Ok(())
    }

    /// Settle every event still queued on the bus.
    async fn drain_queued(&mut self) {
        // Escalation retries during the drain stop at the grace
        // deadline rather than holding shutdown open.
        let grace = CancellationToken::new();
        tokio::spawn({
            let grace = grace.clone();
            async move {
                tokio::time::sleep(DRAIN_GRACE).await;
                grace.cancel();
            }
        });

        let mut drained = 0usize;
        while let Some(event) = self.receiver.try_recv() {
            self.handle_event(event, &grace).await;
            drained += 1;
        }
        if drained > 0 {
            info!(drained, "Settled queued events during shutdown");
        }
    }

    /// Settle one bus event: commit it, absorb it as a duplicate, or
    /// escalate it.
    async fn handle_event(&self, event: BusEvent, shutdown: &CancellationToken) {
        match self.orchestrator.process(&event).await {
            Ok(AppendDisposition::Committed { entity_id, version }) => {
                debug!(%entity_id, %version, "Event committed");
            }
            Ok(AppendDisposition::AlreadyExists { entity_id, version }) => {
                debug!(%entity_id, %version, "Duplicate event absorbed");
            }
            Err(e) => {
                error!(
                    delivery_token = %event.delivery_token,
                    error = %e,
                    "Event not committed; escalating to dead-letter buffer"
                );
                self.escalate(event, &e.to_string(), shutdown).await;
            }
        }
    }

    /// Move a payload to the dead-letter buffer, retrying with back-off
    /// until it lands or shutdown is signaled.
    async fn escalate(&self, event: BusEvent, reason: &str, shutdown: &CancellationToken) {
        let mut delay = Duration::from_millis(100);
        loop {
            match self.buffer.dead_letter(event.payload.clone(), reason).await {
                Ok(()) => return,
                Err(e) => {
                    error!(
                        delivery_token = %event.delivery_token,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Dead-letter escalation failed; retrying"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            error!(
                                delivery_token = %event.delivery_token,
                                "Shutdown during escalation; payload could not be isolated"
                            );
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = (delay * 2).min(ESCALATE_MAX_DELAY);
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use inlet_buffer::{BufferError, DeadLetter, LeasedMessage, MemoryBuffer, MessageId, Receipt};
    use inlet_eventlog::MemoryEventLog;
    use inlet_orchestrator::RetryPolicy;
    use inlet_relay::{BusPublisher, EventBus};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Harness {
        bus: Arc<EventBus>,
        buffer: Arc<MemoryBuffer>,
        log: Arc<MemoryEventLog>,
        shutdown: CancellationToken,
        handle: tokio::task::JoinHandle<DaemonResult<()>>,
    }

    fn spawn_worker_over(buffer: Arc<dyn Buffer>) -> (Arc<EventBus>, Arc<MemoryEventLog>, CancellationToken, tokio::task::JoinHandle<DaemonResult<()>>) {
        let (bus, receiver) = EventBus::new(100);
        let bus = Arc::new(bus);
        let log = Arc::new(MemoryEventLog::new());

        let orchestrator = Orchestrator::new(
            log.clone() as Arc<dyn EventLog>,
            RetryPolicy::default(),
        );
        let worker = OrchestratorWorker::new(receiver, orchestrator, buffer);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));
        (bus, log, shutdown, handle)
    }

    fn spawn_worker() -> Harness {
        let buffer = Arc::new(MemoryBuffer::new());
        let (bus, log, shutdown, handle) = spawn_worker_over(buffer.clone() as Arc<dyn Buffer>);
        Harness {
            bus,
            buffer,
            log,
            shutdown,
            handle,
        }
    }

    fn relay_event(payload: serde_json::Value) -> BusEvent {
        BusEvent::from_relay(
            serde_json::to_vec(&payload).unwrap(),
            inlet_domain::DeliveryToken::generate(),
        )
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_worker_commits_published_events() {
        let harness = spawn_worker();

        harness
            .bus
            .publish(relay_event(json!({ "entity_id": "order-42", "version": 1 })))
            .await
            .unwrap();

        let log = harness.log.clone();
        wait_for(move || log.record_count() == 1).await;

        harness.shutdown.cancel();
        harness.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_worker_escalates_malformed_events() {
        let harness = spawn_worker();

        harness
            .bus
            .publish(relay_event(json!({ "noise": true })))
            .await
            .unwrap();

        let buffer = harness.buffer.clone();
        wait_for(move || buffer.dead_letter_count() == 1).await;
        assert_eq!(harness.log.record_count(), 0);

        let dead = harness.buffer.dead_letters().await.unwrap();
        assert!(dead[0].reason.contains("Malformed"));

        harness.shutdown.cancel();
        harness.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_worker_settles_queued_events_at_shutdown() {
        let harness = spawn_worker();

        // Queue events; whether the worker has polled them yet or not,
        // cancel must not abandon them.
        for version in 1..=3u64 {
            harness
                .bus
                .publish(relay_event(
                    json!({ "entity_id": "order-42", "version": version }),
                ))
                .await
                .unwrap();
        }

        harness.shutdown.cancel();
        harness.handle.await.unwrap().unwrap();

        assert_eq!(harness.log.record_count(), 3);
    }

    /// Buffer fake whose dead-letter escalation fails a set number of
    /// times before delegating to a real in-memory buffer.
    struct FlakyDeadLetterBuffer {
        inner: MemoryBuffer,
        failures_remaining: AtomicU32,
    }

    impl FlakyDeadLetterBuffer {
        fn failing(times: u32) -> Self {
            Self {
                inner: MemoryBuffer::new(),
                failures_remaining: AtomicU32::new(times),
            }
        }
    }

    #[async_trait]
    impl Buffer for FlakyDeadLetterBuffer {
        async fn enqueue(&self, payload: Vec<u8>) -> Result<MessageId, BufferError> {
            self.inner.enqueue(payload).await
        }

        async fn dequeue(
            &self,
            max_items: usize,
            visibility_timeout: Duration,
        ) -> Result<Vec<LeasedMessage>, BufferError> {
            self.inner.dequeue(max_items, visibility_timeout).await
        }

        async fn delete(&self, receipt: &Receipt) -> Result<bool, BufferError> {
            self.inner.delete(receipt).await
        }

        async fn dead_letter(&self, payload: Vec<u8>, reason: &str) -> Result<(), BufferError> {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(BufferError::Unavailable("throttled".to_string()));
            }
            self.inner.dead_letter(payload, reason).await
        }

        async fn dead_letters(&self) -> Result<Vec<DeadLetter>, BufferError> {
            self.inner.dead_letters().await
        }

        async fn depth(&self) -> Result<usize, BufferError> {
            self.inner.depth().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalation_survives_transient_buffer_failures() {
        let buffer = Arc::new(FlakyDeadLetterBuffer::failing(3));
        let (bus, log, shutdown, handle) = spawn_worker_over(buffer.clone() as Arc<dyn Buffer>);

        bus.publish(relay_event(json!({ "noise": true })))
            .await
            .unwrap();

        // Paused time: sleeps auto-advance, so the retries run out
        // quickly and the payload lands despite three failures.
        for _ in 0..1000 {
            if buffer.inner.dead_letter_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(buffer.inner.dead_letter_count(), 1);
        assert_eq!(log.record_count(), 0);

        // The worker is still alive and keeps settling events.
        bus.publish(relay_event(json!({ "entity_id": "order-42", "version": 1 })))
            .await
            .unwrap();
        for _ in 0..1000 {
            if log.record_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(log.record_count(), 1);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_worker_stops_on_cancel() {
        let harness = spawn_worker();
        harness.shutdown.cancel();
        harness.handle.await.unwrap().unwrap();
    }
}
