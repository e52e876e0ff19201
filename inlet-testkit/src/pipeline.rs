//! Fully wired in-memory pipeline for tests.

use anyhow::Result;
use inlet_buffer::{Buffer, MemoryBuffer, MemoryBufferConfig, MessageId};
use inlet_eventlog::MemoryEventLog;
use inlet_orchestrator::{Orchestrator, RetryPolicy};
use inlet_relay::{BusReceiver, EventBus, Relay, RelayConfig};
use std::sync::Arc;

/// Bus capacity for test pipelines. Kept well above any relay batch
/// size so a single-threaded pump never waits for queue space.
const TEST_BUS_CAPACITY: usize = 1024;

/// What one pump pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Messages relayed from the buffer to the bus
    pub relayed: usize,
    /// Bus events committed to the log by this pass
    pub committed: usize,
    /// Bus events absorbed as already-existing duplicates
    pub duplicates: usize,
    /// Bus events escalated to the dead-letter buffer
    pub escalated: usize,
}

/// An in-memory ingestion-to-log pipeline, pumped manually.
///
/// `pump()` runs one relay drain pass and then feeds every event the
/// pass published through the orchestrator, escalating terminal
/// failures to the dead-letter buffer exactly as the daemon's worker
/// does. Tests stay deterministic: nothing runs in the background.
pub struct Pipeline {
    /// The ingestion buffer (shared with the relay)
    pub buffer: Arc<MemoryBuffer>,
    /// The event bus
    pub bus: Arc<EventBus>,
    /// The event log
    pub log: Arc<MemoryEventLog>,
    relay: Relay<MemoryBuffer, EventBus>,
    orchestrator: Orchestrator<MemoryEventLog>,
    receiver: BusReceiver,
}

impl Pipeline {
    /// Wire a pipeline with default configuration.
    pub fn new() -> Self {
        Self::with_configs(
            MemoryBufferConfig::default(),
            RelayConfig::default(),
            RetryPolicy::default(),
        )
    }

    /// Wire a pipeline with explicit stage configuration.
    pub fn with_configs(
        buffer_config: MemoryBufferConfig,
        relay_config: RelayConfig,
        retry_policy: RetryPolicy,
    ) -> Self {
        let buffer = Arc::new(MemoryBuffer::with_config(buffer_config));
        let (bus, receiver) = EventBus::new(TEST_BUS_CAPACITY);
        let bus = Arc::new(bus);
        let log = Arc::new(MemoryEventLog::new());

        let relay = Relay::new(buffer.clone(), bus.clone(), relay_config);
        let orchestrator = Orchestrator::new(log.clone(), retry_policy);

        Self {
            buffer,
            bus,
            log,
            relay,
            orchestrator,
            receiver,
        }
    }

    /// Enqueue a webhook payload at the head of the pipeline.
    pub async fn ingest(&self, payload: Vec<u8>) -> Result<MessageId> {
        Ok(self.buffer.enqueue(payload).await?)
    }

    /// One pipeline pass: relay, then orchestrate everything published.
    pub async fn pump(&mut self) -> Result<PumpReport> {
        let drained = self.relay.drain_once().await?;

        let mut report = PumpReport {
            relayed: drained.relayed,
            ..PumpReport::default()
        };

        while let Some(event) = self.receiver.try_recv() {
            match self.orchestrator.process(&event).await {
                Ok(disposition) => {
                    if disposition_is_committed(&disposition) {
                        report.committed += 1;
                    } else {
                        report.duplicates += 1;
                    }
                }
                Err(e) => {
                    self.buffer
                        .dead_letter(event.payload.clone(), &e.to_string())
                        .await?;
                    report.escalated += 1;
                }
            }
        }

        Ok(report)
    }

    /// Pump until a pass moves nothing, or `max_passes` is reached.
    pub async fn pump_until_idle(&mut self, max_passes: usize) -> Result<PumpReport> {
        let mut total = PumpReport::default();
        for _ in 0..max_passes {
            let pass = self.pump().await?;
            if pass == PumpReport::default() {
                break;
            }
            total.relayed += pass.relayed;
            total.committed += pass.committed;
            total.duplicates += pass.duplicates;
            total.escalated += pass.escalated;
        }
        Ok(total)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn disposition_is_committed(disposition: &inlet_orchestrator::AppendDisposition) -> bool {
    matches!(
        disposition,
        inlet_orchestrator::AppendDisposition::Committed { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_payload;

    #[tokio::test]
    async fn test_pipeline_moves_a_payload_end_to_end() {
        let mut pipeline = Pipeline::new();
        pipeline.ingest(event_payload("order-42", 1)).await.unwrap();

        let report = pipeline.pump().await.unwrap();
        assert_eq!(report.relayed, 1);
        assert_eq!(report.committed, 1);
        assert_eq!(pipeline.log.record_count(), 1);
        assert_eq!(pipeline.buffer.depth().await.unwrap(), 0);
    }
}
