//! Inlet Event Log Orchestrator
//!
//! Turns a bus event into exactly one durable log record per logical
//! version. The protocol is a conditional idempotent append:
//!
//! ```text
//! START → ATTEMPT_WRITE → { COMMITTED
//!                         | ALREADY_EXISTS (treated as COMMITTED)
//!                         | RETRY → ATTEMPT_WRITE
//!                         | FAILED (terminal, escalate) }
//! ```
//!
//! A precondition failure (record already exists at the key) is the
//! expected outcome of a duplicate bus event or a concurrent run and is
//! absorbed as success. Transient store failures are retried with
//! bounded exponential back-off plus jitter. A malformed event, one
//! whose payload lacks the identity fields, is terminal: it cannot be
//! processed or meaningfully retried and must be escalated to the
//! dead-letter side channel by the caller.

#![warn(clippy::all)]

use inlet_domain::{BusEvent, DomainError, EntityId, Version};
use inlet_eventlog::{AppendOutcome, EventLog, EventLogError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Orchestrator errors. Both variants are terminal for the event; the
/// caller escalates them to the dead-letter side channel.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Event payload lacks the required identity fields; Fatal, no
    /// retry is meaningful
    #[error("Malformed event: {0}")]
    Malformed(#[from] DomainError),

    /// The conditional write kept failing after the full retry budget
    #[error("Append failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Write attempts made, the first one included
        attempts: u32,
        /// The error of the final attempt
        #[source]
        source: EventLogError,
    },
}

/// How a bus event ended up committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendDisposition {
    /// This run won the conditional write
    Committed {
        /// Partition key of the committed record
        entity_id: EntityId,
        /// Version of the committed record
        version: Version,
    },
    /// A record already existed at the key; idempotent success
    AlreadyExists {
        /// Partition key of the existing record
        entity_id: EntityId,
        /// Version of the existing record
        version: Version,
    },
}

impl AppendDisposition {
    /// The `(entity_id, version)` key this disposition settled.
    pub fn key(&self) -> (&EntityId, Version) {
        match self {
            AppendDisposition::Committed { entity_id, version }
            | AppendDisposition::AlreadyExists { entity_id, version } => (entity_id, *version),
        }
    }
}

/// Retry policy for the conditional write.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total write attempts before giving up
    pub max_attempts: u32,
    /// Back-off before the second attempt
    pub base_delay: Duration,
    /// Back-off ceiling
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to every back-off
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Back-off before attempt `attempt + 1` (attempts count from 1).
    fn delay_after(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let pow = 2u64.saturating_pow(attempt.saturating_sub(1));
        let exp = base_ms.saturating_mul(pow).min(max_ms);

        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 { 0 } else { fastrand::u64(0..=jitter_ms) };
        Duration::from_millis(exp + jitter)
    }
}

/// The event log orchestrator.
///
/// Stateless between events; safe to run many instances concurrently
/// against the same log. Correctness rests entirely on the atomicity of
/// the log's conditional create.
pub struct Orchestrator<L: EventLog + ?Sized> {
    log: std::sync::Arc<L>,
    policy: RetryPolicy,
}

impl<L: EventLog + ?Sized> Orchestrator<L> {
    /// Create an orchestrator over an event log.
    pub fn new(log: std::sync::Arc<L>, policy: RetryPolicy) -> Self {
        Self { log, policy }
    }

    /// Process one bus event to a terminal state.
    ///
    /// # Errors
    /// `OrchestratorError::Malformed` for payloads without identity
    /// fields; `OrchestratorError::RetriesExhausted` when the store kept
    /// failing. Both mean the event was *not* committed and must be
    /// escalated by the caller.
    pub async fn process(&self, event: &BusEvent) -> Result<AppendDisposition, OrchestratorError> {
        let identity = event.identity()?;
        let entity_id = identity.entity_id.clone();
        let version = identity.version;
        let record = identity.into_record();

        let mut attempt = 1u32;
        loop {
            match self.log.append_if_absent(record.clone()).await {
                Ok(AppendOutcome::Created) => {
                    info!(%entity_id, %version, attempt, "Record committed");
                    return Ok(AppendDisposition::Committed { entity_id, version });
                }
                Ok(AppendOutcome::AlreadyExists) => {
                    // Duplicate delivery or a lost race; success either way.
                    debug!(%entity_id, %version, attempt, "Duplicate append absorbed");
                    return Ok(AppendDisposition::AlreadyExists { entity_id, version });
                }
                Err(e) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        %entity_id,
                        %version,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Append attempt failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(OrchestratorError::RetriesExhausted {
                        attempts: attempt,
                        source: e,
                    });
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
    use inlet_domain::{DeliveryToken, EventRecord};
    use inlet_eventlog::MemoryEventLog;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn event(payload: serde_json::Value) -> BusEvent {
        BusEvent::from_relay(
            serde_json::to_vec(&payload).unwrap(),
            DeliveryToken::generate(),
        )
    }

    fn orchestrator(log: Arc<MemoryEventLog>) -> Orchestrator<MemoryEventLog> {
        Orchestrator::new(log, RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_commit_then_duplicate_absorbed() {
        let log = Arc::new(MemoryEventLog::new());
        let orch = orchestrator(log.clone());
        let e = event(json!({ "entity_id": "order-42", "version": 1, "amount": 1999 }));

        let first = orch.process(&e).await.unwrap();
        assert!(matches!(first, AppendDisposition::Committed { .. }));

        let second = orch.process(&e).await.unwrap();
        assert!(matches!(second, AppendDisposition::AlreadyExists { .. }));
        assert_eq!(log.record_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_event_is_fatal() {
        let log = Arc::new(MemoryEventLog::new());
        let orch = orchestrator(log.clone());
        let e = event(json!({ "version": 1 }));

        let err = orch.process(&e).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Malformed(_)));
        assert_eq!(log.record_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_commit_exactly_once() {
        let log = Arc::new(MemoryEventLog::new());
        let payload = json!({ "entity_id": "order-42", "version": 1 });

        let mut handles = Vec::new();
        for _ in 0..8 {
            let orch = orchestrator(log.clone());
            let e = event(payload.clone());
            handles.push(tokio::spawn(async move { orch.process(&e).await.unwrap() }));
        }

        let mut committed = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), AppendDisposition::Committed { .. }) {
                committed += 1;
            }
        }
        assert_eq!(committed, 1);
        assert_eq!(log.record_count(), 1);
    }

    /// Log fake that fails a set number of append attempts before
    /// delegating to a real in-memory log.
    struct FlakyLog {
        inner: MemoryEventLog,
        failures_remaining: AtomicU32,
    }

    impl FlakyLog {
        fn failing(times: u32) -> Self {
            Self {
                inner: MemoryEventLog::new(),
                failures_remaining: AtomicU32::new(times),
            }
        }
    }

    #[async_trait]
    impl EventLog for FlakyLog {
        async fn append_if_absent(
            &self,
            record: EventRecord,
        ) -> Result<AppendOutcome, EventLogError> {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(EventLogError::Unavailable("throttled".to_string()));
            }
            self.inner.append_if_absent(record).await
        }

        async fn read(
            &self,
            entity_id: &EntityId,
            version: Version,
        ) -> Result<Option<EventRecord>, EventLogError> {
            self.inner.read(entity_id, version).await
        }

        async fn list_versions(
            &self,
            entity_id: &EntityId,
        ) -> Result<Vec<Version>, EventLogError> {
            self.inner.list_versions(entity_id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retried_to_commit() {
        let log = Arc::new(FlakyLog::failing(3));
        let orch = Orchestrator::new(log.clone(), RetryPolicy::default());
        let e = event(json!({ "entity_id": "order-42", "version": 1 }));

        let disposition = orch.process(&e).await.unwrap();
        assert!(matches!(disposition, AppendDisposition::Committed { .. }));
        assert_eq!(log.inner.record_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhaustion_is_surfaced() {
        let log = Arc::new(FlakyLog::failing(u32::MAX));
        let policy = RetryPolicy { max_attempts: 3, ..RetryPolicy::default() };
        let orch = Orchestrator::new(log.clone(), policy);
        let e = event(json!({ "entity_id": "order-42", "version": 1 }));

        let err = orch.process(&e).await.unwrap_err();
        match err {
            OrchestratorError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(log.inner.record_count(), 0);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: Duration::ZERO,
        };

        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(20), Duration::from_secs(5));
    }
}
