//! In-memory buffer implementation
//!
//! Used for testing and single-process deployments without a database.
//! Thread-safe using a mutex around the message map; leases are
//! tracked with `tokio::time::Instant` so tests can drive the
//! visibility clock with paused time.

use crate::buffer::{Buffer, DeadLetter, LeasedMessage, MessageId, Receipt};
use crate::error::BufferError;
use crate::DEFAULT_MAX_RECEIVE_COUNT;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inlet_domain::DeliveryToken;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Configuration for the in-memory buffer.
#[derive(Debug, Clone)]
pub struct MemoryBufferConfig {
    /// Ceiling on buffered messages before `enqueue` fails
    pub max_depth: usize,
    /// Deliveries allowed before a message is dead-lettered
    pub max_receive_count: u32,
}

impl Default for MemoryBufferConfig {
    fn default() -> Self {
        Self {
            max_depth: 10_000,
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
        }
    }
}

/// A buffered message with its lease state.
struct StoredMessage {
    payload: Vec<u8>,
    enqueued_at: DateTime<Utc>,
    receive_count: u32,
    /// Instant at which the message becomes (or became) visible
    visible_at: Instant,
    /// Token of the currently outstanding lease, if any
    lease: Option<DeliveryToken>,
}

/// In-memory ingestion buffer.
pub struct MemoryBuffer {
    messages: Mutex<HashMap<MessageId, StoredMessage>>,
    dead: Mutex<Vec<DeadLetter>>,
    config: MemoryBufferConfig,
}

impl MemoryBuffer {
    /// Create a new empty buffer with default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryBufferConfig::default())
    }

    /// Create a new empty buffer.
    pub fn with_config(config: MemoryBufferConfig) -> Self {
        Self {
            messages: Mutex::new(HashMap::new()),
            dead: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Number of dead-lettered messages.
    pub fn dead_letter_count(&self) -> usize {
        self.dead.lock().unwrap().len()
    }

    /// Clear all data (useful for test setup).
    pub fn clear(&self) {
        self.messages.lock().unwrap().clear();
        self.dead.lock().unwrap().clear();
    }

    fn push_dead(&self, entry: DeadLetter) {
        warn!(
            message_id = %entry.message_id,
            receive_count = entry.receive_count,
            reason = %entry.reason,
            "Message dead-lettered"
        );
        self.dead.lock().unwrap().push(entry);
    }
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Buffer for MemoryBuffer {
    async fn enqueue(&self, payload: Vec<u8>) -> Result<MessageId, BufferError> {
        let mut messages = self.messages.lock().unwrap();

        if messages.len() >= self.config.max_depth {
            return Err(BufferError::Capacity {
                depth: messages.len(),
                max_depth: self.config.max_depth,
            });
        }

        let id = MessageId::generate();
        messages.insert(
            id,
            StoredMessage {
                payload,
                enqueued_at: Utc::now(),
                receive_count: 0,
                visible_at: Instant::now(),
                lease: None,
            },
        );

        debug!(message_id = %id, depth = messages.len(), "Message enqueued");
        Ok(id)
    }

    async fn dequeue(
        &self,
        max_items: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<LeasedMessage>, BufferError> {
        let now = Instant::now();
        let mut messages = self.messages.lock().unwrap();

        // Visible candidates, oldest first.
        let mut candidates: Vec<MessageId> = messages
            .iter()
            .filter(|(_, m)| m.visible_at <= now)
            .map(|(id, _)| *id)
            .collect();
        candidates.sort_by_key(|id| messages[id].enqueued_at);

        let mut leased = Vec::new();
        for id in candidates {
            if leased.len() >= max_items {
                break;
            }

            let exhausted = messages
                .get(&id)
                .map(|m| m.receive_count >= self.config.max_receive_count)
                .unwrap_or(false);

            if exhausted {
                // Retry budget spent: isolate instead of delivering again.
                if let Some(message) = messages.remove(&id) {
                    self.push_dead(DeadLetter {
                        message_id: id,
                        payload: message.payload,
                        reason: format!(
                            "Receive count {} reached the maximum of {}",
                            message.receive_count, self.config.max_receive_count
                        ),
                        receive_count: message.receive_count,
                        dead_lettered_at: Utc::now(),
                    });
                }
                continue;
            }

            let message = match messages.get_mut(&id) {
                Some(m) => m,
                None => continue,
            };

            let token = DeliveryToken::generate();
            message.receive_count += 1;
            message.visible_at = now + visibility_timeout;
            message.lease = Some(token);

            leased.push(LeasedMessage {
                payload: message.payload.clone(),
                receipt: Receipt {
                    message_id: id,
                    delivery_token: token,
                },
                receive_count: message.receive_count,
                enqueued_at: message.enqueued_at,
            });
        }

        Ok(leased)
    }

    async fn delete(&self, receipt: &Receipt) -> Result<bool, BufferError> {
        let mut messages = self.messages.lock().unwrap();

        let current = messages
            .get(&receipt.message_id)
            .and_then(|m| m.lease);

        if current == Some(receipt.delivery_token) {
            messages.remove(&receipt.message_id);
            debug!(message_id = %receipt.message_id, "Message deleted");
            Ok(true)
        } else {
            // Stale receipt: the lease lapsed and the message was (or
            // will be) redelivered under a new token.
            Ok(false)
        }
    }

    async fn dead_letter(&self, payload: Vec<u8>, reason: &str) -> Result<(), BufferError> {
        self.push_dead(DeadLetter {
            message_id: MessageId::generate(),
            payload,
            reason: reason.to_string(),
            receive_count: 0,
            dead_lettered_at: Utc::now(),
        });
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, BufferError> {
        Ok(self.dead.lock().unwrap().clone())
    }

    async fn depth(&self) -> Result<usize, BufferError> {
        Ok(self.messages.lock().unwrap().len())
    }
}

// =============================================================================
// Tests
// =============================================================================
