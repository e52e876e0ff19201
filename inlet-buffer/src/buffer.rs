//! Buffer trait definition (Port)
//!
//! This trait defines the ingestion buffer interface. Implementations
//! can be in-memory or PostgreSQL-backed.

use crate::error::BufferError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inlet_domain::DeliveryToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Stable identity of a buffered message, assigned on enqueue.
///
/// Distinct from [`DeliveryToken`], which identifies one *delivery* of
/// the message and changes on every redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh message id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Reconstruct a message id from its stored UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for acknowledging one delivery of a message.
///
/// A receipt is only good for the lease it was issued under: once the
/// visibility timeout lapses and the message is redelivered, the old
/// receipt no longer deletes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// The message this receipt acknowledges
    pub message_id: MessageId,
    /// The delivery (lease) this receipt belongs to
    pub delivery_token: DeliveryToken,
}

/// A message handed out under a visibility-timeout lease.
#[derive(Debug, Clone)]
pub struct LeasedMessage {
    /// The opaque webhook payload
    pub payload: Vec<u8>,
    /// Receipt for deleting this message after successful processing
    pub receipt: Receipt,
    /// How many times this message has been delivered, this one included
    pub receive_count: u32,
    /// When the message was first enqueued
    pub enqueued_at: DateTime<Utc>,
}

/// A message isolated after exceeding its retry budget, or escalated
/// directly by a consumer that cannot process it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Original message id (fresh for consumer-escalated payloads)
    pub message_id: MessageId,
    /// The payload, preserved byte-for-byte
    pub payload: Vec<u8>,
    /// Why this message was isolated
    pub reason: String,
    /// Deliveries attempted before isolation
    pub receive_count: u32,
    /// When the message was moved here
    pub dead_lettered_at: DateTime<Utc>,
}

/// Ingestion buffer interface.
///
/// All operations are safe to retry: `enqueue` may duplicate under
/// retry (downstream is idempotent), `dequeue` hands out leases,
/// `delete` on a stale receipt is a no-op.
#[async_trait]
pub trait Buffer: Send + Sync {
    /// Enqueue a payload, returning its assigned message id.
    ///
    /// # Errors
    /// `BufferError::Capacity` when the buffer is full (retryable).
    async fn enqueue(&self, payload: Vec<u8>) -> Result<MessageId, BufferError>;

    /// Dequeue up to `max_items` visible messages under a lease of
    /// `visibility_timeout`.
    ///
    /// Messages whose receive count has already reached the configured
    /// maximum are moved to the dead-letter buffer instead of being
    /// returned. No ordering is guaranteed across distinct messages.
    async fn dequeue(
        &self,
        max_items: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<LeasedMessage>, BufferError>;

    /// Delete a message by receipt.
    ///
    /// Returns `true` if the message was deleted, `false` if the
    /// receipt was stale (the lease expired and the message was
    /// redelivered, or it was already deleted).
    async fn delete(&self, receipt: &Receipt) -> Result<bool, BufferError>;

    /// Escalate a payload straight to the dead-letter buffer.
    ///
    /// Used by consumers for payloads that cannot be processed or
    /// meaningfully retried (e.g. missing identity fields).
    async fn dead_letter(&self, payload: Vec<u8>, reason: &str) -> Result<(), BufferError>;

    /// Snapshot of the dead-letter buffer, oldest first.
    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, BufferError>;

    /// Number of messages currently buffered (leased ones included).
    async fn depth(&self) -> Result<usize, BufferError>;
}
