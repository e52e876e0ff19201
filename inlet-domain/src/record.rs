//! Event Log Records
//!
//! One record per `(entity_id, version)`, immutable once written.

use crate::value_objects::{EntityId, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A committed record in the append-only event log.
///
/// # Invariants
/// - Exactly one record exists per `(entity_id, version)`
/// - Never mutated or deleted after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Partition key
    pub entity_id: EntityId,
    /// Sort key, per-entity counter starting at 1
    pub version: Version,
    /// The event payload body
    pub payload: serde_json::Value,
    /// When the conditional write committed
    pub written_at: DateTime<Utc>,
    /// Optional expiry instant for external retention policies.
    ///
    /// Stored verbatim and never consulted for correctness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// Create a new record stamped with the current time.
    pub fn new(entity_id: EntityId, version: Version, payload: serde_json::Value) -> Self {
        Self {
            entity_id,
            version,
            payload,
            written_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Attach an expiry instant for external retention.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}
