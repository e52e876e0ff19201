//! EventLog trait definition (Port)

use crate::error::EventLogError;
use async_trait::async_trait;
use inlet_domain::{EntityId, EventRecord, Version};

/// Result of a conditional append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record was committed; this writer won the version
    Created,
    /// A record already exists at this `(entity_id, version)`.
    ///
    /// The expected outcome of a duplicate bus event or a lost race,
    /// treated as idempotent success, never as an error.
    AlreadyExists,
}

impl AppendOutcome {
    /// Whether this append physically wrote the record.
    pub fn created(&self) -> bool {
        matches!(self, AppendOutcome::Created)
    }
}

/// Append-only, versioned event log interface.
///
/// `read` and `list_versions` reflect all previously committed
/// `Created` results for the same entity (read-after-write consistency
/// per partition).
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Atomically create the record unless one already exists at its
    /// `(entity_id, version)` key.
    ///
    /// Either the record fully commits or nothing is observable; no
    /// intermediate state exists even if the caller abandons the call.
    async fn append_if_absent(&self, record: EventRecord)
        -> Result<AppendOutcome, EventLogError>;

    /// Read the record at `(entity_id, version)`, if committed.
    async fn read(
        &self,
        entity_id: &EntityId,
        version: Version,
    ) -> Result<Option<EventRecord>, EventLogError>;

    /// All committed versions for an entity, ascending.
    async fn list_versions(&self, entity_id: &EntityId) -> Result<Vec<Version>, EventLogError>;
}
