//! In-memory event log implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock; the conditional create is atomic under
//! the write lock.

use crate::error::EventLogError;
use crate::log::{AppendOutcome, EventLog};
use async_trait::async_trait;
use inlet_domain::{EntityId, EventRecord, Version};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tracing::debug;

/// In-memory event log for testing.
pub struct MemoryEventLog {
    records: RwLock<HashMap<EntityId, BTreeMap<Version, EventRecord>>>,
}

impl MemoryEventLog {
    /// Create a new empty log
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Total number of committed records across all entities
    pub fn record_count(&self) -> usize {
        self.records
            .read()
            .unwrap()
            .values()
            .map(|versions| versions.len())
            .sum()
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        self.records.write().unwrap().clear();
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append_if_absent(
        &self,
        record: EventRecord,
    ) -> Result<AppendOutcome, EventLogError> {
        let mut records = self.records.write().unwrap();
        let versions = records.entry(record.entity_id.clone()).or_default();

        if versions.contains_key(&record.version) {
            debug!(
                entity_id = %record.entity_id,
                version = %record.version,
                "Append precondition failed: record exists"
            );
            return Ok(AppendOutcome::AlreadyExists);
        }

        debug!(
            entity_id = %record.entity_id,
            version = %record.version,
            "Record committed"
        );
        versions.insert(record.version, record);
        Ok(AppendOutcome::Created)
    }

    async fn read(
        &self,
        entity_id: &EntityId,
        version: Version,
    ) -> Result<Option<EventRecord>, EventLogError> {
        let records = self.records.read().unwrap();
        Ok(records
            .get(entity_id)
            .and_then(|versions| versions.get(&version))
            .cloned())
    }

    async fn list_versions(&self, entity_id: &EntityId) -> Result<Vec<Version>, EventLogError> {
        let records = self.records.read().unwrap();
        Ok(records
            .get(entity_id)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn record(entity: &str, version: u64, payload: serde_json::Value) -> EventRecord {
        EventRecord::new(
            EntityId::new(entity).unwrap(),
            Version::new(version).unwrap(),
            payload,
        )
    }

    #[tokio::test]
    async fn test_append_then_read() {
        let log = MemoryEventLog::new();
        let outcome = log
            .append_if_absent(record("order-42", 1, json!({ "amount": 1999 })))
            .await
            .unwrap();
        assert_eq!(outcome, AppendOutcome::Created);

        let entity = EntityId::new("order-42").unwrap();
        let stored = log.read(&entity, Version::FIRST).await.unwrap().unwrap();
        assert_eq!(stored.payload["amount"], 1999);
    }

    #[tokio::test]
    async fn test_second_append_is_already_exists_and_mutates_nothing() {
        let log = MemoryEventLog::new();
        log.append_if_absent(record("order-42", 1, json!({ "amount": 1 })))
            .await
            .unwrap();

        let outcome = log
            .append_if_absent(record("order-42", 1, json!({ "amount": 2 })))
            .await
            .unwrap();
        assert_eq!(outcome, AppendOutcome::AlreadyExists);

        // The original record is untouched.
        let entity = EntityId::new("order-42").unwrap();
        let stored = log.read(&entity, Version::FIRST).await.unwrap().unwrap();
        assert_eq!(stored.payload["amount"], 1);
        assert_eq!(log.record_count(), 1);
    }

    #[tokio::test]
    async fn test_list_versions_ascending() {
        let log = MemoryEventLog::new();
        // Out-of-order physical writes; logical order comes from the key.
        for v in [3u64, 1, 2] {
            log.append_if_absent(record("order-42", v, json!({})))
                .await
                .unwrap();
        }

        let entity = EntityId::new("order-42").unwrap();
        let versions: Vec<u64> = log
            .list_versions(&entity)
            .await
            .unwrap()
            .iter()
            .map(|v| v.get())
            .collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let log = MemoryEventLog::new();
        let entity = EntityId::new("order-42").unwrap();
        assert!(log.read(&entity, Version::FIRST).await.unwrap().is_none());
        assert!(log.list_versions(&entity).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_have_one_winner() {
        let log = Arc::new(MemoryEventLog::new());

        let mut handles = Vec::new();
        for writer in 0..16u64 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.append_if_absent(record("order-42", 1, json!({ "writer": writer })))
                    .await
                    .unwrap()
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().created() {
                created += 1;
            }
        }

        assert_eq!(created, 1, "exactly one writer wins the version");
        assert_eq!(log.record_count(), 1);
    }
}
