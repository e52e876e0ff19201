//! Bus Event Envelope
//!
//! A `BusEvent` is the published fact derived 1:1 from a successfully
//! relayed inbound message: the original payload, a source marker, and
//! the delivery token of the relay lease that produced it. It carries no
//! identity of its own; the orchestrator derives the `(entity_id,
//! version)` key from the payload when it attempts the append.

use crate::record::EventRecord;
use crate::value_objects::{DeliveryToken, DomainError, EntityId, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source marker stamped on every event published by the relay.
pub const EVENT_SOURCE_RELAY: &str = "inlet.relay";

/// A fact published on the event bus.
///
/// Consumed independently by zero or more subscribers; duplicates are
/// possible and expected under at-least-once delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    /// The original webhook payload, byte-for-byte
    pub payload: Vec<u8>,
    /// Where this event came from (always [`EVENT_SOURCE_RELAY`] today)
    pub source: String,
    /// Token of the buffer lease this event was relayed under
    pub delivery_token: DeliveryToken,
    /// When the relay published this event
    pub published_at: DateTime<Utc>,
}

impl BusEvent {
    /// Wrap a relayed payload into a bus event.
    pub fn from_relay(payload: Vec<u8>, delivery_token: DeliveryToken) -> Self {
        Self {
            payload,
            source: EVENT_SOURCE_RELAY.to_string(),
            delivery_token,
            published_at: Utc::now(),
        }
    }

    /// Derive the event log identity from the payload.
    ///
    /// Shorthand for [`EventIdentity::parse`] over this event's payload.
    pub fn identity(&self) -> Result<EventIdentity, DomainError> {
        EventIdentity::parse(&self.payload)
    }
}

/// The `(entity_id, version)` identity plus body extracted from a
/// webhook payload.
///
/// The upstream producer supplies the version; a payload without
/// `entity_id` or with `version < 1` cannot be appended and cannot be
/// meaningfully retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventIdentity {
    /// Event log partition key
    pub entity_id: EntityId,
    /// Producer-supplied intended version
    pub version: Version,
    /// The full payload body, retained for the log record
    pub body: serde_json::Value,
}

impl EventIdentity {
    /// Parse identity fields out of a raw payload.
    ///
    /// The payload must be a JSON object carrying a string `entity_id`
    /// and an integer `version >= 1`.
    ///
    /// # Errors
    /// Returns `DomainError::MalformedPayload` for non-JSON or non-object
    /// payloads and for missing/mistyped identity fields;
    /// `DomainError::InvalidEntityId` / `DomainError::InvalidVersion` for
    /// fields that are present but out of range.
    pub fn parse(payload: &[u8]) -> Result<Self, DomainError> {
        let body: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| DomainError::MalformedPayload(format!("Payload is not JSON: {}", e)))?;

        let object = body
            .as_object()
            .ok_or_else(|| DomainError::MalformedPayload("Payload is not a JSON object".to_string()))?;

        let entity_id = object
            .get("entity_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                DomainError::MalformedPayload("Missing string field: entity_id".to_string())
            })?;
        let entity_id = EntityId::new(entity_id)?;

        let version = object
            .get("version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                DomainError::MalformedPayload("Missing integer field: version".to_string())
            })?;
        let version = Version::new(version)?;

        Ok(Self { entity_id, version, body })
    }

    /// Build the event log record this identity commits to.
    pub fn into_record(self) -> EventRecord {
        EventRecord::new(self.entity_id, self.version, self.body)
    }
}

// =============================================================================
// Tests
// =============================================================================
