//! Test helpers for Inlet pipeline tests.
//!
//! Provides payload builders and a fully wired in-memory pipeline that
//! is pumped manually, so tests drive every stage deterministically
//! with no background tasks.

mod pipeline;

pub use pipeline::{Pipeline, PumpReport};

use serde_json::json;

/// Build a well-formed webhook payload for `(entity_id, version)`.
pub fn event_payload(entity_id: &str, version: u64) -> Vec<u8> {
    event_payload_with(entity_id, version, json!({}))
}

/// Build a well-formed webhook payload carrying extra body fields.
pub fn event_payload_with(entity_id: &str, version: u64, extra: serde_json::Value) -> Vec<u8> {
    let mut body = json!({
        "entity_id": entity_id,
        "version": version,
    });
    if let (Some(map), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            map.insert(key.clone(), value.clone());
        }
    }
    serde_json::to_vec(&body).expect("payload serializes")
}

/// Build a payload the orchestrator cannot parse (no identity fields).
pub fn malformed_payload() -> Vec<u8> {
    serde_json::to_vec(&json!({ "noise": true })).expect("payload serializes")
}
