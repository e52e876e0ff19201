//! Value Objects for the Inlet Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Domain errors for value object validation and envelope parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Entity ID must be a non-empty string
    #[error("Invalid entity id: {0}")]
    InvalidEntityId(String),

    /// Version must be >= 1
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// Payload is not a JSON object with the required identity fields
    #[error("Malformed event payload: {0}")]
    MalformedPayload(String),
}

// =============================================================================
// EntityId
// =============================================================================

/// EntityId is the partition key of the event log.
///
/// # Invariants
/// - Must be non-empty
/// - Must not exceed 512 bytes (storage partition key ceiling)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Maximum length in bytes for an entity id.
    pub const MAX_LEN: usize = 512;

    /// Create a new EntityId with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidEntityId` if empty or too long
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::InvalidEntityId(
                "Entity id must be non-empty".to_string(),
            ));
        }
        if value.len() > Self::MAX_LEN {
            return Err(DomainError::InvalidEntityId(format!(
                "Entity id exceeds {} bytes",
                Self::MAX_LEN
            )));
        }
        Ok(Self(value))
    }

    /// Get the underlying string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Version
// =============================================================================

/// Version is the sort key of the event log: a per-entity counter.
///
/// # Invariants
/// - Must be >= 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The first version of any entity.
    pub const FIRST: Version = Version(1);

    /// Create a new Version with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidVersion` if value is 0
    pub fn new(value: u64) -> Result<Self, DomainError> {
        if value == 0 {
            return Err(DomainError::InvalidVersion(
                "Version must be >= 1".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Get the underlying integer value
    pub fn get(&self) -> u64 {
        self.0
    }

    /// The version that follows this one
    pub fn next(&self) -> Version {
        Version(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// DeliveryToken
// =============================================================================

/// DeliveryToken uniquely identifies one delivery (lease) of a buffered
/// message. A redelivered message gets a fresh token; a receipt carrying
/// a stale token no longer acknowledges the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryToken(Uuid);

impl DeliveryToken {
    /// Generate a fresh delivery token
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for DeliveryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
