//! Inlet Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains the value objects, the bus event envelope, and the
//! event log record types shared by every stage of the pipeline.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod envelope;
pub mod record;
pub mod value_objects;

// Re-export commonly used types
pub use envelope::{BusEvent, EventIdentity, EVENT_SOURCE_RELAY};
pub use record::EventRecord;
pub use value_objects::{DeliveryToken, DomainError, EntityId, Version};
