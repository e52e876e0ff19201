//! Inlet Event Log
//!
//! Append-only, versioned store: one immutable record per
//! `(entity_id, version)`. The single correctness-critical operation of
//! the whole pipeline is `append_if_absent`: an atomic "create if
//! absent" that guarantees at most one winner per version regardless of
//! how many duplicate or racing writers attempt it. No distributed
//! locks; the storage primitive is the concurrency control.
//!
//! # Architecture
//!
//! - **`EventLog` trait**: defines the log interface (port)
//! - **In-memory log**: fast implementation for testing
//! - **PostgreSQL log**: durable implementation (feature `postgres`)

#![warn(clippy::all)]

// Modules
mod error;
mod log;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

// Re-exports
pub use error::EventLogError;
pub use log::{AppendOutcome, EventLog};
pub use memory::MemoryEventLog;
#[cfg(feature = "postgres")]
pub use postgres::PgEventLog;
