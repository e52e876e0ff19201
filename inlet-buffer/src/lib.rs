//! Inlet Ingestion Buffer
//!
//! A durable FIFO-ish queue of inbound webhook payloads with
//! at-least-once delivery semantics:
//!
//! - **Visibility-timeout leasing**: a dequeued-but-undeleted message
//!   becomes visible again after its lease expires
//! - **Receive counts**: incremented on every delivery; a message that
//!   has already been delivered `max_receive_count` times is moved to
//!   the dead-letter buffer instead of being delivered again
//! - **Capacity ceiling**: `enqueue` fails with a retryable error when
//!   the buffer is full
//!
//! # Architecture
//!
//! - **`Buffer` trait**: defines the buffering interface (port)
//! - **In-memory buffer**: fast implementation for testing and
//!   single-process deployments
//! - **PostgreSQL buffer**: durable implementation (feature `postgres`)

#![warn(clippy::all)]

// Modules
mod buffer;
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

// Re-exports
pub use buffer::{Buffer, DeadLetter, LeasedMessage, MessageId, Receipt};
pub use error::BufferError;
pub use memory::{MemoryBuffer, MemoryBufferConfig};
#[cfg(feature = "postgres")]
pub use postgres::PgBuffer;

/// Default retry budget before a message is dead-lettered.
///
/// Matches the redrive policy of the queue this buffer stands in for.
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 3;
