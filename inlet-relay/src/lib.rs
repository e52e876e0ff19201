//! Inlet Relay
//!
//! Moves each message from the ingestion buffer to the event bus
//! **at least once**: dequeue a batch, publish every message, and
//! delete a message from the buffer only after its publish was
//! acknowledged. A message whose publish fails is left leased; the
//! visibility timeout redrives it, bounded by the buffer's
//! receive-count policy.
//!
//! Duplicate bus events for the same original payload are possible and
//! expected: downstream appends are idempotent.

#![warn(clippy::all)]

mod bus;
mod publisher;
mod relay;

pub use bus::{BusReceiver, EventBus};
pub use publisher::{BusPublisher, PublishError};
pub use relay::{DrainReport, Relay, RelayConfig, RelayError};
