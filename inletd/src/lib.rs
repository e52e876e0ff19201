//! Inlet Daemon
//!
//! Runtime orchestrator for the webhook ingestion pipeline: the ingest
//! API, the relay, and the orchestrator worker, wired over a shared
//! buffer, bus, and event log.

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
#[cfg(feature = "postgres")]
pub mod db;
pub mod error;
pub mod worker;

pub use config::{Config, Environment};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
