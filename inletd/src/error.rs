//! Daemon error types.

use inlet_buffer::BufferError;
use inlet_eventlog::EventLogError;
use inlet_relay::RelayError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Buffer error
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Event log error
    #[error("Event log error: {0}")]
    EventLog(#[from] EventLogError),

    /// Relay error
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Background task failed to join
    #[error("Worker task error: {0}")]
    Task(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
