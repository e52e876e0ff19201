//! Event log errors

use thiserror::Error;

/// Errors that can occur in the event log.
///
/// Note that a precondition failure ("record already exists") is not an
/// error: `append_if_absent` reports it as `AppendOutcome::AlreadyExists`.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// Store temporarily unavailable or throttled; retryable with
    /// back-off
    #[error("Event log unavailable: {0}")]
    Unavailable(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventLogError {
    /// Whether the failed operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EventLogError::Unavailable(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for EventLogError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                EventLogError::Unavailable(err.to_string())
            }
            sqlx::Error::Io(e) => EventLogError::Unavailable(e.to_string()),
            _ => EventLogError::Database(err.to_string()),
        }
    }
}
