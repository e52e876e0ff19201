//! Buffer layer errors

use thiserror::Error;

/// Errors that can occur in the ingestion buffer
#[derive(Debug, Error)]
pub enum BufferError {
    /// Buffer is at its capacity ceiling; the caller should retry with
    /// back-off
    #[error("Buffer at capacity: {depth}/{max_depth} messages")]
    Capacity {
        /// Current number of buffered messages
        depth: usize,
        /// Configured ceiling
        max_depth: usize,
    },

    /// Buffer temporarily unavailable; retryable
    #[error("Buffer unavailable: {0}")]
    Unavailable(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),
}

impl BufferError {
    /// Whether the caller may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BufferError::Capacity { .. } | BufferError::Unavailable(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for BufferError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                BufferError::Unavailable(err.to_string())
            }
            sqlx::Error::Io(e) => BufferError::Unavailable(e.to_string()),
            _ => BufferError::Database(err.to_string()),
        }
    }
}
