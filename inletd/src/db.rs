//! PostgreSQL wiring for durable deployments (feature `postgres`).

use crate::config::Config;
use crate::daemon::Daemon;
use crate::error::{DaemonError, DaemonResult};
use inlet_buffer::PgBuffer;
use inlet_eventlog::PgEventLog;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Connect a pool to the database named by `INLET_DATABASE_URL`.
pub async fn connect_from_env() -> DaemonResult<PgPool> {
    let url = std::env::var("INLET_DATABASE_URL")
        .map_err(|_| DaemonError::Config("INLET_DATABASE_URL is not set".to_string()))?;
    connect(&url).await
}

/// Connect a pool to a database URL.
pub async fn connect(url: &str) -> DaemonResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await
        .map_err(|e| DaemonError::Config(format!("Failed to connect to database: {}", e)))
}

impl Daemon {
    /// Create a daemon over PostgreSQL-backed buffer and event log.
    pub fn new_postgres(config: Config, pool: PgPool) -> Self {
        let buffer = PgBuffer::new(pool.clone())
            .with_max_depth(config.buffer.max_depth as i64)
            .with_max_receive_count(config.buffer.max_receive_count);
        let log = PgEventLog::new(pool);

        Self::new(config, Arc::new(buffer), Arc::new(log))
    }
}
