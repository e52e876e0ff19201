//! PostgreSQL event log implementation.
//!
//! The conditional create maps to `INSERT .. ON CONFLICT DO NOTHING`
//! on the `(entity_id, version)` primary key: zero rows affected means
//! the precondition failed and a record already exists at that key.
//!
//! This module uses dynamic queries (sqlx::query) instead of
//! compile-time checked macros (sqlx::query!) to allow compilation
//! without DATABASE_URL.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE inlet_event_log (
//!     entity_id  TEXT NOT NULL,
//!     version    BIGINT NOT NULL,
//!     payload    JSONB NOT NULL,
//!     written_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     expires_at TIMESTAMPTZ,
//!     PRIMARY KEY (entity_id, version)
//! );
//! ```

use crate::error::EventLogError;
use crate::log::{AppendOutcome, EventLog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inlet_domain::{EntityId, EventRecord, Version};
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

/// PostgreSQL-backed event log.
pub struct PgEventLog {
    pool: PgPool,
}

impl PgEventLog {
    /// Create a log over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    async fn append_if_absent(
        &self,
        record: EventRecord,
    ) -> Result<AppendOutcome, EventLogError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO inlet_event_log (entity_id, version, payload, written_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (entity_id, version) DO NOTHING
            "#,
        )
        .bind(record.entity_id.as_str())
        .bind(record.version.get() as i64)
        .bind(&record.payload)
        .bind(record.written_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            debug!(
                entity_id = %record.entity_id,
                version = %record.version,
                "Record committed"
            );
            Ok(AppendOutcome::Created)
        } else {
            warn!(
                entity_id = %record.entity_id,
                version = %record.version,
                "Duplicate append absorbed: record exists"
            );
            Ok(AppendOutcome::AlreadyExists)
        }
    }

    async fn read(
        &self,
        entity_id: &EntityId,
        version: Version,
    ) -> Result<Option<EventRecord>, EventLogError> {
        let row = sqlx::query(
            r#"
            SELECT payload, written_at, expires_at
            FROM inlet_event_log
            WHERE entity_id = $1 AND version = $2
            "#,
        )
        .bind(entity_id.as_str())
        .bind(version.get() as i64)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let written_at: DateTime<Utc> = row.try_get("written_at")?;
        let expires_at: Option<DateTime<Utc>> = row.try_get("expires_at")?;
        Ok(Some(EventRecord {
            entity_id: entity_id.clone(),
            version,
            payload: row.try_get("payload")?,
            written_at,
            expires_at,
        }))
    }

    async fn list_versions(&self, entity_id: &EntityId) -> Result<Vec<Version>, EventLogError> {
        let rows = sqlx::query(
            r#"
            SELECT version
            FROM inlet_event_log
            WHERE entity_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(entity_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut versions = Vec::with_capacity(rows.len());
        for row in rows {
            let version: i64 = row.try_get("version")?;
            // Stored versions were validated on the way in.
            if let Ok(v) = Version::new(version as u64) {
                versions.push(v);
            }
        }
        Ok(versions)
    }
}
