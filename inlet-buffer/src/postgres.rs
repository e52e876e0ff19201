//! PostgreSQL buffer implementation.
//!
//! Durable backing for the ingestion buffer. Leasing uses
//! `FOR UPDATE SKIP LOCKED` so multiple relay workers can drain the
//! buffer concurrently without coordinating.
//!
//! This module uses dynamic queries (sqlx::query) instead of
//! compile-time checked macros (sqlx::query!) to allow compilation
//! without DATABASE_URL.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE inlet_buffer_messages (
//!     message_id     UUID PRIMARY KEY,
//!     payload        BYTEA NOT NULL,
//!     enqueued_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     receive_count  INTEGER NOT NULL DEFAULT 0,
//!     visible_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     delivery_token UUID
//! );
//!
//! CREATE TABLE inlet_dead_letters (
//!     message_id       UUID PRIMARY KEY,
//!     payload          BYTEA NOT NULL,
//!     reason           TEXT NOT NULL,
//!     receive_count    INTEGER NOT NULL,
//!     dead_lettered_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use crate::buffer::{Buffer, DeadLetter, LeasedMessage, MessageId, Receipt};
use crate::error::BufferError;
use crate::DEFAULT_MAX_RECEIVE_COUNT;
use async_trait::async_trait;
use inlet_domain::DeliveryToken;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// PostgreSQL-backed ingestion buffer.
pub struct PgBuffer {
    pool: PgPool,
    max_depth: i64,
    max_receive_count: i32,
}

impl PgBuffer {
    /// Create a buffer over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            max_depth: 100_000,
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT as i32,
        }
    }

    /// Override the capacity ceiling.
    pub fn with_max_depth(mut self, max_depth: i64) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Override the retry budget.
    pub fn with_max_receive_count(mut self, max_receive_count: u32) -> Self {
        self.max_receive_count = max_receive_count as i32;
        self
    }

    /// Move retry-exhausted visible messages to the dead-letter table.
    ///
    /// Runs ahead of leasing so a message is never delivered a
    /// `max_receive_count + 1`-th time.
    async fn isolate_exhausted(&self) -> Result<u64, BufferError> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            r#"
            WITH exhausted AS (
                DELETE FROM inlet_buffer_messages
                WHERE visible_at <= NOW()
                  AND receive_count >= $1
                RETURNING message_id, payload, receive_count
            )
            INSERT INTO inlet_dead_letters (message_id, payload, reason, receive_count)
            SELECT message_id,
                   payload,
                   'Receive count ' || receive_count || ' reached the maximum of ' || $1,
                   receive_count
            FROM exhausted
            "#,
        )
        .bind(self.max_receive_count)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if moved > 0 {
            warn!(moved, "Messages dead-lettered after exhausting retries");
        }
        Ok(moved)
    }
}

#[async_trait]
impl Buffer for PgBuffer {
    async fn enqueue(&self, payload: Vec<u8>) -> Result<MessageId, BufferError> {
        let depth: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM inlet_buffer_messages")
                .fetch_one(&self.pool)
                .await?;

        if depth >= self.max_depth {
            return Err(BufferError::Capacity {
                depth: depth as usize,
                max_depth: self.max_depth as usize,
            });
        }

        let id = MessageId::generate();
        sqlx::query(
            "INSERT INTO inlet_buffer_messages (message_id, payload) VALUES ($1, $2)",
        )
        .bind(id.as_uuid())
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        debug!(message_id = %id, "Message enqueued");
        Ok(id)
    }

    async fn dequeue(
        &self,
        max_items: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<LeasedMessage>, BufferError> {
        self.isolate_exhausted().await?;

        // Lease one row at a time so every delivery carries its own
        // token. SKIP LOCKED keeps concurrent workers off each other's
        // candidates.
        let mut leased = Vec::with_capacity(max_items);
        while leased.len() < max_items {
            let token = DeliveryToken::generate();
            let row = sqlx::query(
                r#"
                WITH candidate AS (
                    SELECT message_id
                    FROM inlet_buffer_messages
                    WHERE visible_at <= NOW()
                    ORDER BY enqueued_at
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                UPDATE inlet_buffer_messages m
                SET receive_count = m.receive_count + 1,
                    visible_at = NOW() + ($1 * interval '1 millisecond'),
                    delivery_token = $2
                FROM candidate c
                WHERE m.message_id = c.message_id
                RETURNING m.message_id, m.payload, m.enqueued_at, m.receive_count
                "#,
            )
            .bind(visibility_timeout.as_millis() as i64)
            .bind(token.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else { break };

            let message_id: Uuid = row.try_get("message_id")?;
            let receive_count: i32 = row.try_get("receive_count")?;
            leased.push(LeasedMessage {
                payload: row.try_get("payload")?,
                receipt: Receipt {
                    message_id: MessageId::from_uuid(message_id),
                    delivery_token: token,
                },
                receive_count: receive_count as u32,
                enqueued_at: row.try_get("enqueued_at")?,
            });
        }

        Ok(leased)
    }

    async fn delete(&self, receipt: &Receipt) -> Result<bool, BufferError> {
        let deleted = sqlx::query(
            "DELETE FROM inlet_buffer_messages WHERE message_id = $1 AND delivery_token = $2",
        )
        .bind(receipt.message_id.as_uuid())
        .bind(receipt.delivery_token.as_uuid())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted > 0)
    }

    async fn dead_letter(&self, payload: Vec<u8>, reason: &str) -> Result<(), BufferError> {
        sqlx::query(
            r#"
            INSERT INTO inlet_dead_letters (message_id, payload, reason, receive_count)
            VALUES ($1, $2, $3, 0)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&payload)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, BufferError> {
        let rows = sqlx::query(
            r#"
            SELECT message_id, payload, reason, receive_count, dead_lettered_at
            FROM inlet_dead_letters
            ORDER BY dead_lettered_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let message_id: Uuid = row.try_get("message_id")?;
            let receive_count: i32 = row.try_get("receive_count")?;
            entries.push(DeadLetter {
                message_id: MessageId::from_uuid(message_id),
                payload: row.try_get("payload")?,
                reason: row.try_get("reason")?,
                receive_count: receive_count as u32,
                dead_lettered_at: row.try_get("dead_lettered_at")?,
            });
        }
        Ok(entries)
    }

    async fn depth(&self) -> Result<usize, BufferError> {
        let depth: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM inlet_buffer_messages")
                .fetch_one(&self.pool)
                .await?;
        Ok(depth as usize)
    }
}
