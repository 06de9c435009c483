//! Outbound message repository

use crate::db::DatabasePool;
use crate::models::{CreateOutboundMessage, MessageStatus, OutboundMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailpilot_common::types::{MessageId, UserId};
use mailpilot_common::{Error, Result};
use uuid::Uuid;

/// Outbound message repository trait
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, input: CreateOutboundMessage) -> Result<OutboundMessage>;
    async fn get(&self, id: MessageId) -> Result<Option<OutboundMessage>>;
    async fn list_by_user(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OutboundMessage>>;
    /// Pending messages whose scheduled time has passed, earliest first
    async fn find_due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboundMessage>>;
    async fn update_status(
        &self,
        id: MessageId,
        status: MessageStatus,
    ) -> Result<Option<OutboundMessage>>;
    /// Record the first open; later calls are no-ops
    async fn mark_opened(&self, id: MessageId) -> Result<()>;
    /// Record the first detected reply; later calls are no-ops
    async fn mark_replied(&self, id: MessageId) -> Result<()>;
}

/// Database outbound message repository
pub struct DbMessageRepository {
    pool: DatabasePool,
}

impl DbMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for DbMessageRepository {
    async fn create(&self, input: CreateOutboundMessage) -> Result<OutboundMessage> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query_as::<_, OutboundMessage>(
            r#"
            INSERT INTO outbound_messages (
                id, user_id, from_address, to_address, cc_address, bcc_address,
                subject, html_body, status, scheduled_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $10)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.user_id)
        .bind(&input.from_address)
        .bind(&input.to_address)
        .bind(&input.cc_address)
        .bind(&input.bcc_address)
        .bind(&input.subject)
        .bind(&input.html_body)
        .bind(input.scheduled_at)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: MessageId) -> Result<Option<OutboundMessage>> {
        sqlx::query_as::<_, OutboundMessage>("SELECT * FROM outbound_messages WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OutboundMessage>> {
        sqlx::query_as::<_, OutboundMessage>(
            r#"
            SELECT * FROM outbound_messages
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboundMessage>> {
        sqlx::query_as::<_, OutboundMessage>(
            r#"
            SELECT * FROM outbound_messages
            WHERE status = 'pending'
              AND scheduled_at IS NOT NULL
              AND scheduled_at <= $1
            ORDER BY scheduled_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_status(
        &self,
        id: MessageId,
        status: MessageStatus,
    ) -> Result<Option<OutboundMessage>> {
        // Sent and failed are terminal: a record never leaves them
        sqlx::query_as::<_, OutboundMessage>(
            r#"
            UPDATE outbound_messages SET status = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_opened(&self, id: MessageId) -> Result<()> {
        sqlx::query(
            "UPDATE outbound_messages SET opened_at = COALESCE(opened_at, $2) WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_replied(&self, id: MessageId) -> Result<()> {
        sqlx::query(
            "UPDATE outbound_messages SET replied_at = COALESCE(replied_at, $2) WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
