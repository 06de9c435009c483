//! Recurring mail repository

use crate::db::DatabasePool;
use crate::models::{CreateRecurringMail, RecurringMail, UpdateRecurringMail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailpilot_common::types::{RecurringMailId, UserId};
use mailpilot_common::{Error, Result};
use uuid::Uuid;

/// Recurring mail repository trait
#[async_trait]
pub trait RecurringMailRepository: Send + Sync {
    async fn create(
        &self,
        input: CreateRecurringMail,
        next_run_at: DateTime<Utc>,
    ) -> Result<RecurringMail>;
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<RecurringMail>>;
    async fn get_for_user(
        &self,
        id: RecurringMailId,
        user_id: UserId,
    ) -> Result<Option<RecurringMail>>;
    async fn update_for_user(
        &self,
        id: RecurringMailId,
        user_id: UserId,
        changes: UpdateRecurringMail,
        next_run_at: DateTime<Utc>,
    ) -> Result<Option<RecurringMail>>;
    /// Flip the active flag. `next_run_at` is only set when reactivating;
    /// deactivation leaves the stored next run frozen.
    async fn set_active(
        &self,
        id: RecurringMailId,
        user_id: UserId,
        active: bool,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<Option<RecurringMail>>;
    async fn delete_for_user(&self, id: RecurringMailId, user_id: UserId) -> Result<bool>;
    /// Active definitions whose next run has passed, earliest first
    async fn find_due_active(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RecurringMail>>;
    /// Record a completed run: set last sent and advance the next run
    async fn mark_ran(
        &self,
        id: RecurringMailId,
        last_sent_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<Option<RecurringMail>>;
}

/// Database recurring mail repository
pub struct DbRecurringMailRepository {
    pool: DatabasePool,
}

impl DbRecurringMailRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn json_array(values: &[String]) -> serde_json::Value {
    serde_json::json!(values)
}

#[async_trait]
impl RecurringMailRepository for DbRecurringMailRepository {
    async fn create(
        &self,
        input: CreateRecurringMail,
        next_run_at: DateTime<Utc>,
    ) -> Result<RecurringMail> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query_as::<_, RecurringMail>(
            r#"
            INSERT INTO recurring_mails (
                id, user_id, name, from_address, recipients, cc, bcc,
                subject, html_body, days_of_week, send_time, timezone,
                is_active, next_run_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, true, $13, $14, $14)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.user_id)
        .bind(&input.name)
        .bind(&input.from_address)
        .bind(json_array(&input.recipients))
        .bind(json_array(&input.cc))
        .bind(json_array(&input.bcc))
        .bind(&input.subject)
        .bind(&input.html_body)
        .bind(serde_json::json!(input.days_of_week))
        .bind(&input.send_time)
        .bind(&input.timezone)
        .bind(next_run_at)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<RecurringMail>> {
        sqlx::query_as::<_, RecurringMail>(
            "SELECT * FROM recurring_mails WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_for_user(
        &self,
        id: RecurringMailId,
        user_id: UserId,
    ) -> Result<Option<RecurringMail>> {
        sqlx::query_as::<_, RecurringMail>(
            "SELECT * FROM recurring_mails WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_for_user(
        &self,
        id: RecurringMailId,
        user_id: UserId,
        changes: UpdateRecurringMail,
        next_run_at: DateTime<Utc>,
    ) -> Result<Option<RecurringMail>> {
        sqlx::query_as::<_, RecurringMail>(
            r#"
            UPDATE recurring_mails SET
                name = COALESCE($3, name),
                from_address = COALESCE($4, from_address),
                recipients = COALESCE($5, recipients),
                cc = COALESCE($6, cc),
                bcc = COALESCE($7, bcc),
                subject = COALESCE($8, subject),
                html_body = COALESCE($9, html_body),
                days_of_week = COALESCE($10, days_of_week),
                send_time = COALESCE($11, send_time),
                timezone = COALESCE($12, timezone),
                next_run_at = $13,
                updated_at = $14
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&changes.name)
        .bind(&changes.from_address)
        .bind(changes.recipients.as_deref().map(json_array))
        .bind(changes.cc.as_deref().map(json_array))
        .bind(changes.bcc.as_deref().map(json_array))
        .bind(&changes.subject)
        .bind(&changes.html_body)
        .bind(changes.days_of_week.map(|d| serde_json::json!(d)))
        .bind(&changes.send_time)
        .bind(&changes.timezone)
        .bind(next_run_at)
        .bind(Utc::now())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn set_active(
        &self,
        id: RecurringMailId,
        user_id: UserId,
        active: bool,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<Option<RecurringMail>> {
        sqlx::query_as::<_, RecurringMail>(
            r#"
            UPDATE recurring_mails SET
                is_active = $3,
                next_run_at = COALESCE($4, next_run_at),
                updated_at = $5
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(active)
        .bind(next_run_at)
        .bind(Utc::now())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn delete_for_user(&self, id: RecurringMailId, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM recurring_mails WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_due_active(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RecurringMail>> {
        sqlx::query_as::<_, RecurringMail>(
            r#"
            SELECT * FROM recurring_mails
            WHERE is_active = true
              AND next_run_at <= $1
            ORDER BY next_run_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_ran(
        &self,
        id: RecurringMailId,
        last_sent_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<Option<RecurringMail>> {
        sqlx::query_as::<_, RecurringMail>(
            r#"
            UPDATE recurring_mails SET
                last_sent_at = $2,
                next_run_at = $3,
                updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(last_sent_at)
        .bind(next_run_at)
        .bind(Utc::now())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
