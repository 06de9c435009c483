//! User credential and session repositories

use crate::db::DatabasePool;
use crate::models::{AuthSession, MailCredentials, User};
use async_trait::async_trait;
use chrono::Utc;
use mailpilot_common::types::UserId;
use mailpilot_common::{Error, Result};

/// Resolves a user id to the refresh credential needed to act on their
/// mailbox. Returns `None` when the user never connected a mail account.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn mail_credentials(&self, user_id: UserId) -> Result<Option<MailCredentials>>;
}

/// Resolves a hashed bearer token to an authenticated session
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn resolve(&self, token_hash: &str) -> Result<Option<AuthSession>>;
}

/// Database credential repository backed by the users table
pub struct DbCredentialRepository {
    pool: DatabasePool,
}

impl DbCredentialRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: UserId) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

#[async_trait]
impl CredentialRepository for DbCredentialRepository {
    async fn mail_credentials(&self, user_id: UserId) -> Result<Option<MailCredentials>> {
        let user = self.get(user_id).await?;

        Ok(user.and_then(|u| {
            u.google_refresh_token.map(|refresh_token| MailCredentials {
                address: u.email,
                refresh_token,
            })
        }))
    }
}

/// Database session repository
pub struct DbSessionRepository {
    pool: DatabasePool,
}

impl DbSessionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for DbSessionRepository {
    async fn resolve(&self, token_hash: &str) -> Result<Option<AuthSession>> {
        let session = sqlx::query_as::<_, AuthSession>(
            r#"
            SELECT s.user_id, u.email, s.access_token, s.expires_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(session.filter(|s| !s.is_expired(Utc::now())))
    }
}
