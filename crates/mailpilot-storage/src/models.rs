//! Database models

use chrono::{DateTime, Utc};
use mailpilot_common::types::{MessageId, RecurringMailId, UserId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Outbound message status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Pending => write!(f, "pending"),
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MessageStatus::Pending),
            "sent" => Ok(MessageStatus::Sent),
            "failed" => Ok(MessageStatus::Failed),
            _ => Err(format!("Invalid message status: {}", s)),
        }
    }
}

/// Outbound message model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: MessageId,
    pub user_id: UserId,
    pub from_address: String,
    pub to_address: String,
    pub cc_address: Option<String>,
    pub bcc_address: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    /// Get status enum
    pub fn status_enum(&self) -> Option<MessageStatus> {
        self.status.parse().ok()
    }
}

/// Create outbound message input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOutboundMessage {
    pub user_id: UserId,
    pub from_address: String,
    pub to_address: String,
    pub cc_address: Option<String>,
    pub bcc_address: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Recurring mail model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RecurringMail {
    pub id: RecurringMailId,
    pub user_id: UserId,
    pub name: String,
    pub from_address: String,
    /// JSON array of recipient addresses
    pub recipients: serde_json::Value,
    /// JSON array of cc addresses
    pub cc: serde_json::Value,
    /// JSON array of bcc addresses
    pub bcc: serde_json::Value,
    pub subject: String,
    pub html_body: String,
    /// JSON array of weekday numbers, 0-6 with Sunday = 0
    pub days_of_week: serde_json::Value,
    /// "HH:MM", 24h, in the definition's timezone
    pub send_time: String,
    /// IANA timezone name
    pub timezone: String,
    pub is_active: bool,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringMail {
    /// Get recipients as a vector
    pub fn recipients_vec(&self) -> Vec<String> {
        serde_json::from_value(self.recipients.clone()).unwrap_or_default()
    }

    /// Get cc addresses as a vector
    pub fn cc_vec(&self) -> Vec<String> {
        serde_json::from_value(self.cc.clone()).unwrap_or_default()
    }

    /// Get bcc addresses as a vector
    pub fn bcc_vec(&self) -> Vec<String> {
        serde_json::from_value(self.bcc.clone()).unwrap_or_default()
    }

    /// Get the weekday set as a vector
    pub fn days_vec(&self) -> Vec<u32> {
        serde_json::from_value(self.days_of_week.clone()).unwrap_or_default()
    }
}

/// Create recurring mail input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecurringMail {
    pub user_id: UserId,
    pub name: String,
    pub from_address: String,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub days_of_week: Vec<u32>,
    pub send_time: String,
    pub timezone: String,
}

/// Update recurring mail input (partial)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRecurringMail {
    pub name: Option<String>,
    pub from_address: Option<String>,
    pub recipients: Option<Vec<String>>,
    pub cc: Option<Vec<String>>,
    pub bcc: Option<Vec<String>>,
    pub subject: Option<String>,
    pub html_body: Option<String>,
    pub days_of_week: Option<Vec<u32>>,
    pub send_time: Option<String>,
    pub timezone: Option<String>,
}

/// User model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub google_refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Refresh credential for acting on a user's mailbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailCredentials {
    /// The mailbox address the credential belongs to
    pub address: String,
    pub refresh_token: String,
}

/// Resolved bearer session
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: UserId,
    pub email: String,
    /// Short-lived Google access token captured at sign-in, if still held
    pub access_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_status_round_trip() {
        for status in [
            MessageStatus::Pending,
            MessageStatus::Sent,
            MessageStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<MessageStatus>(), Ok(status));
        }
        assert!("bounced".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn test_recurring_mail_accessors() {
        let mail = RecurringMail {
            id: uuid::Uuid::nil(),
            user_id: uuid::Uuid::nil(),
            name: "weekly".to_string(),
            from_address: "me@example.com".to_string(),
            recipients: serde_json::json!(["a@x.com", "b@x.com"]),
            cc: serde_json::json!([]),
            bcc: serde_json::json!(null),
            subject: "s".to_string(),
            html_body: "b".to_string(),
            days_of_week: serde_json::json!([1, 3, 5]),
            send_time: "09:00".to_string(),
            timezone: "UTC".to_string(),
            is_active: true,
            last_sent_at: None,
            next_run_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(mail.recipients_vec(), vec!["a@x.com", "b@x.com"]);
        assert_eq!(mail.days_vec(), vec![1, 3, 5]);
        assert!(mail.cc_vec().is_empty());
        assert!(mail.bcc_vec().is_empty());
    }
}
