//! In-memory repositories and a scripted vendor for engine tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailpilot_common::types::{MessageId, RecurringMailId, UserId};
use mailpilot_common::{Error, Result};
use mailpilot_core::delivery::{DeliveryVendor, OutboundEmail, SendCredentials};
use mailpilot_storage::models::{
    CreateOutboundMessage, CreateRecurringMail, MailCredentials, MessageStatus, OutboundMessage,
    RecurringMail, UpdateRecurringMail,
};
use mailpilot_storage::repository::{
    CredentialRepository, MessageRepository, RecurringMailRepository,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

/// In-memory message store
pub struct MemoryMessages {
    rows: Mutex<Vec<OutboundMessage>>,
    due_queries: AtomicUsize,
}

impl MemoryMessages {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            due_queries: AtomicUsize::new(0),
        }
    }

    pub fn all(&self) -> Vec<OutboundMessage> {
        self.rows.lock().unwrap().clone()
    }

    pub fn status_of(&self, id: MessageId) -> String {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.status.clone())
            .expect("message not found")
    }

    pub fn opened_at(&self, id: MessageId) -> Option<DateTime<Utc>> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .and_then(|m| m.opened_at)
    }

    pub fn due_query_count(&self) -> usize {
        self.due_queries.load(Ordering::SeqCst)
    }

    pub async fn seed(&self, input: CreateOutboundMessage) -> MessageId {
        MessageRepository::create(self, input)
            .await
            .expect("seed message")
            .id
    }
}

#[async_trait]
impl MessageRepository for MemoryMessages {
    async fn create(&self, input: CreateOutboundMessage) -> Result<OutboundMessage> {
        let message = OutboundMessage {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            from_address: input.from_address,
            to_address: input.to_address,
            cc_address: input.cc_address,
            bcc_address: input.bcc_address,
            subject: input.subject,
            html_body: input.html_body,
            status: "pending".to_string(),
            scheduled_at: input.scheduled_at,
            opened_at: None,
            replied_at: None,
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().push(message.clone());
        Ok(message)
    }

    async fn get(&self, id: MessageId) -> Result<Option<OutboundMessage>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OutboundMessage>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.user_id == user_id)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn find_due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboundMessage>> {
        self.due_queries.fetch_add(1, Ordering::SeqCst);
        let mut due: Vec<OutboundMessage> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.status == "pending" && m.scheduled_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|m| m.scheduled_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn update_status(
        &self,
        id: MessageId,
        status: MessageStatus,
    ) -> Result<Option<OutboundMessage>> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .iter_mut()
            .find(|m| m.id == id && m.status == "pending")
            .map(|m| {
                m.status = status.to_string();
                m.clone()
            }))
    }

    async fn mark_opened(&self, id: MessageId) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(m) = rows.iter_mut().find(|m| m.id == id) {
            m.opened_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn mark_replied(&self, id: MessageId) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(m) = rows.iter_mut().find(|m| m.id == id) {
            m.replied_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }
}

/// In-memory recurring mail store
pub struct MemoryRecurring {
    rows: Mutex<Vec<RecurringMail>>,
    due_queries: AtomicUsize,
}

impl MemoryRecurring {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            due_queries: AtomicUsize::new(0),
        }
    }

    pub fn due_query_count(&self) -> usize {
        self.due_queries.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: RecurringMailId) -> RecurringMail {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .expect("recurring mail not found")
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().unwrap().is_empty()
    }

    /// Pull the next run into the past so the sweep picks it up
    pub fn force_due(&self, id: RecurringMailId) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(r) = rows.iter_mut().find(|r| r.id == id) {
            r.next_run_at = Utc::now() - chrono::Duration::minutes(1);
        }
    }
}

#[async_trait]
impl RecurringMailRepository for MemoryRecurring {
    async fn create(
        &self,
        input: CreateRecurringMail,
        next_run_at: DateTime<Utc>,
    ) -> Result<RecurringMail> {
        let now = Utc::now();
        let mail = RecurringMail {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            name: input.name,
            from_address: input.from_address,
            recipients: serde_json::json!(input.recipients),
            cc: serde_json::json!(input.cc),
            bcc: serde_json::json!(input.bcc),
            subject: input.subject,
            html_body: input.html_body,
            days_of_week: serde_json::json!(input.days_of_week),
            send_time: input.send_time,
            timezone: input.timezone,
            is_active: true,
            last_sent_at: None,
            next_run_at,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().push(mail.clone());
        Ok(mail)
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<RecurringMail>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_for_user(
        &self,
        id: RecurringMailId,
        user_id: UserId,
    ) -> Result<Option<RecurringMail>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id && r.user_id == user_id)
            .cloned())
    }

    async fn update_for_user(
        &self,
        id: RecurringMailId,
        user_id: UserId,
        changes: UpdateRecurringMail,
        next_run_at: DateTime<Utc>,
    ) -> Result<Option<RecurringMail>> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .iter_mut()
            .find(|r| r.id == id && r.user_id == user_id)
            .map(|r| {
                if let Some(name) = changes.name {
                    r.name = name;
                }
                if let Some(from) = changes.from_address {
                    r.from_address = from;
                }
                if let Some(recipients) = changes.recipients {
                    r.recipients = serde_json::json!(recipients);
                }
                if let Some(cc) = changes.cc {
                    r.cc = serde_json::json!(cc);
                }
                if let Some(bcc) = changes.bcc {
                    r.bcc = serde_json::json!(bcc);
                }
                if let Some(subject) = changes.subject {
                    r.subject = subject;
                }
                if let Some(body) = changes.html_body {
                    r.html_body = body;
                }
                if let Some(days) = changes.days_of_week {
                    r.days_of_week = serde_json::json!(days);
                }
                if let Some(time) = changes.send_time {
                    r.send_time = time;
                }
                if let Some(tz) = changes.timezone {
                    r.timezone = tz;
                }
                r.next_run_at = next_run_at;
                r.updated_at = Utc::now();
                r.clone()
            }))
    }

    async fn set_active(
        &self,
        id: RecurringMailId,
        user_id: UserId,
        active: bool,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<Option<RecurringMail>> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .iter_mut()
            .find(|r| r.id == id && r.user_id == user_id)
            .map(|r| {
                r.is_active = active;
                if let Some(next) = next_run_at {
                    r.next_run_at = next;
                }
                r.updated_at = Utc::now();
                r.clone()
            }))
    }

    async fn delete_for_user(&self, id: RecurringMailId, user_id: UserId) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !(r.id == id && r.user_id == user_id));
        Ok(rows.len() < before)
    }

    async fn find_due_active(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RecurringMail>> {
        self.due_queries.fetch_add(1, Ordering::SeqCst);
        let mut due: Vec<RecurringMail> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.is_active && r.next_run_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|r| r.next_run_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn mark_ran(
        &self,
        id: RecurringMailId,
        last_sent_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<Option<RecurringMail>> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.iter_mut().find(|r| r.id == id).map(|r| {
            r.last_sent_at = Some(last_sent_at);
            r.next_run_at = next_run_at;
            r.updated_at = Utc::now();
            r.clone()
        }))
    }
}

/// In-memory credential resolver
pub struct MemoryCredentials {
    map: Mutex<HashMap<UserId, MailCredentials>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    pub fn connect(&self, user_id: UserId, address: &str, refresh_token: &str) {
        self.map.lock().unwrap().insert(
            user_id,
            MailCredentials {
                address: address.to_string(),
                refresh_token: refresh_token.to_string(),
            },
        );
    }
}

#[async_trait]
impl CredentialRepository for MemoryCredentials {
    async fn mail_credentials(&self, user_id: UserId) -> Result<Option<MailCredentials>> {
        Ok(self.map.lock().unwrap().get(&user_id).cloned())
    }
}

/// Scripted vendor: records every call, errors or rejects for configured
/// addresses, and can block on a gate to hold a sweep open.
pub struct ScriptedVendor {
    calls: Mutex<Vec<OutboundEmail>>,
    fail_addresses: Mutex<HashSet<String>>,
    reject_addresses: Mutex<HashSet<String>>,
    gate: Option<std::sync::Arc<Notify>>,
    entered: Option<std::sync::Arc<Notify>>,
}

impl ScriptedVendor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_addresses: Mutex::new(HashSet::new()),
            reject_addresses: Mutex::new(HashSet::new()),
            gate: None,
            entered: None,
        }
    }

    /// A vendor whose send blocks until `gate` is notified, signalling
    /// `entered` when the call begins
    pub fn gated(gate: std::sync::Arc<Notify>, entered: std::sync::Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            entered: Some(entered),
            ..Self::new()
        }
    }

    pub fn fail_for(&self, address: &str) {
        self.fail_addresses
            .lock()
            .unwrap()
            .insert(address.to_string());
    }

    pub fn reject_for(&self, address: &str) {
        self.reject_addresses
            .lock()
            .unwrap()
            .insert(address.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<OutboundEmail> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryVendor for ScriptedVendor {
    async fn send(&self, email: &OutboundEmail, _credentials: &SendCredentials) -> Result<bool> {
        self.calls.lock().unwrap().push(email.clone());

        if let Some(entered) = &self.entered {
            entered.notify_one();
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if self.fail_addresses.lock().unwrap().contains(&email.to) {
            return Err(Error::Delivery("scripted transport failure".to_string()));
        }
        if self.reject_addresses.lock().unwrap().contains(&email.to) {
            return Ok(false);
        }
        Ok(true)
    }
}
