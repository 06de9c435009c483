//! Mail Orchestration Engine
//!
//! Composes, persists, and dispatches one-off messages; runs the
//! due-scheduled and due-recurring sweeps; recomputes next-run instants;
//! records opens and replies. Every operation re-reads from the
//! repositories so concurrent sweeps never act on stale copies.

use crate::delivery::{DeliveryVendor, OutboundEmail, SendCredentials};
use crate::{recurrence, tracking};
use chrono::{DateTime, Utc};
use mailpilot_common::types::{MessageId, RecurringMailId, UserId};
use mailpilot_common::{Error, Result};
use mailpilot_storage::models::{
    CreateOutboundMessage, CreateRecurringMail, MessageStatus, OutboundMessage, RecurringMail,
    UpdateRecurringMail,
};
use mailpilot_storage::repository::{
    CredentialRepository, MessageRepository, RecurringMailRepository,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A compose request entering the engine
#[derive(Debug, Clone, Deserialize)]
pub struct ComposeRequest {
    pub from: String,
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: String,
    pub content: String,
    /// Future instant for the deferred path; absent or past means send now
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Configured public base URL for tracking pixels. An explicit
    /// per-request URL takes precedence; with neither, pixels are omitted.
    pub tracking_base_url: Option<String>,
    /// Maximum due items fetched per sweep tick
    pub batch_size: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tracking_base_url: None,
            batch_size: 25,
        }
    }
}

/// Mail Orchestration Engine
pub struct MailEngine {
    messages: Arc<dyn MessageRepository>,
    recurring: Arc<dyn RecurringMailRepository>,
    credentials: Arc<dyn CredentialRepository>,
    vendor: Arc<dyn DeliveryVendor>,
    config: EngineConfig,
    // Per-instance sweep guards: each sweep kind is serialized against
    // itself, the two kinds may overlap each other.
    scheduled_sweep_active: AtomicBool,
    recurring_sweep_active: AtomicBool,
}

impl MailEngine {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        recurring: Arc<dyn RecurringMailRepository>,
        credentials: Arc<dyn CredentialRepository>,
        vendor: Arc<dyn DeliveryVendor>,
        config: EngineConfig,
    ) -> Self {
        Self {
            messages,
            recurring,
            credentials,
            vendor,
            config,
            scheduled_sweep_active: AtomicBool::new(false),
            recurring_sweep_active: AtomicBool::new(false),
        }
    }

    /// Compose a message and either send it now or persist it for a later
    /// sweep.
    ///
    /// The immediate path attempts delivery synchronously and returns the
    /// record in its terminal status; on failure the record is durably
    /// marked failed before the error reaches the caller. The deferred path
    /// persists a pending record and returns without touching the vendor.
    pub async fn compose_and_send(
        &self,
        user_id: UserId,
        draft: ComposeRequest,
        credentials: SendCredentials,
        tracking_base_url: Option<&str>,
    ) -> Result<OutboundMessage> {
        if draft.to.trim().is_empty()
            || draft.subject.trim().is_empty()
            || draft.content.trim().is_empty()
        {
            return Err(Error::Validation(
                "to, subject and content are required".to_string(),
            ));
        }
        if credentials.is_empty() {
            return Err(Error::AuthRequired);
        }

        let deferred = draft.scheduled_at.is_some_and(|at| at > Utc::now());
        let message = self
            .messages
            .create(CreateOutboundMessage {
                user_id,
                from_address: draft.from,
                to_address: draft.to,
                cc_address: draft.cc,
                bcc_address: draft.bcc,
                subject: draft.subject,
                html_body: draft.content,
                scheduled_at: draft.scheduled_at,
            })
            .await?;

        if deferred {
            debug!(message_id = %message.id, scheduled_at = ?message.scheduled_at, "message deferred");
            return Ok(message);
        }

        match self
            .attempt_delivery(&message, &credentials, tracking_base_url)
            .await
        {
            Ok(()) => {
                let updated = self
                    .messages
                    .update_status(message.id, MessageStatus::Sent)
                    .await?
                    .ok_or_else(|| {
                        Error::Internal(format!("Sent message {} disappeared", message.id))
                    })?;
                info!(message_id = %updated.id, "message sent");
                Ok(updated)
            }
            Err(e) => {
                if let Err(update_err) = self
                    .messages
                    .update_status(message.id, MessageStatus::Failed)
                    .await
                {
                    error!(message_id = %message.id, error = %update_err, "failed to mark message failed");
                }
                Err(e)
            }
        }
    }

    /// Sweep: dispatch pending messages whose scheduled time has passed.
    ///
    /// Guarded against overlapping invocations; an overlapping call returns
    /// without querying the store. One item's failure never aborts the
    /// batch.
    pub async fn process_due_messages(&self) {
        if self.scheduled_sweep_active.swap(true, Ordering::SeqCst) {
            debug!("scheduled sweep already running, skipping tick");
            return;
        }

        let result = self.sweep_due_messages().await;
        self.scheduled_sweep_active.store(false, Ordering::SeqCst);

        if let Err(e) = result {
            error!(error = %e, "scheduled mail sweep failed");
        }
    }

    async fn sweep_due_messages(&self) -> Result<()> {
        let due = self
            .messages
            .find_due_scheduled(Utc::now(), self.config.batch_size)
            .await?;
        if due.is_empty() {
            return Ok(());
        }

        debug!(count = due.len(), "dispatching due scheduled messages");
        for message in due {
            let status = match self.dispatch_scheduled(&message).await {
                Ok(()) => {
                    info!(message_id = %message.id, "scheduled message sent");
                    MessageStatus::Sent
                }
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "scheduled delivery failed");
                    MessageStatus::Failed
                }
            };

            if let Err(e) = self.messages.update_status(message.id, status).await {
                error!(message_id = %message.id, error = %e, "failed to update message status");
            }
        }

        Ok(())
    }

    async fn dispatch_scheduled(&self, message: &OutboundMessage) -> Result<()> {
        let credentials: SendCredentials = self
            .credentials
            .mail_credentials(message.user_id)
            .await?
            .ok_or(Error::AuthRequired)?
            .into();

        self.attempt_delivery(message, &credentials, None).await
    }

    /// Sweep: run active recurring definitions whose next run has passed.
    ///
    /// A campaign whose run fails outright (e.g. missing credential) is
    /// logged and skipped for this cycle only; its next run is not advanced,
    /// so it stays due and is retried on the next tick.
    pub async fn process_due_recurring(&self) {
        if self.recurring_sweep_active.swap(true, Ordering::SeqCst) {
            debug!("recurring sweep already running, skipping tick");
            return;
        }

        let result = self.sweep_due_recurring().await;
        self.recurring_sweep_active.store(false, Ordering::SeqCst);

        if let Err(e) = result {
            error!(error = %e, "recurring mail sweep failed");
        }
    }

    async fn sweep_due_recurring(&self) -> Result<()> {
        let due = self
            .recurring
            .find_due_active(Utc::now(), self.config.batch_size)
            .await?;
        if due.is_empty() {
            return Ok(());
        }

        debug!(count = due.len(), "running due recurring mails");
        for mail in due {
            if let Err(e) = self.run_campaign(&mail).await {
                warn!(recurring_id = %mail.id, error = %e, "recurring run failed, will retry next sweep");
            }
        }

        Ok(())
    }

    /// Execute one recurring run: one independent message per recipient,
    /// then record the run and advance the next-run instant regardless of
    /// individual outcomes.
    async fn run_campaign(&self, mail: &RecurringMail) -> Result<RecurringMail> {
        let credentials: SendCredentials = self
            .credentials
            .mail_credentials(mail.user_id)
            .await?
            .ok_or(Error::AuthRequired)?
            .into();

        // cc/bcc lists collapse to delimited strings at this boundary; the
        // message entity and vendor contract both expect strings.
        let cc = join_addresses(&mail.cc_vec());
        let bcc = join_addresses(&mail.bcc_vec());

        for recipient in mail.recipients_vec() {
            let message = match self
                .messages
                .create(CreateOutboundMessage {
                    user_id: mail.user_id,
                    from_address: mail.from_address.clone(),
                    to_address: recipient.clone(),
                    cc_address: cc.clone(),
                    bcc_address: bcc.clone(),
                    subject: mail.subject.clone(),
                    html_body: mail.html_body.clone(),
                    scheduled_at: None,
                })
                .await
            {
                Ok(message) => message,
                Err(e) => {
                    error!(recurring_id = %mail.id, recipient = %recipient, error = %e, "failed to persist recurring message");
                    continue;
                }
            };

            let status = match self.attempt_delivery(&message, &credentials, None).await {
                Ok(()) => MessageStatus::Sent,
                Err(e) => {
                    warn!(recurring_id = %mail.id, recipient = %recipient, error = %e, "recurring delivery failed");
                    MessageStatus::Failed
                }
            };

            if let Err(e) = self.messages.update_status(message.id, status).await {
                error!(message_id = %message.id, error = %e, "failed to update message status");
            }
        }

        let now = Utc::now();
        let next = recurrence::next_run_at(now, &mail.days_vec(), &mail.send_time, &mail.timezone);
        let updated = self
            .recurring
            .mark_ran(mail.id, now, next)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Recurring mail {}", mail.id)))?;

        info!(recurring_id = %updated.id, next_run_at = %updated.next_run_at, "recurring mail ran");
        Ok(updated)
    }

    /// Create a recurring definition with an initial next run computed from
    /// now.
    pub async fn create_recurring_mail(&self, input: CreateRecurringMail) -> Result<RecurringMail> {
        if input.recipients.is_empty() {
            return Err(Error::Validation(
                "At least one recipient is required".to_string(),
            ));
        }
        recurrence::validate_schedule(&input.days_of_week, &input.send_time, &input.timezone)?;

        let next = recurrence::next_run_at(
            Utc::now(),
            &input.days_of_week,
            &input.send_time,
            &input.timezone,
        );
        self.recurring.create(input, next).await
    }

    pub async fn list_recurring_mails(&self, user_id: UserId) -> Result<Vec<RecurringMail>> {
        self.recurring.list_by_user(user_id).await
    }

    pub async fn get_recurring_mail(
        &self,
        user_id: UserId,
        id: RecurringMailId,
    ) -> Result<RecurringMail> {
        self.recurring
            .get_for_user(id, user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Recurring mail {}", id)))
    }

    /// Apply a partial edit and recompute the next run from now using the
    /// merged schedule fields.
    pub async fn update_recurring_mail(
        &self,
        user_id: UserId,
        id: RecurringMailId,
        changes: UpdateRecurringMail,
    ) -> Result<RecurringMail> {
        let existing = self.get_recurring_mail(user_id, id).await?;

        if let Some(recipients) = &changes.recipients {
            if recipients.is_empty() {
                return Err(Error::Validation(
                    "At least one recipient is required".to_string(),
                ));
            }
        }

        let days = changes
            .days_of_week
            .clone()
            .unwrap_or_else(|| existing.days_vec());
        let send_time = changes
            .send_time
            .clone()
            .unwrap_or_else(|| existing.send_time.clone());
        let timezone = changes
            .timezone
            .clone()
            .unwrap_or_else(|| existing.timezone.clone());
        recurrence::validate_schedule(&days, &send_time, &timezone)?;

        let next = recurrence::next_run_at(Utc::now(), &days, &send_time, &timezone);
        self.recurring
            .update_for_user(id, user_id, changes, next)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Recurring mail {}", id)))
    }

    /// Flip the active flag. Reactivation recomputes the next run from now;
    /// deactivation freezes the stored one.
    pub async fn toggle_recurring_mail(
        &self,
        user_id: UserId,
        id: RecurringMailId,
        active: bool,
    ) -> Result<RecurringMail> {
        let existing = self.get_recurring_mail(user_id, id).await?;

        let next = if active {
            Some(recurrence::next_run_at(
                Utc::now(),
                &existing.days_vec(),
                &existing.send_time,
                &existing.timezone,
            ))
        } else {
            None
        };

        self.recurring
            .set_active(id, user_id, active, next)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Recurring mail {}", id)))
    }

    pub async fn delete_recurring_mail(&self, user_id: UserId, id: RecurringMailId) -> Result<()> {
        if self.recurring.delete_for_user(id, user_id).await? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("Recurring mail {}", id)))
        }
    }

    /// Run a recurring definition immediately, regardless of whether it is
    /// due, then recompute its next run.
    pub async fn run_recurring_now(
        &self,
        user_id: UserId,
        id: RecurringMailId,
    ) -> Result<RecurringMail> {
        let mail = self.get_recurring_mail(user_id, id).await?;
        self.run_campaign(&mail).await
    }

    /// Record an open. Best-effort: invoked from a public endpoint, so it
    /// must never surface an error.
    pub async fn track_open(&self, id: MessageId) {
        if let Err(e) = self.messages.mark_opened(id).await {
            debug!(message_id = %id, error = %e, "open tracking update failed");
        }
    }

    /// Record a detected reply. Same best-effort contract as `track_open`.
    pub async fn track_reply(&self, id: MessageId) {
        if let Err(e) = self.messages.mark_replied(id).await {
            debug!(message_id = %id, error = %e, "reply tracking update failed");
        }
    }

    /// Inject the tracking pixel and hand the message to the vendor.
    /// `Ok(false)` from the vendor is a rejection and maps to an error so
    /// every failure mode lands in the same path.
    async fn attempt_delivery(
        &self,
        message: &OutboundMessage,
        credentials: &SendCredentials,
        tracking_base_url: Option<&str>,
    ) -> Result<()> {
        let base = tracking_base_url.or(self.config.tracking_base_url.as_deref());
        let html_body = tracking::inject_pixel(&message.html_body, message.id, base);

        let email = OutboundEmail {
            from: message.from_address.clone(),
            to: message.to_address.clone(),
            cc: message.cc_address.clone(),
            bcc: message.bcc_address.clone(),
            subject: message.subject.clone(),
            html_body,
        };

        match self.vendor.send(&email, credentials).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Delivery(
                "Delivery vendor rejected the message".to_string(),
            )),
            Err(e) => Err(e),
        }
    }
}

fn join_addresses(addresses: &[String]) -> Option<String> {
    if addresses.is_empty() {
        None
    } else {
        Some(addresses.join(", "))
    }
}
