//! Delivery vendor - sends composed messages through the user's mailbox

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use mailpilot_common::config::{GoogleConfig, SmtpConfig};
use mailpilot_common::{Error, Result};
use mailpilot_storage::models::MailCredentials;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Credentials available for a single send. At least one of the tokens must
/// be present for a delivery attempt to be possible.
#[derive(Debug, Clone, Default)]
pub struct SendCredentials {
    /// Short-lived access token, used as-is when present
    pub access_token: Option<String>,
    /// Long-lived refresh token, exchanged on demand
    pub refresh_token: Option<String>,
}

impl SendCredentials {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl From<MailCredentials> for SendCredentials {
    fn from(credentials: MailCredentials) -> Self {
        Self {
            access_token: None,
            refresh_token: Some(credentials.refresh_token),
        }
    }
}

/// A fully composed outbound email. Recipient fields hold a single address
/// or a `,`/`;` delimited list.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: String,
    pub html_body: String,
}

/// Sends a single composed message via the user's mail provider
#[async_trait]
pub trait DeliveryVendor: Send + Sync {
    /// Attempt delivery of one message. `Ok(true)` means the provider
    /// accepted it for delivery, `Ok(false)` that it was rejected.
    async fn send(&self, email: &OutboundEmail, credentials: &SendCredentials) -> Result<bool>;
}

/// Gmail delivery vendor: XOAUTH2 over the STARTTLS submission port
pub struct GmailSmtpVendor {
    smtp: SmtpConfig,
    google: GoogleConfig,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl GmailSmtpVendor {
    pub fn new(smtp: SmtpConfig, google: GoogleConfig) -> Self {
        Self {
            smtp,
            google,
            http: reqwest::Client::new(),
        }
    }

    /// Use the caller's access token when present, otherwise exchange the
    /// refresh token at the configured token endpoint.
    async fn access_token(&self, credentials: &SendCredentials) -> Result<String> {
        if let Some(token) = &credentials.access_token {
            return Ok(token.clone());
        }

        let refresh = credentials
            .refresh_token
            .as_deref()
            .ok_or(Error::AuthRequired)?;

        let response = self
            .http
            .post(&self.google.token_url)
            .form(&[
                ("client_id", self.google.client_id.as_str()),
                ("client_secret", self.google.client_secret.as_str()),
                ("refresh_token", refresh),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Delivery(format!(
                "Token refresh rejected: {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Delivery(format!("Malformed token response: {}", e)))?;

        Ok(token.access_token)
    }

    fn build_message(email: &OutboundEmail, from: Mailbox) -> Result<Message> {
        let mut builder = Message::builder().from(from).subject(&email.subject);

        for address in split_addresses(&email.to) {
            builder = builder.to(parse_mailbox(&address)?);
        }
        if let Some(cc) = &email.cc {
            for address in split_addresses(cc) {
                builder = builder.cc(parse_mailbox(&address)?);
            }
        }
        if let Some(bcc) = &email.bcc {
            for address in split_addresses(bcc) {
                builder = builder.bcc(parse_mailbox(&address)?);
            }
        }

        builder
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())
            .map_err(|e| Error::Delivery(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl DeliveryVendor for GmailSmtpVendor {
    async fn send(&self, email: &OutboundEmail, credentials: &SendCredentials) -> Result<bool> {
        let token = self.access_token(credentials).await?;
        let from = parse_mailbox(&email.from)?;
        let auth_user = from.email.to_string();
        let message = Self::build_message(email, from)?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp.relay_host)
            .map_err(|e| Error::Delivery(format!("Failed to create SMTP transport: {}", e)))?
            .port(self.smtp.relay_port)
            .credentials(Credentials::new(auth_user, token))
            .authentication(vec![Mechanism::Xoauth2])
            .timeout(Some(Duration::from_secs(self.smtp.timeout_secs)))
            .build();

        match mailer.send(message).await {
            Ok(response) => {
                debug!(?response, "SMTP relay response");
                Ok(response.is_positive())
            }
            Err(e) => Err(Error::Delivery(e.to_string())),
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| Error::Validation(format!("Invalid address {}: {}", address, e)))
}

/// Split a delimited recipient string into individual addresses
pub fn split_addresses(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
