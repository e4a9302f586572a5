//! Outbound mail.
//!
//! The [`Mailer`] trait is the seam the OTP verifier sends through. The SMTP
//! implementation is configured from the environment; without SMTP settings
//! the server falls back to [`LogMailer`], which only records the message in
//! the log.

use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::env_parse;

const DEFAULT_SMTP_PORT: u16 = 465;
const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address {address:?}: {reason}")]
    Address { address: String, reason: String },
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("mail delivery failed: {0}")]
    Delivery(String),
    #[error("smtp configuration error: {0}")]
    Config(String),
}

/// A file attached to an outgoing message.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Sends plain-text mail. Enables mocking in tests.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    /// Send a plain-text message.
    ///
    /// # Errors
    ///
    /// Returns a [`MailError`] if the address is malformed or delivery fails.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;

    /// Send a plain-text message with one attachment.
    ///
    /// # Errors
    ///
    /// Returns a [`MailError`] if the address or MIME type is malformed or
    /// delivery fails.
    async fn send_with_attachment(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachment: &Attachment,
    ) -> Result<(), MailError>;
}

// =============================================================================
// SMTP
// =============================================================================

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpTls {
    /// TLS from the first byte (SMTPS, usually port 465).
    Implicit,
    /// Plain connection upgraded with STARTTLS (usually port 587).
    StartTls,
    /// No encryption. Local relays only.
    None,
}

impl SmtpTls {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "implicit" | "ssl" | "smtps" => Some(Self::Implicit),
            "starttls" | "tls" => Some(Self::StartTls),
            "none" | "off" => Some(Self::None),
            _ => None,
        }
    }
}

/// SMTP settings loaded from environment.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub tls: SmtpTls,
}

impl SmtpConfig {
    /// Load from `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD` (required) and
    /// `SMTP_PORT`, `SMTP_FROM`, `SMTP_TLS` (optional).
    /// Returns `None` if any required variable is missing.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;
        let username = std::env::var("SMTP_USERNAME").ok()?;
        let password = std::env::var("SMTP_PASSWORD").ok()?;
        let from = std::env::var("SMTP_FROM").unwrap_or_else(|_| username.clone());
        let tls = std::env::var("SMTP_TLS")
            .ok()
            .and_then(|raw| SmtpTls::parse(&raw))
            .unwrap_or(SmtpTls::Implicit);
        Some(Self { host, port: env_parse("SMTP_PORT", DEFAULT_SMTP_PORT), username, password, from, tls })
    }
}

/// Mailer backed by an async SMTP connection pool.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// # Errors
    ///
    /// Returns [`MailError::Config`] if the relay cannot be set up and
    /// [`MailError::Address`] if `from` is not a mailbox.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let builder = match config.tls {
            SmtpTls::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Config(e.to_string()))?,
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::Config(e.to_string()))?,
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };
        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self { transport, from: parse_mailbox(&config.from)? })
    }

    async fn deliver(&self, message: Message) -> Result<(), MailError> {
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| MailError::Address { address: address.to_owned(), reason: e.to_string() })
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(to)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_owned())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.deliver(message).await?;
        tracing::info!(%to, %subject, "mail sent");
        Ok(())
    }

    async fn send_with_attachment(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachment: &Attachment,
    ) -> Result<(), MailError> {
        let content_type =
            ContentType::parse(&attachment.mime_type).map_err(|e| MailError::Build(e.to_string()))?;
        let file_part = MailAttachment::new(attachment.filename.clone()).body(attachment.bytes.clone(), content_type);

        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(to)?)
            .subject(subject)
            .multipart(MultiPart::mixed().singlepart(SinglePart::plain(body.to_owned())).singlepart(file_part))
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.deliver(message).await?;
        tracing::info!(%to, %subject, filename = %attachment.filename, "mail with attachment sent");
        Ok(())
    }
}

// =============================================================================
// LOG FALLBACK
// =============================================================================

/// Development mailer: writes messages to the log instead of sending them.
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        parse_mailbox(to)?;
        tracing::warn!(%to, %subject, %body, "smtp not configured; mail logged instead of sent");
        Ok(())
    }

    async fn send_with_attachment(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachment: &Attachment,
    ) -> Result<(), MailError> {
        parse_mailbox(to)?;
        tracing::warn!(
            %to,
            %subject,
            %body,
            filename = %attachment.filename,
            bytes = attachment.bytes.len(),
            "smtp not configured; mail logged instead of sent"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "mail_test.rs"]
mod tests;
