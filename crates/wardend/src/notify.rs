//! Email alerts over an SMTP relay (STARTTLS).

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::path::Path;
use thiserror::Error;
use warden_core::ports::Notifier;
use warden_core::SmtpConfig;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("smtp: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("invalid content type: {0}")]
    ContentType(#[from] lettre::message::header::ContentTypeErr),
    #[error("failed to read attachment {path}: {source}")]
    Attachment {
        path: String,
        source: std::io::Error,
    },
}

struct Relay {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

/// Sends alerts by email. Without SMTP credentials every `notify` is a
/// no-op that returns `false`.
pub struct SmtpNotifier {
    relay: Option<Relay>,
}

impl SmtpNotifier {
    pub fn from_config(config: Option<&SmtpConfig>) -> Result<Self, NotifyError> {
        let Some(config) = config else {
            tracing::info!(
                "email notifications disabled; set WARDEN_SMTP_USER, WARDEN_SMTP_PASSWORD \
                 and WARDEN_ALERT_RECIPIENT to enable"
            );
            return Ok(Self::disabled());
        };

        let transport = SmtpTransport::starttls_relay(&config.server)?
            .port(config.port)
            .credentials(Credentials::new(config.user.clone(), config.password.clone()))
            .build();

        tracing::info!(
            server = %config.server,
            port = config.port,
            recipient = %config.recipient,
            "email notifications enabled"
        );
        Ok(Self {
            relay: Some(Relay {
                transport,
                from: config.user.parse()?,
                to: config.recipient.parse()?,
            }),
        })
    }

    pub fn disabled() -> Self {
        Self { relay: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.relay.is_some()
    }

    fn send(relay: &Relay, subject: &str, body: &str, attachment: Option<&Path>) -> Result<(), NotifyError> {
        let message = build_message(relay.from.clone(), relay.to.clone(), subject, body, attachment)?;
        relay.transport.send(&message)?;
        Ok(())
    }
}

impl Notifier for SmtpNotifier {
    fn notify(&self, subject: &str, body: &str, attachment: Option<&Path>) -> bool {
        let Some(relay) = &self.relay else {
            tracing::debug!(subject, "email disabled; notification skipped");
            return false;
        };

        match Self::send(relay, subject, body, attachment) {
            Ok(()) => {
                tracing::info!(subject, "notification sent");
                true
            }
            Err(err) => {
                tracing::warn!(subject, error = %err, "failed to send notification");
                false
            }
        }
    }
}

/// Plain-text message, with the file attached as octet-stream when given.
fn build_message(
    from: Mailbox,
    to: Mailbox,
    subject: &str,
    body: &str,
    attachment: Option<&Path>,
) -> Result<Message, NotifyError> {
    let builder = Message::builder().from(from).to(to).subject(subject);

    let Some(path) = attachment else {
        return Ok(builder.singlepart(SinglePart::plain(body.to_string()))?);
    };

    let bytes = std::fs::read(path).map_err(|source| NotifyError::Attachment {
        path: path.display().to_string(),
        source,
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());

    let content_type = ContentType::parse("application/octet-stream")?;
    let parts = MultiPart::mixed()
        .singlepart(SinglePart::plain(body.to_string()))
        .singlepart(Attachment::new(filename).body(bytes, content_type));

    Ok(builder.multipart(parts)?)
}
