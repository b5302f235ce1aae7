pub mod render;

pub use lettre::Message;

use hma_core::RunClock;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_SMTP_PORT: u16 = 587;
const IMAGE_CONTENT_TYPE: &str = "image/png";
const FALLBACK_IMAGE_NAME: &str = "heatmap.png";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid address {address:?}: {reason}")]
    Address { address: String, reason: String },
    #[error("failed to read image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to compose message: {0}")]
    Compose(String),
    #[error("smtp delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: DEFAULT_SMTP_PORT,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl SmtpSettings {
    pub fn credentials(&self) -> Option<Credentials> {
        if self.username.is_empty() || self.password.is_empty() {
            return None;
        }
        Some(Credentials::new(
            self.username.clone(),
            self.password.clone(),
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailSettings {
    pub enabled: bool,
    pub sender: String,
    pub recipients: Vec<String>,
    pub smtp: SmtpSettings,
}

/// Splits a comma-separated recipient list, dropping blank entries.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|err| NotifyError::Address {
            address: address.to_string(),
            reason: err.to_string(),
        })
}

/// Outbound mail delivery.
pub trait MailRelay {
    fn deliver(&self, message: &Message) -> Result<(), NotifyError>;
}

/// STARTTLS relay that opens a fresh connection for every message.
pub struct SmtpRelay {
    settings: SmtpSettings,
}

impl SmtpRelay {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }
}

impl MailRelay for SmtpRelay {
    fn deliver(&self, message: &Message) -> Result<(), NotifyError> {
        let mut builder = SmtpTransport::starttls_relay(&self.settings.server)
            .map_err(|err| NotifyError::Delivery(err.to_string()))?
            .port(self.settings.port);
        if let Some(credentials) = self.settings.credentials() {
            builder = builder.credentials(credentials);
        }
        let transport = builder.build();

        debug!(
            event = "smtp_connect",
            server = %self.settings.server,
            port = self.settings.port
        );
        transport
            .send(message)
            .map_err(|err| NotifyError::Delivery(err.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Disabled,
    NoRecipients,
    Sent { recipients: usize },
}

pub struct Notifier<R> {
    settings: EmailSettings,
    relay: R,
}

impl<R: MailRelay> Notifier<R> {
    pub fn new(settings: EmailSettings, relay: R) -> Self {
        Self { settings, relay }
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn notify(
        &self,
        narrative: &str,
        clock: &RunClock,
        image_path: &Path,
    ) -> Result<NotifyOutcome, NotifyError> {
        if !self.settings.enabled {
            return Ok(NotifyOutcome::Disabled);
        }
        if self.settings.recipients.is_empty() {
            return Ok(NotifyOutcome::NoRecipients);
        }

        let message = compose_message(&self.settings, narrative, clock, image_path)?;
        self.relay.deliver(&message)?;
        info!(
            event = "email_sent",
            recipients = %self.settings.recipients.join(", ")
        );
        Ok(NotifyOutcome::Sent {
            recipients: self.settings.recipients.len(),
        })
    }
}

/// Builds the report: a plaintext/HTML alternative plus, when the image is
/// on disk, an inline copy with a content id and a regular attachment.
pub fn compose_message(
    settings: &EmailSettings,
    narrative: &str,
    clock: &RunClock,
    image_path: &Path,
) -> Result<Message, NotifyError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&settings.sender)?)
        .subject(render::subject(clock));
    for recipient in &settings.recipients {
        builder = builder.to(parse_mailbox(recipient)?);
    }

    let mut body = MultiPart::mixed().multipart(MultiPart::alternative_plain_html(
        render::plain_letter(narrative, clock),
        render::html_letter(narrative, clock),
    ));

    if image_path.exists() {
        let image = fs::read(image_path).map_err(|source| NotifyError::Image {
            path: image_path.to_path_buf(),
            source,
        })?;
        let file_name = image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| FALLBACK_IMAGE_NAME.to_string());
        let content_type = ContentType::parse(IMAGE_CONTENT_TYPE)
            .map_err(|err| NotifyError::Compose(err.to_string()))?;
        // Not referenced from the HTML body.
        let content_id = format!("heatmap_{}@analyzer", clock.compact_stamp());

        body = body
            .singlepart(
                Attachment::new_inline(content_id).body(image.clone(), content_type.clone()),
            )
            .singlepart(Attachment::new(file_name).body(image, content_type));
    }

    builder
        .multipart(body)
        .map_err(|err| NotifyError::Compose(err.to_string()))
}
