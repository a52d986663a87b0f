use std::fs;
use std::path::Path;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use log::{debug, info};
use thiserror::Error;

use crate::config::{Config, SmtpSecurity};

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(String),

    #[error("Failed to read attachment {path}: {source}")]
    AttachmentRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    MessageError(String),

    #[error("SMTP error: {0}")]
    SmtpError(String),
}

#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub data: Vec<u8>,
    pub content_type: String,
}

/// The one message this tool sends, assembled from the environment config
/// and consumed by a single send.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub subject: String,
    pub body: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub attachment: Option<EmailAttachment>,
}

impl OutgoingMessage {
    /// Reads the attachment (if any) into memory up front, so a missing file
    /// fails the run before any network connection is opened.
    pub fn from_config(config: &Config) -> Result<Self, EmailError> {
        let attachment = match &config.attachment {
            Some(path) => Some(load_attachment(path)?),
            None => None,
        };

        Ok(Self {
            subject: config.subject.clone(),
            body: config.body.clone(),
            sender: config.smtp_user.clone(),
            recipients: config.recipients.clone(),
            attachment,
        })
    }
}

/// Attachments are always tagged image/png with the file's base name; the
/// tool only ever ships the assignments screenshot.
fn load_attachment(path: &Path) -> Result<EmailAttachment, EmailError> {
    if !path.exists() {
        return Err(EmailError::AttachmentNotFound(path.display().to_string()));
    }

    let data = fs::read(path).map_err(|e| EmailError::AttachmentRead {
        path: path.display().to_string(),
        source: e,
    })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment.png".to_string());

    Ok(EmailAttachment {
        filename,
        data,
        content_type: "image/png".to_string(),
    })
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address.parse().map_err(|e: lettre::address::AddressError| {
        EmailError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Builds the wire message: From is the SMTP username, one To mailbox per
/// recipient, plain-text body, and a multipart/mixed layout only when there
/// is an attachment.
pub fn build_message(outgoing: &OutgoingMessage) -> Result<Message, EmailError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&outgoing.sender)?)
        .subject(outgoing.subject.clone());

    for recipient in &outgoing.recipients {
        builder = builder.to(parse_mailbox(recipient)?);
    }

    let message = match &outgoing.attachment {
        Some(attachment) => {
            let content_type = attachment
                .content_type
                .parse::<ContentType>()
                .map_err(|e| EmailError::MessageError(e.to_string()))?;
            let attachment_part =
                Attachment::new(attachment.filename.clone()).body(attachment.data.clone(), content_type);

            builder.multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(outgoing.body.clone()))
                    .singlepart(attachment_part),
            )
        }
        None => builder.singlepart(SinglePart::plain(outgoing.body.clone())),
    }
    .map_err(|e| EmailError::MessageError(e.to_string()))?;

    Ok(message)
}

/// Connects to the relay, authenticates and delivers the message in a single
/// transaction. Port 465 gets TLS from the first byte; every other port
/// connects plaintext and upgrades with STARTTLS before authenticating. The
/// transport is dropped on every exit path, so the connection is closed
/// whether or not delivery succeeded.
pub fn send(config: &Config, message: &Message) -> Result<(), EmailError> {
    let creds = Credentials::new(config.smtp_user.clone(), config.smtp_pass.clone());

    let mailer = match config.security() {
        SmtpSecurity::Ssl => {
            let tls_params = TlsParameters::new(config.smtp_host.clone())
                .map_err(|e| EmailError::SmtpError(e.to_string()))?;

            SmtpTransport::relay(&config.smtp_host)
                .map_err(|e| EmailError::SmtpError(e.to_string()))?
                .credentials(creds)
                .port(config.smtp_port)
                .tls(Tls::Wrapper(tls_params))
                .build()
        }
        SmtpSecurity::StartTls => {
            let tls_params = TlsParameters::new(config.smtp_host.clone())
                .map_err(|e| EmailError::SmtpError(e.to_string()))?;

            SmtpTransport::relay(&config.smtp_host)
                .map_err(|e| EmailError::SmtpError(e.to_string()))?
                .credentials(creds)
                .port(config.smtp_port)
                .tls(Tls::Required(tls_params))
                .build()
        }
    };

    debug!(
        "Connecting to {}:{} ({:?})",
        config.smtp_host,
        config.smtp_port,
        config.security()
    );

    mailer
        .send(message)
        .map_err(|e| EmailError::SmtpError(e.to_string()))?;

    info!("Message delivered to {} recipient(s)", config.recipients.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::{DEFAULT_BODY, DEFAULT_SUBJECT};

    fn sample_config(attachment: Option<PathBuf>) -> Config {
        Config {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_user: "ref@example.com".to_string(),
            smtp_pass: "hunter2".to_string(),
            recipients: vec!["a@x.com".to_string()],
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_BODY.to_string(),
            attachment,
        }
    }

    fn formatted(message: &Message) -> String {
        String::from_utf8(message.formatted()).unwrap()
    }

    #[test]
    fn missing_attachment_fails_before_send() {
        let config = sample_config(Some(PathBuf::from("/definitely/not/here.png")));
        let err = OutgoingMessage::from_config(&config).unwrap_err();
        assert!(
            matches!(err, EmailError::AttachmentNotFound(ref p) if p.contains("not/here.png")),
            "got {:?}",
            err
        );
    }

    #[test]
    fn message_without_attachment_is_plain() {
        let config = sample_config(None);
        let outgoing = OutgoingMessage::from_config(&config).unwrap();
        assert!(outgoing.attachment.is_none());

        let rendered = formatted(&build_message(&outgoing).unwrap());
        assert!(rendered.contains("Subject: Referee Assignments"));
        assert!(rendered.contains("From: ref@example.com"));
        assert!(rendered.contains("a@x.com"));
        assert!(rendered.contains("Attached is the referee assignments image."));
        assert!(!rendered.contains("multipart/mixed"));
        assert!(!rendered.contains("Content-Disposition: attachment"));
    }

    #[test]
    fn message_with_attachment_is_mixed_multipart() {
        let path = std::env::temp_dir().join(format!(
            "referee-mailer-test-{}-assignments.png",
            std::process::id()
        ));
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nfake").unwrap();

        let config = sample_config(Some(path.clone()));
        let outgoing = OutgoingMessage::from_config(&config).unwrap();
        let attachment = outgoing.attachment.as_ref().unwrap();
        assert_eq!(attachment.content_type, "image/png");
        assert!(attachment.filename.ends_with("assignments.png"));

        let rendered = formatted(&build_message(&outgoing).unwrap());
        assert!(rendered.contains("multipart/mixed"));
        assert!(rendered.contains("image/png"));
        assert!(rendered.contains(&format!("filename=\"{}\"", attachment.filename)));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn sender_is_the_smtp_username() {
        let config = sample_config(None);
        let outgoing = OutgoingMessage::from_config(&config).unwrap();
        assert_eq!(outgoing.sender, "ref@example.com");
        assert_eq!(outgoing.recipients.len(), 1);
    }

    #[test]
    fn all_recipients_land_in_the_message() {
        let mut config = sample_config(None);
        config.recipients = vec!["a@x.com".to_string(), "b@y.com".to_string()];
        let outgoing = OutgoingMessage::from_config(&config).unwrap();

        let rendered = formatted(&build_message(&outgoing).unwrap());
        assert!(rendered.contains("a@x.com"));
        assert!(rendered.contains("b@y.com"));
    }

    #[test]
    fn invalid_recipient_address_is_rejected() {
        let mut config = sample_config(None);
        config.recipients = vec!["not an address".to_string()];
        let outgoing = OutgoingMessage::from_config(&config).unwrap();
        let err = build_message(&outgoing).unwrap_err();
        assert!(matches!(err, EmailError::InvalidAddress { .. }));
    }
}
