use std::env;
use std::path::PathBuf;

use thiserror::Error;

/// Subject used when EMAIL_SUBJECT is not set.
pub const DEFAULT_SUBJECT: &str = "Referee Assignments";

/// Body used when EMAIL_BODY is not set.
pub const DEFAULT_BODY: &str = "Attached is the referee assignments image.";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing SMTP credentials.")]
    MissingCredentials,

    #[error("Invalid SMTP_PORT value: {0}")]
    InvalidPort(String),

    #[error("No recipients provided.")]
    NoRecipients,
}

/// How the connection to the relay is encrypted.
///
/// Port 465 conventionally means TLS from the first byte (implicit TLS);
/// everything else connects in plaintext and upgrades with STARTTLS before
/// authenticating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    StartTls,
    Ssl,
}

impl SmtpSecurity {
    pub fn for_port(port: u16) -> Self {
        if port == 465 {
            SmtpSecurity::Ssl
        } else {
            SmtpSecurity::StartTls
        }
    }
}

/// Everything the tool needs, read once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable lookup. Credentials are
    /// validated before recipients; the attachment path is only recorded
    /// here, existence is checked when the message is constructed.
    fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let smtp_host = get("SMTP_HOST").unwrap_or_default();
        let port_raw = get("SMTP_PORT").unwrap_or_else(|| "0".to_string());
        let smtp_port: u16 = port_raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port_raw.clone()))?;
        let smtp_user = get("SMTP_USER").unwrap_or_default();
        let smtp_pass = get("SMTP_PASS").unwrap_or_default();

        if smtp_host.is_empty() || smtp_port == 0 || smtp_user.is_empty() || smtp_pass.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        let recipients = parse_recipients(&get("RECIPIENTS").unwrap_or_default());
        if recipients.is_empty() {
            return Err(ConfigError::NoRecipients);
        }

        let subject = get("EMAIL_SUBJECT").unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
        let body = get("EMAIL_BODY").unwrap_or_else(|| DEFAULT_BODY.to_string());

        // An empty ATTACHMENT is the same as no attachment at all.
        let attachment = get("ATTACHMENT")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            smtp_host,
            smtp_port,
            smtp_user,
            smtp_pass,
            recipients,
            subject,
            body,
            attachment,
        })
    }

    pub fn security(&self) -> SmtpSecurity {
        SmtpSecurity::for_port(self.smtp_port)
    }
}

/// Splits a comma-separated recipient list, trimming whitespace and dropping
/// blank entries. Order is preserved and duplicates are kept.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect()
}
