pub mod config;
pub mod email;

// Re-export commonly used types
pub use config::{Config, ConfigError, SmtpSecurity};
pub use email::{EmailError, OutgoingMessage};
