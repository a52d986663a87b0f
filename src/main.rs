use anyhow::{Context, Result};
use clap::Parser;
use log::debug;

use referee_mailer::config::Config;
use referee_mailer::email::{self, OutgoingMessage};

/// Send a single email with an optional image attachment over SMTP.
///
/// All mail settings come from environment variables: SMTP_HOST, SMTP_PORT,
/// SMTP_USER, SMTP_PASS, RECIPIENTS (comma-separated), EMAIL_SUBJECT,
/// EMAIL_BODY and ATTACHMENT.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Load environment variables from this file before reading the config
    #[clap(short, long)]
    env_file: Option<String>,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    env_logger::Builder::new()
        .filter_level(if args.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    // A named env file must exist; the implicit .env is optional.
    match &args.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let config = Config::from_env()?;
    debug!(
        "Loaded config: {}:{} as {}, {} recipient(s)",
        config.smtp_host,
        config.smtp_port,
        config.smtp_user,
        config.recipients.len()
    );

    let outgoing = OutgoingMessage::from_config(&config)?;
    let message = email::build_message(&outgoing)?;
    email::send(&config, &message)?;

    Ok(())
}
