use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BotError, Result};

const DEFAULT_THUMBNAIL_URL: &str =
    "https://uwaterloo.ca/library/sites/ca.library/files/uploads/images/img_0236_0.jpg";

/// Process-wide bot settings, loaded once at startup
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Discord bot token
    pub token: String,

    /// Prefix for text commands (e.g. `!verify`)
    pub prefix: String,

    /// Time between maintenance ticks
    pub check_interval: Duration,

    /// Maximum age of a session before it is garbage collected
    pub expiry: Duration,

    /// Base URL of the verification web page
    pub url: String,

    /// Exact name of the role granted after verification
    pub role_name: String,

    /// `verify` is only accepted in channels whose name contains this (case-insensitive)
    pub channel_marker: String,

    /// Path of the JSON session store
    pub store_path: PathBuf,

    /// Thumbnail shown on the verification card
    pub thumbnail_url: String,

    pub mailer: MailerConfig,
}

/// Which mail transport delivers verification codes
#[derive(Debug, Clone, PartialEq)]
pub enum MailerConfig {
    /// Log the mail instead of sending it
    Print,
    Smtp(SmtpSettings),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_addr: String,
}

impl BotConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup (environment, test map, ...)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| BotError::ConfigMissing {
                    key: key.to_string(),
                })
        };
        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let check_interval = parse_seconds("CHECK_INTERVAL_S", &optional("CHECK_INTERVAL_S", "60"))?;
        let expiry = parse_seconds("EXPIRY_S", &optional("EXPIRY_S", "3600"))?;

        let mailer = match optional("MAILER", "print").to_lowercase().as_str() {
            "print" => MailerConfig::Print,
            "smtp" => MailerConfig::Smtp(SmtpSettings {
                host: required("SMTP_HOST")?,
                port: optional("SMTP_PORT", "587").parse().map_err(|_| {
                    BotError::ConfigValidation {
                        message: "SMTP_PORT must be a port number".to_string(),
                    }
                })?,
                username: required("SMTP_USERNAME")?,
                password: required("SMTP_PASSWORD")?,
                from_addr: required("SMTP_FROM")?,
            }),
            other => {
                return Err(BotError::ConfigValidation {
                    message: format!("MAILER must be 'smtp' or 'print', got '{}'", other),
                })
            }
        };

        Ok(Self {
            token: required("DISCORD_TOKEN")?,
            prefix: optional("COMMAND_PREFIX", "!"),
            check_interval,
            expiry,
            url: required("VERIFY_URL")?.trim_end_matches('/').to_string(),
            role_name: optional("ROLE_NAME", "Verified"),
            channel_marker: optional("CHANNEL_MARKER", "verification").to_lowercase(),
            store_path: PathBuf::from(optional("SESSION_STORE_PATH", "state/sessions.json")),
            thumbnail_url: optional("THUMBNAIL_URL", DEFAULT_THUMBNAIL_URL),
            mailer,
        })
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration> {
    let secs: u64 = value.trim().parse().map_err(|_| BotError::ConfigValidation {
        message: format!("{} must be a whole number of seconds, got '{}'", key, value),
    })?;
    if secs == 0 {
        return Err(BotError::ConfigValidation {
            message: format!("{} must be greater than zero", key),
        });
    }
    Ok(Duration::from_secs(secs))
}
