//! Delivery of email verification codes.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use tracing::info;

use crate::config::{MailerConfig, SmtpSettings};
use crate::error::{BotError, Result};

const BOT_NAME: &str = "VerifyBot";
const PRINT_FROM_ADDR: &str = "test@example.com";

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send `code` to `address`; `name` is the Discord user who asked for it
    async fn send(&self, address: &str, code: &str, name: &str) -> Result<()>;
}

pub type SharedMailer = Arc<dyn Mailer>;

pub fn build_mailer(config: &MailerConfig) -> SharedMailer {
    match config {
        MailerConfig::Print => Arc::new(PrintMailer),
        MailerConfig::Smtp(settings) => Arc::new(SmtpMailer::new(settings.clone())),
    }
}

/// A composed verification email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub fn compose(address: &str, from_addr: &str, code: &str, name: &str) -> OutgoingMail {
    OutgoingMail {
        from: from_addr.to_string(),
        to: address.to_string(),
        subject: format!("Email Verification Code from {}", BOT_NAME),
        body: format!(
            "Your verification code is {}\n\nThis email was triggered by {}.",
            code, name
        ),
    }
}

/// Random six digit code
pub fn generate_code() -> String {
    format!("{:06}", uuid::Uuid::new_v4().as_u128() % 1_000_000)
}

/// Sends mail over SMTP with STARTTLS and login
pub struct SmtpMailer {
    settings: SmtpSettings,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    fn to_message(mail: &OutgoingMail) -> Result<Message> {
        let mail_err = |e: &dyn std::fmt::Display| BotError::Mail {
            message: e.to_string(),
        };
        let from: Mailbox = mail.from.parse().map_err(|e| mail_err(&e))?;
        let to: Mailbox = mail.to.parse().map_err(|e| mail_err(&e))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(mail.subject.clone())
            .body(mail.body.clone())
            .map_err(|e| mail_err(&e))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, address: &str, code: &str, name: &str) -> Result<()> {
        let mail = compose(address, &self.settings.from_addr, code, name);
        let message = Self::to_message(&mail)?;

        // TODO: make implicit TLS (port 465) selectable alongside STARTTLS
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.host)
            .map_err(|e| BotError::Mail {
                message: e.to_string(),
            })?
            .port(self.settings.port)
            .credentials(Credentials::new(
                self.settings.username.clone(),
                self.settings.password.clone(),
            ))
            .build();

        transport.send(message).await.map_err(|e| BotError::Mail {
            message: e.to_string(),
        })?;

        info!("Sent verification code to {} for {}", address, name);
        Ok(())
    }
}

/// Logs the mail instead of sending it
pub struct PrintMailer;

#[async_trait]
impl Mailer for PrintMailer {
    async fn send(&self, address: &str, code: &str, name: &str) -> Result<()> {
        let mail = compose(address, PRINT_FROM_ADDR, code, name);
        info!(
            "Email to send\nFrom: {}\nTo: {}\nSubject: {}\n\n{}",
            mail.from, mail.to, mail.subject, mail.body
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose() {
        let mail = compose("alice@example.com", "bot@example.com", "123456", "alice#0001");

        assert_eq!(mail.to, "alice@example.com");
        assert_eq!(mail.subject, "Email Verification Code from VerifyBot");
        assert_eq!(
            mail.body,
            "Your verification code is 123456\n\nThis email was triggered by alice#0001."
        );
    }

    #[test]
    fn test_generate_code_is_six_digits() {
        for _ in 0..20 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_invalid_address_is_mail_error() {
        let mail = compose("not an address", "bot@example.com", "1", "x");
        let err = SmtpMailer::to_message(&mail).unwrap_err();
        assert!(matches!(err, BotError::Mail { .. }));
    }

    #[tokio::test]
    async fn test_print_mailer_always_succeeds() {
        let mailer = build_mailer(&MailerConfig::Print);
        mailer.send("alice@example.com", "000042", "alice#0001").await.unwrap();
    }
}
