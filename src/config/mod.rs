pub mod settings;

pub use settings::{BotConfig, MailerConfig, SmtpSettings};
