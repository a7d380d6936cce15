use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    // Storage errors
    #[error("Failed to read session store '{path}': {source}")]
    StorageRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write session store '{path}': {source}")]
    StorageWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Session store '{path}' is corrupt: {source}")]
    StorageCorrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // Configuration errors
    #[error("Missing required setting: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid config: {message}")]
    ConfigValidation { message: String },

    // Lookup errors
    #[error("Member {user_id} not found in guild {guild_id}: {message}")]
    MemberNotFound {
        guild_id: String,
        user_id: String,
        message: String,
    },

    // Delivery errors
    #[error("Failed to deliver direct message: {message}")]
    Delivery { message: String },

    #[error("Failed to send email: {message}")]
    Mail { message: String },

    // Discord errors
    #[error("Discord API error: {message}")]
    Discord { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BotError {
    /// Storage failures mean the store itself is unusable, not just one record.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            BotError::StorageRead { .. } | BotError::StorageWrite { .. } | BotError::StorageCorrupt { .. }
        )
    }
}

impl From<serenity::Error> for BotError {
    fn from(err: serenity::Error) -> Self {
        BotError::Discord {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

use poise::serenity_prelude as serenity;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_classification() {
        let err = BotError::StorageWrite {
            path: "state/sessions.json".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.is_storage());
        assert!(err.to_string().contains("state/sessions.json"));

        let err = BotError::MemberNotFound {
            guild_id: "7".to_string(),
            user_id: "42".to_string(),
            message: "Unknown Member".to_string(),
        };
        assert!(!err.is_storage());
    }

    #[test]
    fn test_delivery_error_survives_boxing() {
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(BotError::Delivery {
            message: "Cannot send messages to this user".to_string(),
        });
        assert!(matches!(
            boxed.downcast_ref::<BotError>(),
            Some(BotError::Delivery { .. })
        ));
    }
}
