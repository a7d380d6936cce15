use poise::serenity_prelude::{GuildId, UserId};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::state::{SessionId, SharedSessionStore};

/// Everything the `verify` command hands to intake
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub author_id: UserId,
    /// `None` for direct messages
    pub guild_id: Option<GuildId>,
    pub channel_name: Option<String>,
    /// `name#discriminator` of the invoking user
    pub author_display_name: String,
}

/// A freshly started session and the link that completes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationLink {
    pub session_id: SessionId,
    pub url: String,
}

/// Starts verification sessions from user commands
pub struct SessionIntake {
    store: SharedSessionStore,
    base_url: String,
    channel_marker: String,
}

impl SessionIntake {
    pub fn new(store: SharedSessionStore, base_url: &str, channel_marker: &str) -> Self {
        Self {
            store,
            base_url: base_url.trim_end_matches('/').to_string(),
            channel_marker: channel_marker.to_lowercase(),
        }
    }

    /// Guild the request may start a session in, if any
    pub fn accepts(&self, request: &VerifyRequest) -> Option<GuildId> {
        let guild_id = request.guild_id?;
        let channel_name = request.channel_name.as_deref()?;
        if !channel_name.to_lowercase().contains(&self.channel_marker) {
            return None;
        }
        Some(guild_id)
    }

    /// Create a session for the request. `Ok(None)` means the request was
    /// silently ignored (DM or a channel without the marker).
    pub async fn start(&self, request: &VerifyRequest) -> Result<Option<VerificationLink>> {
        let Some(guild_id) = self.accepts(request) else {
            debug!(
                user_id = %request.author_id,
                "Ignoring verify outside a verification channel"
            );
            return Ok(None);
        };

        let session_id = self
            .store
            .create(request.author_id, guild_id, &request.author_display_name)
            .await?;
        info!(
            "Started new session for {} {}",
            request.author_display_name, request.author_id
        );

        let url = self.link_for(&session_id);
        Ok(Some(VerificationLink { session_id, url }))
    }

    pub fn link_for(&self, session_id: &SessionId) -> String {
        format!("{}/start/{}/email", self.base_url, session_id)
    }
}

pub type SharedSessionIntake = Arc<SessionIntake>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{create_shared_session_store, SessionStore};

    fn request(guild: Option<u64>, channel: Option<&str>) -> VerifyRequest {
        VerifyRequest {
            author_id: UserId::new(42),
            guild_id: guild.map(GuildId::new),
            channel_name: channel.map(str::to_string),
            author_display_name: "alice#0001".to_string(),
        }
    }

    fn intake(dir: &tempfile::TempDir) -> (SessionIntake, SharedSessionStore) {
        let store = create_shared_session_store(SessionStore::open(dir.path().join("sessions.json")));
        let intake = SessionIntake::new(store.clone(), "https://verify.example.com/", "verification");
        (intake, store)
    }

    #[tokio::test]
    async fn test_start_creates_pending_session() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, store) = intake(&dir);

        let link = intake
            .start(&request(Some(7), Some("user-Verification")))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            link.url,
            format!("https://verify.example.com/start/{}/email", link.session_id)
        );
        let session = store.get(&link.session_id).await.unwrap().unwrap();
        assert_eq!(session.user_id, UserId::new(42));
        assert_eq!(session.guild_id, GuildId::new(7));
        assert_eq!(session.discord_name, "alice#0001");
        assert!(!session.verified);
    }

    #[tokio::test]
    async fn test_direct_messages_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, store) = intake(&dir);

        assert!(intake.start(&request(None, None)).await.unwrap().is_none());
        assert_eq!(store.counts().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_other_channels_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, store) = intake(&dir);

        assert!(intake
            .start(&request(Some(7), Some("general")))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.counts().await.unwrap().pending, 0);
    }
}
