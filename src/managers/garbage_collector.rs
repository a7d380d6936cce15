use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::state::SharedSessionStore;

/// Removes sessions older than the expiry, verified or not
pub struct GarbageCollector {
    store: SharedSessionStore,
    expiry: Duration,
}

impl GarbageCollector {
    pub fn new(store: SharedSessionStore, expiry: Duration) -> Self {
        Self { store, expiry }
    }

    /// Delete every expired session. Returns how many were removed; a failed
    /// delete is logged and the sweep moves on.
    pub async fn sweep(&self) -> Result<usize> {
        let mut expired = self.store.scan_older_than(self.expiry).await?;
        let mut removed = 0;

        while let Some((session_id, session)) = expired.next().await {
            match self.store.delete(&session_id).await {
                Ok(()) => {
                    removed += 1;
                    debug!(
                        session_id = %session_id,
                        verified = session.verified,
                        "Expired session for {}",
                        session.discord_name
                    );
                }
                Err(e) => {
                    warn!(
                        session_id = %session_id,
                        guild_id = %session.guild_id,
                        "Failed to delete expired session: {}", e
                    );
                }
            }
        }

        if removed > 0 {
            info!("Collected {} expired sessions", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{create_log_buffer, LogCaptureLayer};
    use crate::state::clock::ManualClock;
    use crate::state::{create_shared_session_store, SessionStore};
    use chrono::Utc;
    use poise::serenity_prelude::{GuildId, UserId};
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    const EXPIRY: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn test_expired_sessions_removed_regardless_of_verification() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = create_shared_session_store(SessionStore::new(
            dir.path().join("sessions.json"),
            clock.clone(),
        ));
        let gc = GarbageCollector::new(store.clone(), EXPIRY);

        let pending = store.create(UserId::new(1), GuildId::new(7), "a").await.unwrap();
        let verified = store.create(UserId::new(2), GuildId::new(7), "b").await.unwrap();
        store.mark_verified(&verified).await.unwrap();

        assert_eq!(gc.sweep().await.unwrap(), 0);

        clock.advance(EXPIRY + Duration::from_secs(1));
        let fresh = store.create(UserId::new(3), GuildId::new(7), "c").await.unwrap();

        assert_eq!(gc.sweep().await.unwrap(), 2);
        assert!(store.get(&pending).await.unwrap().is_none());
        assert!(store.get(&verified).await.unwrap().is_none());
        assert!(store.get(&fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_session_at_exact_expiry_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = create_shared_session_store(SessionStore::new(
            dir.path().join("sessions.json"),
            clock.clone(),
        ));
        let gc = GarbageCollector::new(store.clone(), EXPIRY);

        let id = store.create(UserId::new(1), GuildId::new(7), "a").await.unwrap();
        clock.advance(EXPIRY);

        assert_eq!(gc.sweep().await.unwrap(), 0);
        assert!(store.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_deletes_do_not_stop_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = create_shared_session_store(SessionStore::new(
            dir.path().join("sessions.json"),
            clock.clone(),
        ));
        let gc = GarbageCollector::new(store.clone(), EXPIRY);

        let first = store.create(UserId::new(1), GuildId::new(7), "a").await.unwrap();
        let second = store.create(UserId::new(2), GuildId::new(7), "b").await.unwrap();
        clock.advance(EXPIRY + Duration::from_secs(1));

        // Scans still read the store, but no writer can take the lock
        std::fs::remove_file(store.lock_path()).unwrap();
        std::fs::create_dir(store.lock_path()).unwrap();

        let buffer = create_log_buffer(10);
        let subscriber = tracing_subscriber::registry().with(LogCaptureLayer::new(buffer.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        assert_eq!(gc.sweep().await.unwrap(), 0);

        let failures = buffer
            .get_recent(10)
            .into_iter()
            .filter(|entry| entry.message.contains("Failed to delete expired session"))
            .count();
        assert_eq!(failures, 2);
        assert!(store.get(&first).await.unwrap().is_some());
        assert!(store.get(&second).await.unwrap().is_some());
    }
}
