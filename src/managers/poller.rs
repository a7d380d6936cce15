use futures::StreamExt;
use tracing::{error, info, warn};

use crate::error::{BotError, Result};
use crate::platform::SharedPlatform;
use crate::state::{Session, SharedRoleCache, SharedSessionStore};

/// Audit log reason attached to every role grant
pub const GRANT_REASON: &str = "Verification Bot";

/// Why a verified session could not be granted its role this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupFailure {
    /// The bot is no longer in the session's guild
    GuildUnavailable,
    /// The role cache has no verification role for the guild
    RoleMissing,
}

/// Result of processing one verified session
#[derive(Debug)]
pub enum GrantOutcome {
    Granted,
    LookupFailed(LookupFailure),
    TransientError(BotError),
}

/// Tally of one poll sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub granted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Grants the verification role to users whose session was marked verified
pub struct VerificationPoller {
    store: SharedSessionStore,
    roles: SharedRoleCache,
    platform: SharedPlatform,
}

impl VerificationPoller {
    pub fn new(store: SharedSessionStore, roles: SharedRoleCache, platform: SharedPlatform) -> Self {
        Self {
            store,
            roles,
            platform,
        }
    }

    /// Process every verified session once.
    ///
    /// Only a failure to scan the store is returned as an error. Per-session
    /// failures are logged and the session is left for the next tick; a
    /// session is deleted only after its grant succeeded.
    pub async fn sweep(&self) -> Result<PollReport> {
        let mut report = PollReport::default();
        let mut verified = self.store.scan_verified().await?;

        while let Some((session_id, session)) = verified.next().await {
            match self.process(&session).await {
                GrantOutcome::Granted => {
                    report.granted += 1;
                    if let Err(e) = self.store.delete(&session_id).await {
                        error!(
                            session_id = %session_id,
                            guild_id = %session.guild_id,
                            "Role granted but session could not be deleted: {}", e
                        );
                    }
                }
                GrantOutcome::LookupFailed(LookupFailure::GuildUnavailable) => {
                    report.skipped += 1;
                    warn!(
                        session_id = %session_id,
                        guild_id = %session.guild_id,
                        "Skipping verification for {}: bot is not in the guild",
                        session.discord_name
                    );
                }
                GrantOutcome::LookupFailed(LookupFailure::RoleMissing) => {
                    report.skipped += 1;
                    warn!(
                        session_id = %session_id,
                        guild_id = %session.guild_id,
                        "Skipping verification for {} because no {} role was found",
                        session.discord_name,
                        self.roles.role_name()
                    );
                }
                GrantOutcome::TransientError(e) => {
                    report.failed += 1;
                    error!(
                        session_id = %session_id,
                        guild_id = %session.guild_id,
                        "Failed to add role to user: {}", e
                    );
                }
            }
        }

        Ok(report)
    }

    /// Resolve guild, member and role, then grant. Never touches the store.
    pub async fn process(&self, session: &Session) -> GrantOutcome {
        let guild_id = session.guild_id;
        if !self.platform.has_guild(guild_id) {
            return GrantOutcome::LookupFailed(LookupFailure::GuildUnavailable);
        }

        let member = match self.platform.fetch_member(guild_id, session.user_id).await {
            Ok(member) => member,
            Err(e) => return GrantOutcome::TransientError(e),
        };

        let Some(role_id) = self.roles.get(guild_id) else {
            return GrantOutcome::LookupFailed(LookupFailure::RoleMissing);
        };

        info!(
            "Adding role to user {} ({}) with user id {}",
            session.discord_name, member.name, member.user_id
        );
        match self
            .platform
            .add_role(guild_id, member.user_id, role_id, GRANT_REASON)
            .await
        {
            Ok(()) => GrantOutcome::Granted,
            Err(e) => GrantOutcome::TransientError(e),
        }
    }
}
