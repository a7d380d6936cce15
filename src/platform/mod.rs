//! The slice of the chat platform the verification core depends on.
//!
//! Everything the poller and role cache need from Discord goes through
//! [`ChatPlatform`], so the sweep logic can run against a fake in tests.

mod serenity_platform;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use poise::serenity_prelude::{GuildId, RoleId, UserId};
use std::sync::Arc;

use crate::error::Result;

pub use serenity_platform::SerenityPlatform;

/// A role as listed by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
    pub position: u16,
}

/// A guild member resolved for a role grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub name: String,
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Whether the bot is still a member of the guild
    fn has_guild(&self, guild_id: GuildId) -> bool;

    /// All roles defined in the guild
    async fn guild_roles(&self, guild_id: GuildId) -> Result<Vec<RoleInfo>>;

    async fn fetch_member(&self, guild_id: GuildId, user_id: UserId) -> Result<MemberInfo>;

    /// Grant a role, recording `reason` in the audit log
    async fn add_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> Result<()>;
}

pub type SharedPlatform = Arc<dyn ChatPlatform>;
