use async_trait::async_trait;
use poise::serenity_prelude::{self as serenity, GuildId, RoleId, UserId};
use std::sync::Arc;

use super::{ChatPlatform, MemberInfo, RoleInfo};
use crate::error::{BotError, Result};

/// [`ChatPlatform`] backed by the live gateway cache and HTTP client
#[derive(Clone)]
pub struct SerenityPlatform {
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<serenity::Http>, cache: Arc<serenity::Cache>) -> Self {
        Self { http, cache }
    }

    pub fn from_context(ctx: &serenity::Context) -> Self {
        Self::new(ctx.http.clone(), ctx.cache.clone())
    }
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    fn has_guild(&self, guild_id: GuildId) -> bool {
        self.cache.guild(guild_id).is_some()
    }

    async fn guild_roles(&self, guild_id: GuildId) -> Result<Vec<RoleInfo>> {
        let roles = guild_id.roles(self.http.as_ref()).await?;
        Ok(roles
            .into_values()
            .map(|role| RoleInfo {
                id: role.id,
                name: role.name,
                position: role.position,
            })
            .collect())
    }

    async fn fetch_member(&self, guild_id: GuildId, user_id: UserId) -> Result<MemberInfo> {
        let member = guild_id
            .member(&self.http, user_id)
            .await
            .map_err(|e| BotError::MemberNotFound {
                guild_id: guild_id.to_string(),
                user_id: user_id.to_string(),
                message: e.to_string(),
            })?;

        Ok(MemberInfo {
            user_id: member.user.id,
            name: member.user.name.clone(),
        })
    }

    async fn add_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> Result<()> {
        self.http
            .add_member_role(guild_id, user_id, role_id, Some(reason))
            .await?;
        Ok(())
    }
}
