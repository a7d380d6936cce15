use async_trait::async_trait;
use parking_lot::Mutex;
use poise::serenity_prelude::{GuildId, RoleId, UserId};
use std::collections::{HashMap, HashSet};

use super::{ChatPlatform, MemberInfo, RoleInfo};
use crate::error::{BotError, Result};

/// A recorded `add_role` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub role_id: RoleId,
    pub reason: String,
}

/// In-memory platform for sweep tests
#[derive(Default)]
pub struct FakePlatform {
    guilds: HashSet<GuildId>,
    roles: HashMap<GuildId, Vec<RoleInfo>>,
    failing_members: bool,
    failing_grants: bool,
    grants: Mutex<Vec<Grant>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guild(mut self, guild_id: u64) -> Self {
        self.guilds.insert(GuildId::new(guild_id));
        self
    }

    pub fn with_role(mut self, guild_id: u64, role_id: u64, name: &str) -> Self {
        let roles = self.roles.entry(GuildId::new(guild_id)).or_default();
        roles.push(RoleInfo {
            id: RoleId::new(role_id),
            name: name.to_string(),
            position: roles.len() as u16,
        });
        self
    }

    pub fn failing_members(mut self) -> Self {
        self.failing_members = true;
        self
    }

    pub fn failing_grants(mut self) -> Self {
        self.failing_grants = true;
        self
    }

    pub fn grants(&self) -> Vec<Grant> {
        self.grants.lock().clone()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    fn has_guild(&self, guild_id: GuildId) -> bool {
        self.guilds.contains(&guild_id)
    }

    async fn guild_roles(&self, guild_id: GuildId) -> Result<Vec<RoleInfo>> {
        if !self.guilds.contains(&guild_id) {
            return Err(BotError::Discord {
                message: format!("Unknown Guild {}", guild_id),
            });
        }
        Ok(self.roles.get(&guild_id).cloned().unwrap_or_default())
    }

    async fn fetch_member(&self, guild_id: GuildId, user_id: UserId) -> Result<MemberInfo> {
        if self.failing_members {
            return Err(BotError::Discord {
                message: format!("simulated outage fetching {} in {}", user_id, guild_id),
            });
        }
        Ok(MemberInfo {
            user_id,
            name: format!("user-{}", user_id),
        })
    }

    async fn add_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> Result<()> {
        if self.failing_grants {
            return Err(BotError::Discord {
                message: "Missing Permissions".to_string(),
            });
        }
        self.grants.lock().push(Grant {
            guild_id,
            user_id,
            role_id,
            reason: reason.to_string(),
        });
        Ok(())
    }
}
