use parking_lot::RwLock;
use poise::serenity_prelude::{GuildId, RoleId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::platform::{ChatPlatform, RoleInfo};

/// Guild -> id of the verification role in that guild.
///
/// Rebuilt wholesale on every gateway connect and read by the poller in
/// between. A guild without an entry has no role named `role_name`.
#[derive(Debug)]
pub struct RoleCache {
    role_name: String,
    roles: RwLock<HashMap<GuildId, RoleId>>,
}

impl RoleCache {
    pub fn new(role_name: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            roles: RwLock::new(HashMap::new()),
        }
    }

    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    pub fn get(&self, guild_id: GuildId) -> Option<RoleId> {
        self.roles.read().get(&guild_id).copied()
    }

    /// Replace the whole cache from the given guilds. Returns the number of
    /// guilds where the role was found.
    pub async fn rebuild(&self, platform: &dyn ChatPlatform, guild_ids: &[GuildId]) -> usize {
        info!("Assembling role cache for {} guilds", guild_ids.len());

        let mut fresh = HashMap::with_capacity(guild_ids.len());
        for guild_id in guild_ids {
            if let Some(role_id) = self.resolve(platform, *guild_id).await {
                fresh.insert(*guild_id, role_id);
            }
        }

        let found = fresh.len();
        *self.roles.write() = fresh;
        info!("Role cache ready: '{}' found in {}/{} guilds", self.role_name, found, guild_ids.len());
        found
    }

    /// Refresh a single guild's entry, e.g. after joining it
    pub async fn refresh_guild(&self, platform: &dyn ChatPlatform, guild_id: GuildId) -> Option<RoleId> {
        let resolved = self.resolve(platform, guild_id).await;
        let mut roles = self.roles.write();
        match resolved {
            Some(role_id) => {
                roles.insert(guild_id, role_id);
            }
            None => {
                roles.remove(&guild_id);
            }
        }
        resolved
    }

    async fn resolve(&self, platform: &dyn ChatPlatform, guild_id: GuildId) -> Option<RoleId> {
        match platform.guild_roles(guild_id).await {
            Ok(roles) => {
                let found = find_role(&roles, &self.role_name);
                if found.is_none() {
                    warn!(guild_id = %guild_id, "{} role not found in guild", self.role_name);
                }
                found
            }
            Err(e) => {
                warn!(guild_id = %guild_id, "Failed to list roles: {}", e);
                None
            }
        }
    }
}

/// First role (lowest position, then lowest id) whose name matches exactly
pub fn find_role(roles: &[RoleInfo], name: &str) -> Option<RoleId> {
    roles
        .iter()
        .filter(|r| r.name == name)
        .min_by_key(|r| (r.position, r.id))
        .map(|r| r.id)
}

pub type SharedRoleCache = Arc<RoleCache>;

pub fn create_shared_role_cache(role_name: &str) -> SharedRoleCache {
    Arc::new(RoleCache::new(role_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakePlatform;

    #[test]
    fn test_find_role_exact_match() {
        let roles = vec![
            RoleInfo { id: RoleId::new(3), name: "verified".to_string(), position: 1 },
            RoleInfo { id: RoleId::new(5), name: "UW Verified".to_string(), position: 4 },
            RoleInfo { id: RoleId::new(4), name: "UW Verified".to_string(), position: 2 },
        ];

        assert_eq!(find_role(&roles, "UW Verified"), Some(RoleId::new(4)));
        assert_eq!(find_role(&roles, "Verified"), None);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_entries() {
        let platform = FakePlatform::new()
            .with_guild(7)
            .with_role(7, 99, "Verified")
            .with_guild(8)
            .with_role(8, 1, "Member");
        let cache = RoleCache::new("Verified");

        let found = cache
            .rebuild(&platform, &[GuildId::new(7), GuildId::new(8)])
            .await;
        assert_eq!(found, 1);
        assert_eq!(cache.get(GuildId::new(7)), Some(RoleId::new(99)));
        assert_eq!(cache.get(GuildId::new(8)), None);

        // Guild 7 gone after reconnect: wholesale rebuild drops it
        cache.rebuild(&platform, &[GuildId::new(8)]).await;
        assert_eq!(cache.get(GuildId::new(7)), None);
    }

    #[tokio::test]
    async fn test_rebuild_skips_unreachable_guild() {
        let platform = FakePlatform::new().with_guild(7).with_role(7, 99, "Verified");
        let cache = RoleCache::new("Verified");

        let found = cache
            .rebuild(&platform, &[GuildId::new(7), GuildId::new(404)])
            .await;
        assert_eq!(found, 1);
        assert_eq!(cache.get(GuildId::new(404)), None);
    }

    #[tokio::test]
    async fn test_refresh_single_guild() {
        let platform = FakePlatform::new().with_guild(9).with_role(9, 12, "Verified");
        let cache = RoleCache::new("Verified");

        assert_eq!(cache.refresh_guild(&platform, GuildId::new(9)).await, Some(RoleId::new(12)));
        assert_eq!(cache.get(GuildId::new(9)), Some(RoleId::new(12)));
    }
}
