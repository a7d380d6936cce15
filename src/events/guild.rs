use poise::serenity_prelude as serenity;
use tracing::{debug, info};

use crate::platform::SerenityPlatform;
use crate::{Data, Error};

/// Rebuild the role cache on every (re)connect
pub async fn handle_ready(
    ctx: &serenity::Context,
    ready: &serenity::Ready,
    data: &Data,
) -> Result<(), Error> {
    info!("Connected as {} in {} guilds", ready.user.name, ready.guilds.len());

    let guild_ids: Vec<serenity::GuildId> = ready.guilds.iter().map(|g| g.id).collect();
    let platform = SerenityPlatform::from_context(ctx);
    data.role_cache.rebuild(&platform, &guild_ids).await;

    info!("Bot is ready");
    Ok(())
}

/// Refresh the cached role for a guild the bot just joined
pub async fn handle_guild_create(
    ctx: &serenity::Context,
    guild: &serenity::Guild,
    is_new: Option<bool>,
    data: &Data,
) -> Result<(), Error> {
    // Guilds streamed in after Ready were already covered by the rebuild
    if is_new != Some(true) {
        return Ok(());
    }

    info!("Refreshing verification role for guild: {} ({})", guild.name, guild.id);

    let platform = SerenityPlatform::from_context(ctx);
    if let Some(role_id) = data.role_cache.refresh_guild(&platform, guild.id).await {
        debug!("Verification role in {} is {}", guild.id, role_id);
    }
    Ok(())
}
