use poise::serenity_prelude as serenity;
use tracing::info;

use crate::{Context, Error};

const RECENT_WARNINGS: usize = 5;

/// Check if the bot is running
#[poise::command(prefix_command, slash_command)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    info!("Ping command called by {}", ctx.author().name);
    ctx.send(poise::CreateReply::default()
        .content("Pong! Bot is working!")
        .ephemeral(true))
        .await?;
    Ok(())
}

/// Show help information
#[poise::command(prefix_command, slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let prefix = &ctx.data().config.prefix;
    let embed = serenity::CreateEmbed::new()
        .title("Bot Commands")
        .description("Available commands:")
        .field(format!("{}ping", prefix), "Check if the bot is running", false)
        .field(
            format!("{}verify", prefix),
            "Get a private link to verify your email (use it in a verification channel)",
            false,
        )
        .field(format!("{}status", prefix), "Show verification status (Manage Roles)", false)
        .color(0x3498db);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true)).await?;
    Ok(())
}

/// Show pending sessions, role setup and recent warnings
#[poise::command(prefix_command, slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let counts = data.store.counts().await?;

    let role_line = match ctx.guild_id().and_then(|g| data.role_cache.get(g)) {
        Some(role_id) => format!("<@&{}>", role_id),
        None => format!("**missing** (no role named `{}`)", data.role_cache.role_name()),
    };

    let warnings = data.log_buffer.get_recent(RECENT_WARNINGS);
    let warnings_text = if warnings.is_empty() {
        "None".to_string()
    } else {
        warnings
            .iter()
            .map(|w| format!("`{}`", w.format()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let embed = serenity::CreateEmbed::new()
        .title("Verification Status")
        .field("Pending sessions", counts.pending.to_string(), true)
        .field("Awaiting role grant", counts.verified.to_string(), true)
        .field("Verification role", role_line, false)
        .field("Recent warnings", truncate(&warnings_text, 1024), false)
        .color(0x3498db);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true)).await?;
    Ok(())
}

/// Embed field values are capped at 1024 characters
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        let long = "x".repeat(2000);
        let cut = truncate(&long, 1024);
        assert_eq!(cut.chars().count(), 1024);
        assert!(cut.ends_with('…'));
    }
}
