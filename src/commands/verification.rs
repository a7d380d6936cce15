use poise::serenity_prelude as serenity;
use tracing::info;

use crate::error::BotError;
use crate::managers::intake::{VerificationLink, VerifyRequest};
use crate::{Context, Error};

const CARD_COLOUR: u32 = 0xffc0cb;

/// Start email verification
///
/// Sends you a private link where you confirm your email address.
#[poise::command(prefix_command, slash_command)]
pub async fn verify(ctx: Context<'_>) -> Result<(), Error> {
    // Slash invocations must always be answered; prefix ones stay quiet
    let is_slash = matches!(ctx, poise::Context::Application(_));
    ctx.defer_ephemeral().await?;

    let channel_name = match ctx.guild_id() {
        Some(_) => ctx
            .channel_id()
            .to_channel(ctx.serenity_context())
            .await
            .ok()
            .and_then(|channel| channel.guild())
            .map(|channel| channel.name),
        None => None,
    };

    let request = VerifyRequest {
        author_id: ctx.author().id,
        guild_id: ctx.guild_id(),
        channel_name,
        author_display_name: ctx.author().tag(),
    };

    let Some(link) = ctx.data().intake.start(&request).await? else {
        if is_slash {
            reply_ephemeral(ctx, slash_reply(false)).await?;
        }
        return Ok(());
    };

    let card = verification_card(&link, &ctx.data().config.thumbnail_url);
    ctx.author()
        .direct_message(ctx.serenity_context(), serenity::CreateMessage::new().embed(card))
        .await
        .map_err(|e| BotError::Delivery {
            message: format!("verification link for session {}: {}", link.session_id, e),
        })?;

    info!("Sent verification link to {}", request.author_display_name);
    if is_slash {
        reply_ephemeral(ctx, slash_reply(true)).await?;
    }

    Ok(())
}

/// Answer for a slash invocation, depending on whether a link was sent
fn slash_reply(link_sent: bool) -> &'static str {
    if link_sent {
        "Check your DMs for your verification link."
    } else {
        "Verification is only available in a server's verification channel."
    }
}

async fn reply_ephemeral(ctx: Context<'_>, content: &str) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

fn verification_card(link: &VerificationLink, thumbnail_url: &str) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("Verification!")
        .url(&link.url)
        .description(
            "Please use this page to enter your email for verification. Your email will not be shared with Discord.",
        )
        .field("Verification Link", &link.url, true)
        .thumbnail(thumbnail_url)
        .color(CARD_COLOUR)
}
