use anyhow::Result;
use clap::Parser;
use poise::serenity_prelude::{self as serenity, Mentionable};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Discord bot that grants a role once a member verifies their email
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Load settings from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Send a test verification code to this address with the configured mailer, then exit
    #[arg(long, value_name = "ADDRESS")]
    send_test_email: Option<String>,
}

mod commands;
mod config;
mod error;
mod events;
mod logging;
mod mailer;
mod managers;
mod platform;
mod state;

use commands::{help, ping, status, verify};
use config::BotConfig;
use error::BotError;
use events::{handle_guild_create, handle_ready};
use logging::SharedLogBuffer;
use managers::{maintenance, GarbageCollector, Maintenance, SessionIntake, SharedSessionIntake, VerificationPoller};
use platform::{SerenityPlatform, SharedPlatform};
use state::{
    create_shared_role_cache, create_shared_session_store, SessionStore, SharedRoleCache,
    SharedSessionStore,
};

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared application state
pub struct Data {
    pub config: Arc<BotConfig>,
    pub store: SharedSessionStore,
    pub role_cache: SharedRoleCache,
    pub intake: SharedSessionIntake,
    pub log_buffer: SharedLogBuffer,
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            if let Err(e) = handle_ready(ctx, data_about_bot, data).await {
                error!("Failed to handle ready: {}", e);
            }
        }
        serenity::FullEvent::GuildCreate { guild, is_new } => {
            if let Err(e) = handle_guild_create(ctx, guild, *is_new, data).await {
                error!("Failed to handle guild create: {}", e);
            }
        }
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    match &args.env_file {
        Some(path) => {
            dotenv::from_path(path)?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    let log_buffer = logging::create_log_buffer(100);
    logging::init(log_buffer.clone());

    let config = Arc::new(BotConfig::from_env()?);

    if let Some(address) = args.send_test_email {
        let mailer = mailer::build_mailer(&config.mailer);
        let code = mailer::generate_code();
        mailer.send(&address, &code, "mailer self-test").await?;
        info!("Test verification code {} sent to {}", code, address);
        return Ok(());
    }

    let store = create_shared_session_store(SessionStore::open(&config.store_path));
    info!(
        "Opened session store at {} (writers lock {})",
        store.path().display(),
        store.lock_path().display()
    );
    let counts = store.counts().await?;
    info!(
        "Session store has {} pending and {} verified sessions",
        counts.pending, counts.verified
    );

    let role_cache = create_shared_role_cache(&config.role_name);
    let intake: SharedSessionIntake = Arc::new(SessionIntake::new(
        store.clone(),
        &config.url,
        &config.channel_marker,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance_task: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>> =
        Arc::new(parking_lot::Mutex::new(None));

    let framework = {
        let config = config.clone();
        let maintenance_task = maintenance_task.clone();

        poise::Framework::builder()
            .options(poise::FrameworkOptions {
                commands: vec![ping(), help(), status(), verify()],
                prefix_options: poise::PrefixFrameworkOptions {
                    prefix: Some(config.prefix.clone()),
                    ..Default::default()
                },
                event_handler: |ctx, event, framework, data| {
                    Box::pin(event_handler(ctx, event, framework, data))
                },
                pre_command: |ctx| {
                    Box::pin(async move {
                        info!(
                            "Command '{}' invoked by {} (ID: {}) in {}",
                            ctx.command().qualified_name,
                            ctx.author().name,
                            ctx.author().id,
                            ctx.guild_id().map(|g| g.to_string()).unwrap_or_else(|| "DM".to_string())
                        );
                    })
                },
                on_error: |error| {
                    Box::pin(async move {
                        match error {
                            poise::FrameworkError::Command { error, ctx, .. } => {
                                if let Some(BotError::Delivery { .. }) = error.downcast_ref::<BotError>() {
                                    warn!("Could not DM {}: {}", ctx.author().name, error);
                                    let _ = ctx
                                        .say(format!(
                                            "{} I couldn't send you a private message. Please enable DMs from server members and try again.",
                                            ctx.author().mention()
                                        ))
                                        .await;
                                } else {
                                    error!("Error in command '{}': {}", ctx.command().qualified_name, error);
                                    let _ = ctx.say("Something went wrong, please try again later.").await;
                                }
                            }
                            poise::FrameworkError::MissingUserPermissions { missing_permissions, ctx, .. } => {
                                warn!("User {} missing permissions for '{}': {:?}", ctx.author().name, ctx.command().qualified_name, missing_permissions);
                            }
                            poise::FrameworkError::GuildOnly { ctx, .. } => {
                                warn!("Command '{}' is guild-only, used in DM by {}", ctx.command().qualified_name, ctx.author().name);
                            }
                            other => {
                                if let Err(e) = poise::builtins::on_error(other).await {
                                    error!("Error while handling error: {}", e);
                                }
                            }
                        }
                    })
                },
                ..Default::default()
            })
            .setup(move |ctx, ready, framework| {
                let config = config.clone();
                let store = store.clone();
                let role_cache = role_cache.clone();
                let intake = intake.clone();
                let log_buffer = log_buffer.clone();
                let shutdown_rx = shutdown_rx.clone();
                let maintenance_task = maintenance_task.clone();

                Box::pin(async move {
                    info!("Bot logged in as: {}", ready.user.name);

                    info!("Registering commands globally...");
                    if let Err(e) =
                        poise::builtins::register_globally(ctx, &framework.options().commands).await
                    {
                        error!("Failed to register commands globally: {}", e);
                    }

                    let platform: SharedPlatform = Arc::new(SerenityPlatform::from_context(ctx));
                    let sweeper = Arc::new(Maintenance::new(
                        VerificationPoller::new(store.clone(), role_cache.clone(), platform),
                        GarbageCollector::new(store.clone(), config.expiry),
                    ));
                    let handle = maintenance::start(sweeper, config.check_interval, shutdown_rx);
                    *maintenance_task.lock() = Some(handle);

                    Ok(Data {
                        config,
                        store,
                        role_cache,
                        intake,
                        log_buffer,
                    })
                })
            })
            .build()
    };

    let intents = serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::ClientBuilder::new(&config.token, intents)
        .framework(framework)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown requested");
        shard_manager.shutdown_all().await;
    });

    info!("Starting bot...");
    let run = client.start().await;

    // Let the sweep in progress finish before exiting
    let _ = shutdown_tx.send(true);
    let handle = maintenance_task.lock().take();
    if let Some(handle) = handle {
        if let Err(e) = handle.await {
            error!("Maintenance task panicked: {}", e);
        }
    }

    if let Err(e) = run {
        let err_str = e.to_string();
        if err_str.contains("Disallowed") || err_str.contains("intents") {
            error!("Failed to start bot: {}", e);
            error!("Enable the MESSAGE_CONTENT privileged intent in the Discord Developer Portal (Bot -> Privileged Gateway Intents)");
        }
        return Err(e.into());
    }
    warn!("Bot ended.");

    Ok(())
}
