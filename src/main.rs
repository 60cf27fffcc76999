use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, model::id::ChannelId, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod sources;
mod ui;

use crate::audio::player::SongbirdLink;
use crate::bot::{registry::GuildPlayers, MusicBot};
use crate::config::Config;
use crate::sources::{Downloader, LocalLibrary};
use crate::ui::panel::SerenityControlSurface;

#[tokio::main]
async fn main() -> Result<()> {
    // Logging first
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("local_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Local Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Container health check
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Intents
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let songbird = Songbird::serenity();
    let http = Arc::new(Http::new(&config.discord_token));
    let library = Arc::new(LocalLibrary::new(
        config.music_dir.clone(),
        config.audio_extensions.clone(),
    ));

    let players = Arc::new(GuildPlayers::new(
        Arc::new(SongbirdLink::new(songbird.clone(), config.default_volume)),
        library.clone(),
        Arc::new(SerenityControlSurface::new(http)),
        config.controller_settings(),
        config.text_channel_id.map(ChannelId::new),
    ));

    let downloader = Downloader::new(config.music_dir.clone(), config.download_timeout);
    let handler = MusicBot::new(config.clone(), players, library, downloader);

    // Client
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Ctrl+C
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error registering Ctrl+C handler: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        std::process::exit(0);
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // yt-dlp downloads, ffmpeg converts
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Missing dependencies: yt-dlp and ffmpeg are required");
    }
}
