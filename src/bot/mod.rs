//! # Bot Module
//!
//! Discord side of the jukebox.
//!
//! The bot is built around the [`MusicBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It turns prefixed chat commands and
//! control panel clicks into calls on the guild's
//! [`PlaybackController`](crate::audio::controller::PlaybackController), and
//! joins the configured voice channel on startup when one is set.
//!
//! - [`commands`]: chat command parsing and help text
//! - [`handlers`]: command and button execution
//! - [`registry`]: one player per guild, with its signal pump
//! - [`events`]: songbird event forwarders

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Message, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;
pub mod registry;

use crate::{
    audio::{link::VoiceTarget, player::SongbirdLink},
    config::Config,
    sources::{Downloader, LocalLibrary, TrackLibrary},
};

pub type Players = registry::GuildPlayers<SongbirdLink>;
pub type Player = registry::GuildPlayer<SongbirdLink>;

/// Main Discord event handler.
pub struct MusicBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    /// Per-guild playback state
    players: Arc<Players>,
    library: Arc<LocalLibrary>,
    downloader: Arc<Downloader>,
}

impl MusicBot {
    pub fn new(
        config: Arc<Config>,
        players: Arc<Players>,
        library: Arc<LocalLibrary>,
        downloader: Downloader,
    ) -> Self {
        Self {
            config,
            players,
            library,
            downloader: Arc::new(downloader),
        }
    }

    /// Joins the configured voice channel and plays the whole library.
    async fn autojoin(&self) -> Result<()> {
        let Some((guild, channel)) = self.config.autojoin() else {
            return Ok(());
        };
        let target = VoiceTarget {
            guild_id: GuildId::new(guild),
            channel_id: ChannelId::new(channel),
        };

        let player = self.players.get_or_create(target.guild_id);
        {
            let mut controller = player.controller.lock().await;
            if controller.has_session() {
                return Ok(());
            }

            let tracks = self.library.list_available().await?;
            if tracks.is_empty() {
                warn!(
                    "📭 No audio files in {}, not joining",
                    self.library.root().display()
                );
                return Ok(());
            }

            info!("🔊 Autojoining channel {} in guild {}", channel, guild);
            controller.enqueue(tracks, true).await?;
            controller.ensure_session(target).await?;
        }

        player.refresh_panel().await;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.autojoin().await {
            error!("Error joining the configured channel: {:?}", e);
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if let Err(e) = handlers::handle_message(&ctx, &msg, self).await {
            error!("Error handling message: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Component(component_interaction) = interaction {
            if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                error!("Error handling component: {:?}", e);
            }
        }
    }

    /// Tears the session down when someone disconnects the bot.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }

        let (Some(guild_id), Some(channel_id)) =
            (new.guild_id, old.and_then(|state| state.channel_id))
        else {
            return;
        };

        if let Some(player) = self.players.get(guild_id) {
            player.report_link_lost(channel_id).await;
        }
    }
}
