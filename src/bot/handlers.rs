use anyhow::Result;
use serenity::{
    all::ChannelType,
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage},
    model::{
        application::ComponentInteraction,
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    audio::{
        controller::{AdvanceReason, PlayerSnapshot, SessionOutcome},
        error::{PlaybackError, PlaybackResult},
        link::{VoiceLink, VoiceTarget},
    },
    bot::{
        commands::{self, ChatCommand, MESSAGE_LIMIT},
        registry::GuildPlayer,
        MusicBot, Player,
    },
    sources::{library::find_track, Track, TrackLibrary, TrackSelector},
    ui::{
        buttons::{create_player_controls, ControlAction},
        embeds,
    },
};

enum Reply {
    Text(String),
    Success(String),
    Silent,
}

/// Handles a guild message that may carry a prefixed command.
pub async fn handle_message(ctx: &Context, msg: &Message, bot: &MusicBot) -> Result<()> {
    if msg.author.bot {
        return Ok(());
    }
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    let Some(command) = commands::parse(&msg.content, &bot.config.command_prefix) else {
        return Ok(());
    };

    info!(
        "📝 Command {:?} from {} in guild {}",
        command, msg.author.name, guild_id
    );

    let player = bot.players.get_or_create(guild_id);
    {
        let mut panel = player.panel.lock().await;
        if panel.channel().is_none() {
            panel.bind(msg.channel_id);
        }
    }

    let refresh = command.changes_playback();
    let reply = match execute(ctx, msg, bot, &player, guild_id, command).await {
        Ok(reply) => reply,
        Err(e) => {
            send_error(ctx, msg.channel_id, &e).await?;
            Reply::Silent
        }
    };

    match reply {
        Reply::Text(text) => {
            for chunk in commands::chunk_message(&text, MESSAGE_LIMIT) {
                msg.channel_id.say(&ctx.http, chunk).await?;
            }
        }
        Reply::Success(text) => {
            msg.channel_id
                .send_message(
                    &ctx.http,
                    CreateMessage::new().embed(embeds::create_success_embed("Done", &text)),
                )
                .await?;
        }
        Reply::Silent => {}
    }

    if refresh {
        player.refresh_panel().await;
    }
    Ok(())
}

async fn execute(
    ctx: &Context,
    msg: &Message,
    bot: &MusicBot,
    player: &Arc<Player>,
    guild_id: GuildId,
    command: ChatCommand,
) -> Result<Reply> {
    let prefix = &bot.config.command_prefix;

    let reply = match command {
        ChatCommand::Play(selector) => {
            if selector.is_none() {
                if let Some(text) = resume_running(player).await? {
                    return Ok(Reply::Text(text.to_string()));
                }
            }

            let tracks = bot.library.list_available().await?;
            if tracks.is_empty() {
                return Ok(Reply::Text(format!(
                    "📭 No audio files in `{}`",
                    bot.library.root().display()
                )));
            }

            let start = match &selector {
                None => 0,
                Some(selector) => find_track(&tracks, selector)
                    .ok_or_else(|| PlaybackError::InvalidTrack(selector_label(selector)))?,
            };
            let name = tracks[start].name().to_string();
            let total = tracks.len();

            let mut controller = player.controller.lock().await;
            let Some(target) = controller
                .session_target()
                .or_else(|| caller_target(ctx, guild_id, msg.author.id))
                .or_else(|| configured_target(bot, guild_id))
            else {
                return Ok(Reply::Text("🔇 Join a voice channel first".to_string()));
            };

            controller.enqueue(tracks, true).await?;
            controller.select(start)?;
            if controller.ensure_session(target).await? == SessionOutcome::Reused {
                controller.play_current().await;
            }

            Reply::Success(format!("🎵 Playing **{}** ({} track(s) queued)", name, total))
        }
        ChatCommand::Pause => {
            let changed = player.controller.lock().await.pause().await?;
            let text = if changed { "⏸️ Paused" } else { "⏸️ Already paused" };
            Reply::Text(text.to_string())
        }
        ChatCommand::Resume => {
            let changed = player.controller.lock().await.resume().await?;
            let text = if changed { "▶️ Resumed" } else { "▶️ Already playing" };
            Reply::Text(text.to_string())
        }
        ChatCommand::Next => skip(player, AdvanceReason::SkippedForward).await?,
        ChatCommand::Previous => skip(player, AdvanceReason::SkippedBackward).await?,
        ChatCommand::List => {
            let tracks = bot.library.list_available().await?;
            Reply::Text(library_listing(&tracks))
        }
        ChatCommand::Shuffle => {
            let mut controller = player.controller.lock().await;
            let on = !controller.flags().shuffling;
            controller.shuffle(on);
            Reply::Text(format!("🔀 Shuffle {}", enabled(on)))
        }
        ChatCommand::Loop => {
            let mut controller = player.controller.lock().await;
            let on = !controller.flags().looping;
            controller.set_looping(on);
            Reply::Text(format!("🔁 Loop {}", enabled(on)))
        }
        ChatCommand::Autoplay => {
            let mut controller = player.controller.lock().await;
            let on = !controller.flags().autoplaying;
            controller.set_autoplay(on);
            Reply::Text(format!("📻 Autoplay {}", enabled(on)))
        }
        ChatCommand::Join(name) => {
            let channel = match &name {
                Some(name) => voice_channel_named(ctx, guild_id, name),
                None => caller_target(ctx, guild_id, msg.author.id).map(|t| t.channel_id),
            };
            let Some(channel_id) = channel else {
                return Ok(Reply::Text(match name {
                    Some(name) => format!("🔇 No voice channel named `{}`", name),
                    None => "🔇 Join a voice channel first".to_string(),
                }));
            };

            player
                .controller
                .lock()
                .await
                .relocate(VoiceTarget {
                    guild_id,
                    channel_id,
                })
                .await?;
            Reply::Text(format!("🔊 Joined <#{}>", channel_id))
        }
        ChatCommand::Control => {
            let snapshot = player.controller.lock().await.snapshot();
            player.panel.lock().await.reset(msg.channel_id, &snapshot).await;
            Reply::Silent
        }
        ChatCommand::Help => Reply::Text(commands::help_text(prefix)),
        ChatCommand::Download(url) => {
            spawn_download(ctx, bot, player.clone(), msg.channel_id, url.clone());
            Reply::Text(format!("⬇️ Downloading <{}>...", url))
        }
        ChatCommand::Leave => {
            player.controller.lock().await.stop().await;
            Reply::Text("👋 Left the voice channel".to_string())
        }
        ChatCommand::Invalid { usage } => Reply::Text(format!("Usage: `{}{}`", prefix, usage)),
        ChatCommand::Unknown(name) => Reply::Text(format!(
            "❓ Unknown command `{}`. Try `{}help`.",
            name, prefix
        )),
    };

    Ok(reply)
}

/// A bare `play` on a live session resumes it instead of restarting the
/// library. `None` when there is no session.
async fn resume_running<V: VoiceLink>(
    player: &GuildPlayer<V>,
) -> PlaybackResult<Option<&'static str>> {
    let mut controller = player.controller.lock().await;
    if !controller.has_session() {
        return Ok(None);
    }

    let text = if controller.resume().await? {
        "▶️ Resumed"
    } else {
        "▶️ Playback is already running"
    };
    Ok(Some(text))
}

async fn skip(player: &Player, reason: AdvanceReason) -> PlaybackResult<Reply> {
    let mut controller = player.controller.lock().await;
    if !controller.has_session() {
        return Err(PlaybackError::NotPlaying);
    }

    controller.advance(reason).await;
    let emoji = if reason == AdvanceReason::SkippedBackward {
        "⏮️"
    } else {
        "⏭️"
    };
    Ok(Reply::Text(format!(
        "{} {}",
        emoji,
        controller.snapshot().now_playing_text()
    )))
}

/// Runs a download in the background and queues the result.
fn spawn_download(
    ctx: &Context,
    bot: &MusicBot,
    player: Arc<Player>,
    channel: ChannelId,
    url: String,
) {
    let http = ctx.http.clone();
    let downloader = bot.downloader.clone();

    tokio::spawn(async move {
        let outcome = async {
            let media = downloader.download(&url).await?;
            queue_download(&player, Track::new(media.filepath, media.title)).await
        }
        .await;

        let message = match outcome {
            Ok(name) => {
                player.refresh_panel().await;
                CreateMessage::new()
                    .embed(embeds::create_success_embed("Downloaded", &format!("➕ Queued **{}**", name)))
            }
            Err(e) => {
                warn!("❌ Download of {} failed: {}", url, e);
                CreateMessage::new().embed(embeds::create_error_embed("Download failed", &e.to_string()))
            }
        };

        if let Err(e) = channel.send_message(&http, message).await {
            error!("Error sending download result: {:?}", e);
        }
    });
}

/// Appends a downloaded track and starts it if the session sits idle.
/// Returns the name it was queued under.
async fn queue_download<V: VoiceLink>(
    player: &GuildPlayer<V>,
    track: Track,
) -> PlaybackResult<String> {
    let name = track.name().to_string();

    let mut controller = player.controller.lock().await;
    controller.enqueue(vec![track], false).await?;
    if controller.has_session() && controller.playing().is_none() {
        controller.play_current().await;
    }
    Ok(name)
}

/// Handles a click on one of the control panel buttons.
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Button used outside a guild"))?;

    info!(
        "🔘 Button {} pressed by {} in guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(action) = ControlAction::from_custom_id(&component.data.custom_id) else {
        return respond_ephemeral(ctx, &component, "❌ Unknown action").await;
    };

    let player = bot.players.get_or_create(guild_id);
    match apply_action(&player, action).await {
        Ok(snapshot) => {
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::create_now_playing_embed(&snapshot))
                            .components(create_player_controls(&snapshot)),
                    ),
                )
                .await?;

            let on_panel = player
                .panel
                .lock()
                .await
                .message()
                .is_some_and(|m| m.message_id == component.message.id);
            if !on_panel {
                player.refresh_panel().await;
            }
            Ok(())
        }
        Err(e) if e.is_user_facing() => respond_ephemeral(ctx, &component, &format!("❌ {}", e)).await,
        Err(e) => {
            error!("Error handling button {:?}: {}", action, e);
            respond_ephemeral(ctx, &component, "❌ Something went wrong").await
        }
    }
}

/// Applies a button press and returns the resulting state.
pub async fn apply_action<V: VoiceLink>(
    player: &GuildPlayer<V>,
    action: ControlAction,
) -> PlaybackResult<PlayerSnapshot> {
    let mut controller = player.controller.lock().await;

    match action {
        ControlAction::Previous | ControlAction::Next => {
            if !controller.has_session() {
                return Err(PlaybackError::NotPlaying);
            }
            let reason = if action == ControlAction::Previous {
                AdvanceReason::SkippedBackward
            } else {
                AdvanceReason::SkippedForward
            };
            controller.advance(reason).await;
        }
        ControlAction::PauseResume => {
            if controller.is_paused() {
                controller.resume().await?;
            } else {
                controller.pause().await?;
            }
        }
        ControlAction::Shuffle => {
            let on = !controller.flags().shuffling;
            controller.shuffle(on);
        }
        ControlAction::Loop => {
            let on = !controller.flags().looping;
            controller.set_looping(on);
        }
    }

    Ok(controller.snapshot())
}

async fn respond_ephemeral(
    ctx: &Context,
    component: &ComponentInteraction,
    content: &str,
) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn send_error(ctx: &Context, channel: ChannelId, error: &anyhow::Error) -> Result<()> {
    let description = match error.downcast_ref::<PlaybackError>() {
        Some(e) if e.is_user_facing() => e.to_string(),
        _ => {
            error!("Error running command: {:?}", error);
            "Something went wrong, check the logs.".to_string()
        }
    };

    channel
        .send_message(
            &ctx.http,
            CreateMessage::new().embed(embeds::create_error_embed("Error", &description)),
        )
        .await?;
    Ok(())
}

/// The caller's current voice channel, from the cache.
fn caller_target(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<VoiceTarget> {
    let guild = ctx.cache.guild(guild_id)?;
    let channel_id = guild.voice_states.get(&user_id)?.channel_id?;
    Some(VoiceTarget {
        guild_id,
        channel_id,
    })
}

fn configured_target(bot: &MusicBot, guild_id: GuildId) -> Option<VoiceTarget> {
    let (guild, channel) = bot.config.autojoin()?;
    (guild == guild_id.get()).then(|| VoiceTarget {
        guild_id,
        channel_id: ChannelId::new(channel),
    })
}

fn voice_channel_named(ctx: &Context, guild_id: GuildId, name: &str) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .channels
        .values()
        .find(|c| c.kind == ChannelType::Voice && c.name.eq_ignore_ascii_case(name))
        .map(|c| c.id)
}

fn selector_label(selector: &TrackSelector) -> String {
    match selector {
        TrackSelector::Number(number) => number.to_string(),
        TrackSelector::Name(name) => name.clone(),
    }
}

fn library_listing(tracks: &[Track]) -> String {
    if tracks.is_empty() {
        return "📭 The music library is empty".to_string();
    }

    let mut text = format!("📜 **Music library** ({} tracks)\n", tracks.len());
    for (index, track) in tracks.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", index + 1, track.name()));
    }
    text
}

fn enabled(on: bool) -> &'static str {
    if on {
        "enabled"
    } else {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            controller::{ControllerSettings, PlaybackController},
            link::{AudioSink, PlaybackId, SignalSender},
        },
        sources::MockTrackLibrary,
        ui::panel::{ControlPanel, MockControlSurface},
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::{path::Path, time::Duration};
    use tokio::sync::Mutex;

    struct SilentVoice;
    struct SilentSink;

    #[async_trait]
    impl VoiceLink for SilentVoice {
        type Link = ();
        type Sink = SilentSink;

        async fn connect(&self, _target: VoiceTarget) -> PlaybackResult<()> {
            Ok(())
        }

        async fn subscribe(&self, _link: &(), _signals: SignalSender) -> PlaybackResult<SilentSink> {
            Ok(SilentSink)
        }

        async fn await_recovery(&self, _link: &(), _window: Duration) -> bool {
            true
        }

        async fn destroy(&self, _link: ()) -> PlaybackResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl AudioSink for SilentSink {
        async fn play(&self, _track: &Track) -> PlaybackResult<PlaybackId> {
            Ok(PlaybackId(1))
        }

        async fn pause(&self) -> PlaybackResult<()> {
            Ok(())
        }

        async fn unpause(&self) -> PlaybackResult<()> {
            Ok(())
        }

        async fn detach(&self) {}
    }

    fn player() -> GuildPlayer<SilentVoice> {
        let mut library = MockTrackLibrary::new();
        library
            .expect_resolve()
            .returning(|path: &Path| Ok(Track::from_path(path)));
        let (tx, _rx) = flume::unbounded();

        GuildPlayer {
            controller: Arc::new(Mutex::new(PlaybackController::new(
                GuildId::new(1),
                Arc::new(SilentVoice),
                Arc::new(library),
                tx,
                ControllerSettings::default(),
            ))),
            panel: Arc::new(Mutex::new(ControlPanel::new(
                Arc::new(MockControlSurface::new()),
                None,
            ))),
        }
    }

    async fn start(player: &GuildPlayer<SilentVoice>) {
        let mut controller = player.controller.lock().await;
        let tracks = ["a", "b", "c"]
            .iter()
            .map(|n| Track::from_path(format!("/m/{n}.mp3")))
            .collect();
        controller.enqueue(tracks, true).await.unwrap();
        controller
            .ensure_session(VoiceTarget {
                guild_id: GuildId::new(1),
                channel_id: ChannelId::new(2),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn skipping_without_a_session_is_not_playing() {
        let player = player();

        let err = apply_action(&player, ControlAction::Next).await.unwrap_err();
        assert!(matches!(err, PlaybackError::NotPlaying));
    }

    #[tokio::test]
    async fn pause_button_toggles() {
        let player = player();
        start(&player).await;

        let paused = apply_action(&player, ControlAction::PauseResume).await.unwrap();
        assert!(paused.paused);

        let resumed = apply_action(&player, ControlAction::PauseResume).await.unwrap();
        assert!(!resumed.paused);
    }

    #[tokio::test]
    async fn next_and_previous_buttons_move_the_pointer() {
        let player = player();
        start(&player).await;

        let next = apply_action(&player, ControlAction::Next).await.unwrap();
        assert_eq!(next.position, Some(1));

        let back = apply_action(&player, ControlAction::Previous).await.unwrap();
        assert_eq!(back.position, Some(0));
    }

    #[tokio::test]
    async fn mode_buttons_flip_flags() {
        let player = player();
        start(&player).await;

        let looping = apply_action(&player, ControlAction::Loop).await.unwrap();
        assert!(looping.flags.looping);

        let shuffled = apply_action(&player, ControlAction::Shuffle).await.unwrap();
        assert!(shuffled.flags.shuffling);
        assert_eq!(shuffled.position, Some(0));
    }

    #[tokio::test]
    async fn bare_play_resumes_a_paused_session() {
        let player = player();
        start(&player).await;
        apply_action(&player, ControlAction::Next).await.unwrap();
        player.controller.lock().await.pause().await.unwrap();

        let text = resume_running(&player).await.unwrap();

        assert_eq!(text, Some("▶️ Resumed"));
        let snapshot = player.controller.lock().await.snapshot();
        assert!(!snapshot.paused);
        assert_eq!(snapshot.position, Some(1));
    }

    #[tokio::test]
    async fn bare_play_leaves_running_playback_alone() {
        let player = player();
        start(&player).await;
        apply_action(&player, ControlAction::Next).await.unwrap();

        let text = resume_running(&player).await.unwrap();

        assert_eq!(text, Some("▶️ Playback is already running"));
        assert_eq!(player.controller.lock().await.snapshot().position, Some(1));
    }

    #[tokio::test]
    async fn bare_play_without_session_starts_over() {
        let player = player();
        assert_eq!(resume_running(&player).await.unwrap(), None);
    }

    #[tokio::test]
    async fn download_into_an_idle_session_starts_playing() {
        let player = player();
        player
            .controller
            .lock()
            .await
            .ensure_session(VoiceTarget {
                guild_id: GuildId::new(1),
                channel_id: ChannelId::new(2),
            })
            .await
            .unwrap();

        let name = queue_download(&player, Track::new("/m/x.mp3", "Fresh Song"))
            .await
            .unwrap();

        assert_eq!(name, "Fresh Song");
        let controller = player.controller.lock().await;
        assert!(controller.playing().is_some());
        assert_eq!(
            controller.snapshot().now_playing_text(),
            "Now playing: Fresh Song"
        );
    }

    #[tokio::test]
    async fn download_while_playing_is_appended() {
        let player = player();
        start(&player).await;

        queue_download(&player, Track::new("/m/x.mp3", "Fresh Song"))
            .await
            .unwrap();

        let snapshot = player.controller.lock().await.snapshot();
        assert_eq!(snapshot.len, 4);
        assert_eq!(snapshot.position, Some(0));
        assert_eq!(snapshot.current.map(|t| t.name().to_string()), Some("a.mp3".into()));
    }

    #[test]
    fn listing_is_numbered_from_one() {
        let tracks = vec![Track::from_path("/m/a.mp3"), Track::from_path("/m/b.mp3")];

        assert_eq!(
            library_listing(&tracks),
            "📜 **Music library** (2 tracks)\n1. a.mp3\n2. b.mp3\n"
        );
        assert_eq!(library_listing(&[]), "📭 The music library is empty");
    }

    #[test]
    fn selector_labels() {
        assert_eq!(selector_label(&TrackSelector::Number(4)), "4");
        assert_eq!(selector_label(&TrackSelector::Name("intro".into())), "intro");
    }
}
