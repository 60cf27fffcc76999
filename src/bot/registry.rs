use dashmap::DashMap;
use serenity::all::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    audio::{
        controller::{ControllerSettings, PlaybackController},
        link::{Signal, VoiceLink},
    },
    sources::TrackLibrary,
    ui::panel::{ControlPanel, ControlSurface},
};

/// Controller and control panel of one guild.
///
/// The controller lock is never held while the panel is drawn.
pub struct GuildPlayer<V: VoiceLink> {
    pub controller: Arc<Mutex<PlaybackController<V>>>,
    pub panel: Arc<Mutex<ControlPanel>>,
}

impl<V: VoiceLink> GuildPlayer<V> {
    /// Redraws the panel from the controller's current state.
    pub async fn refresh_panel(&self) {
        let snapshot = self.controller.lock().await.snapshot();
        self.panel.lock().await.refresh(&snapshot).await;
    }

    /// The bot was removed from `channel` by someone else.
    pub async fn report_link_lost(&self, channel: ChannelId) {
        let changed = {
            let mut controller = self.controller.lock().await;
            match controller.session_target() {
                Some(target) if target.channel_id == channel => {
                    info!(
                        "🔌 Removed from channel {} in guild {}",
                        channel,
                        controller.guild_id()
                    );
                    controller.teardown().await;
                    true
                }
                _ => false,
            }
        };

        if changed {
            self.refresh_panel().await;
        }
    }
}

/// Lazily created players, one per guild.
pub struct GuildPlayers<V: VoiceLink> {
    players: DashMap<GuildId, Arc<GuildPlayer<V>>>,
    voice: Arc<V>,
    library: Arc<dyn TrackLibrary>,
    surface: Arc<dyn ControlSurface>,
    settings: ControllerSettings,
    panel_channel: Option<ChannelId>,
}

impl<V: VoiceLink> GuildPlayers<V> {
    pub fn new(
        voice: Arc<V>,
        library: Arc<dyn TrackLibrary>,
        surface: Arc<dyn ControlSurface>,
        settings: ControllerSettings,
        panel_channel: Option<ChannelId>,
    ) -> Self {
        Self {
            players: DashMap::new(),
            voice,
            library,
            surface,
            settings,
            panel_channel,
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer<V>>> {
        self.players.get(&guild_id).map(|p| p.clone())
    }

    /// Returns the guild's player, creating it and its signal pump on first use.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildPlayer<V>> {
        self.players
            .entry(guild_id)
            .or_insert_with(|| self.create(guild_id))
            .clone()
    }

    #[cfg(test)]
    pub fn guild_count(&self) -> usize {
        self.players.len()
    }

    fn create(&self, guild_id: GuildId) -> Arc<GuildPlayer<V>> {
        let (tx, rx) = flume::unbounded();
        let controller = PlaybackController::new(
            guild_id,
            self.voice.clone(),
            self.library.clone(),
            tx,
            self.settings.clone(),
        );

        let player = Arc::new(GuildPlayer {
            controller: Arc::new(Mutex::new(controller)),
            panel: Arc::new(Mutex::new(ControlPanel::new(
                self.surface.clone(),
                self.panel_channel,
            ))),
        });

        tokio::spawn(pump_signals(rx, player.clone()));
        debug!("Created player for guild {}", guild_id);
        player
    }
}

/// Feeds session signals to the controller, one at a time.
async fn pump_signals<V: VoiceLink>(rx: flume::Receiver<Signal>, player: Arc<GuildPlayer<V>>) {
    while let Ok(signal) = rx.recv_async().await {
        let (before, after) = {
            let mut controller = player.controller.lock().await;
            let before = controller.snapshot();
            controller.on_signal(signal).await;
            (before, controller.snapshot())
        };

        if before != after {
            player.panel.lock().await.refresh(&after).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            error::PlaybackResult,
            link::{AudioSink, PlaybackId, SessionEvent, SignalSender, VoiceTarget},
        },
        sources::{MockTrackLibrary, Track},
        ui::panel::MockControlSurface,
    };
    use async_trait::async_trait;
    use std::{path::Path, time::Duration};

    /// Plays everything and keeps the last subscribed sender around.
    #[derive(Default)]
    struct EchoVoice {
        sender: parking_lot::Mutex<Option<SignalSender>>,
    }

    struct EchoSink;

    #[async_trait]
    impl VoiceLink for EchoVoice {
        type Link = ();
        type Sink = EchoSink;

        async fn connect(&self, _target: VoiceTarget) -> PlaybackResult<()> {
            Ok(())
        }

        async fn subscribe(&self, _link: &(), signals: SignalSender) -> PlaybackResult<EchoSink> {
            *self.sender.lock() = Some(signals);
            Ok(EchoSink)
        }

        async fn await_recovery(&self, _link: &(), _window: Duration) -> bool {
            false
        }

        async fn destroy(&self, _link: ()) -> PlaybackResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl AudioSink for EchoSink {
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

    fn players(voice: Arc<EchoVoice>) -> GuildPlayers<EchoVoice> {
        let mut library = MockTrackLibrary::new();
        library
            .expect_resolve()
            .returning(|path: &Path| Ok(Track::from_path(path)));
        library.expect_fetch_continuation().returning(Vec::new);

        GuildPlayers::new(
            voice,
            Arc::new(library),
            Arc::new(MockControlSurface::new()),
            ControllerSettings::default(),
            None,
        )
    }

    #[tokio::test]
    async fn one_player_per_guild() {
        let players = players(Arc::new(EchoVoice::default()));

        let a = players.get_or_create(GuildId::new(1));
        let b = players.get_or_create(GuildId::new(1));
        players.get_or_create(GuildId::new(2));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(players.guild_count(), 2);
        assert!(players.get(GuildId::new(3)).is_none());
    }

    #[tokio::test]
    async fn signals_reach_the_controller() {
        let voice = Arc::new(EchoVoice::default());
        let players = players(voice.clone());
        let player = players.get_or_create(GuildId::new(1));

        {
            let mut controller = player.controller.lock().await;
            controller
                .enqueue(vec![Track::from_path("/m/only.mp3")], true)
                .await
                .unwrap();
            controller
                .ensure_session(VoiceTarget {
                    guild_id: GuildId::new(1),
                    channel_id: ChannelId::new(2),
                })
                .await
                .unwrap();
        }

        let sender = voice.sender.lock().clone().unwrap();
        sender.emit(SessionEvent::LinkDestroyed);

        let mut closed = false;
        for _ in 0..50 {
            if !player.controller.lock().await.has_session() {
                closed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(closed, "session should close after the link is destroyed");
    }

    #[tokio::test]
    async fn link_loss_only_counts_for_the_session_channel() {
        let voice = Arc::new(EchoVoice::default());
        let players = players(voice);
        let player = players.get_or_create(GuildId::new(1));

        {
            let mut controller = player.controller.lock().await;
            controller
                .enqueue(vec![Track::from_path("/m/only.mp3")], true)
                .await
                .unwrap();
            controller
                .ensure_session(VoiceTarget {
                    guild_id: GuildId::new(1),
                    channel_id: ChannelId::new(2),
                })
                .await
                .unwrap();
        }

        player.report_link_lost(ChannelId::new(7)).await;
        assert!(player.controller.lock().await.has_session());

        player.report_link_lost(ChannelId::new(2)).await;
        assert!(!player.controller.lock().await.has_session());
    }
}
