use async_trait::async_trait;
use serenity::model::id::GuildId;
use songbird::{input::File, tracks::TrackHandle, Call, Songbird};
use std::{sync::Arc, time::Duration};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        error::{PlaybackError, PlaybackResult},
        link::{AudioSink, PlaybackId, SignalSender, VoiceLink, VoiceTarget},
    },
    bot::events::register_voice_events,
    sources::Track,
};

/// Driver state as last reported by songbird.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Dropped,
    Gone,
}

/// [`VoiceLink`] backed by the songbird manager registered with serenity.
pub struct SongbirdLink {
    manager: Arc<Songbird>,
    volume: f32,
}

impl SongbirdLink {
    pub fn new(manager: Arc<Songbird>, volume: f32) -> Self {
        Self {
            manager,
            volume: volume.clamp(0.0, 2.0),
        }
    }
}

/// A joined call plus the driver state its forwarders keep current.
pub struct SongbirdCall {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    state: Arc<watch::Sender<LinkState>>,
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    type Link = SongbirdCall;
    type Sink = SongbirdSink;

    async fn connect(&self, target: VoiceTarget) -> PlaybackResult<SongbirdCall> {
        info!(
            "🔗 Connecting to channel {} in guild {}",
            target.channel_id, target.guild_id
        );

        let call = match self.manager.join(target.guild_id, target.channel_id).await {
            Ok(call) => call,
            Err(e) => {
                if let Err(remove_err) = self.manager.remove(target.guild_id).await {
                    debug!("Nothing to clean up after failed join: {:?}", remove_err);
                }
                return Err(PlaybackError::LinkDisconnected(format!(
                    "could not join channel {}: {:?}",
                    target.channel_id, e
                )));
            }
        };

        let (state, _) = watch::channel(LinkState::Connected);
        Ok(SongbirdCall {
            guild_id: target.guild_id,
            call,
            state: Arc::new(state),
        })
    }

    async fn subscribe(
        &self,
        link: &SongbirdCall,
        signals: SignalSender,
    ) -> PlaybackResult<SongbirdSink> {
        {
            let mut call = link.call.lock().await;
            call.remove_all_global_events();
            register_voice_events(&mut call, signals, link.state.clone());
        }

        debug!("Voice events registered for guild {}", link.guild_id);
        Ok(SongbirdSink {
            call: link.call.clone(),
            current: parking_lot::Mutex::new(None),
            volume: self.volume,
        })
    }

    async fn await_recovery(&self, link: &SongbirdCall, window: Duration) -> bool {
        let mut state = link.state.subscribe();
        let recovered = match tokio::time::timeout(window, state.wait_for(|s| *s != LinkState::Dropped)).await {
            Ok(Ok(s)) => *s == LinkState::Connected,
            _ => false,
        };
        recovered
    }

    async fn destroy(&self, link: SongbirdCall) -> PlaybackResult<()> {
        link.state.send_replace(LinkState::Gone);

        if self.manager.get(link.guild_id).is_none() {
            return Ok(());
        }

        self.manager
            .remove(link.guild_id)
            .await
            .map_err(|e| PlaybackError::LinkDisconnected(format!("{:?}", e)))?;

        info!("👋 Left voice in guild {}", link.guild_id);
        Ok(())
    }
}

/// Plays local files on a call, one at a time.
pub struct SongbirdSink {
    call: Arc<Mutex<Call>>,
    current: parking_lot::Mutex<Option<TrackHandle>>,
    volume: f32,
}

impl SongbirdSink {
    fn current(&self) -> PlaybackResult<TrackHandle> {
        self.current.lock().clone().ok_or(PlaybackError::NotPlaying)
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn play(&self, track: &Track) -> PlaybackResult<PlaybackId> {
        let path = track.reference().to_path_buf();
        tokio::fs::metadata(&path)
            .await
            .map_err(|e| PlaybackError::SinkError(format!("{}: {}", path.display(), e)))?;

        if let Some(previous) = self.current.lock().take() {
            let _ = previous.stop();
        }

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(File::new(path).into())
        };

        if let Err(e) = handle.set_volume(self.volume) {
            warn!("Could not set volume: {:?}", e);
        }

        let id = PlaybackId(handle.uuid().as_u128());
        *self.current.lock() = Some(handle);
        Ok(id)
    }

    async fn pause(&self) -> PlaybackResult<()> {
        self.current()?
            .pause()
            .map_err(|e| PlaybackError::SinkError(format!("{:?}", e)))
    }

    async fn unpause(&self) -> PlaybackResult<()> {
        self.current()?
            .play()
            .map_err(|e| PlaybackError::SinkError(format!("{:?}", e)))
    }

    async fn detach(&self) {
        self.current.lock().take();

        let mut call = self.call.lock().await;
        call.remove_all_global_events();
        call.stop();
    }
}
