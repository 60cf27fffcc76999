//! Contracts between the playback core and the voice stack.
//!
//! The controller never talks to songbird directly. It connects a
//! [`VoiceLink`], subscribes an [`AudioSink`] to it and receives everything
//! the sink or the link has to say as [`Signal`]s through a channel.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;
use tracing::debug;

use crate::{audio::error::PlaybackResult, sources::Track};

/// Where a session should be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceTarget {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Identifies one session of a guild. Signals from older sessions are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Identifies one submission to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackId(pub u128);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TrackIdle(PlaybackId),
    TrackError { id: PlaybackId, reason: String },
    LinkConnected,
    LinkDisconnected,
    LinkDestroyed,
    LinkError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub session: SessionId,
    pub event: SessionEvent,
}

/// Handed to the voice stack on subscribe; tags every event with its session.
#[derive(Debug, Clone)]
pub struct SignalSender {
    session: SessionId,
    tx: flume::Sender<Signal>,
}

impl SignalSender {
    pub fn new(session: SessionId, tx: flume::Sender<Signal>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn emit(&self, event: SessionEvent) {
        let signal = Signal {
            session: self.session,
            event,
        };

        if let Err(flume::SendError(signal)) = self.tx.send(signal) {
            debug!("Signal dropped, guild player is gone: {:?}", signal.event);
        }
    }
}

/// Accepts one track at a time and reports completion through the
/// [`SignalSender`] it was subscribed with.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Replaces whatever is playing with `track`.
    async fn play(&self, track: &Track) -> PlaybackResult<PlaybackId>;

    async fn pause(&self) -> PlaybackResult<()>;

    async fn unpause(&self) -> PlaybackResult<()>;

    /// Stops output and drops every event subscription.
    async fn detach(&self);
}

#[async_trait]
pub trait VoiceLink: Send + Sync + 'static {
    type Link: Send + Sync;
    type Sink: AudioSink;

    async fn connect(&self, target: VoiceTarget) -> PlaybackResult<Self::Link>;

    /// Creates the sink for `link`; sink and link events go to `signals`.
    async fn subscribe(&self, link: &Self::Link, signals: SignalSender) -> PlaybackResult<Self::Sink>;

    /// Waits up to `window` for a dropped link to come back.
    async fn await_recovery(&self, link: &Self::Link, window: Duration) -> bool;

    async fn destroy(&self, link: Self::Link) -> PlaybackResult<()>;
}
