use rand::{rngs::StdRng, SeedableRng};
use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        error::{PlaybackError, PlaybackResult},
        link::{
            AudioSink, PlaybackId, SessionEvent, SessionId, Signal, SignalSender, VoiceLink,
            VoiceTarget,
        },
        queue::Queue,
    },
    sources::{Track, TrackLibrary},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeFlags {
    /// Replay the current track when it ends.
    pub looping: bool,
    /// Draw the next track at random, without replacement.
    pub shuffling: bool,
    /// Keep the session alive and fetch more tracks when the queue runs dry.
    pub autoplaying: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceReason {
    EndedNormally,
    EndedWithError,
    SkippedForward,
    SkippedBackward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Created,
    Reused,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub max_queue_size: usize,
    pub reconnect_window: Duration,
    pub autoplay: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            reconnect_window: Duration::from_secs(5),
            autoplay: false,
        }
    }
}

/// Read-only view of a guild's player, for replies and the control panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub current: Option<Track>,
    pub position: Option<usize>,
    pub len: usize,
    pub flags: ModeFlags,
    pub paused: bool,
    pub connected: bool,
}

impl PlayerSnapshot {
    pub fn now_playing_text(&self) -> String {
        match (&self.current, self.connected) {
            (Some(track), true) if self.paused => format!("Paused: {}", track.name()),
            (Some(track), true) => format!("Now playing: {}", track.name()),
            _ => "No music is currently playing.".to_string(),
        }
    }
}

struct Session<V: VoiceLink> {
    id: SessionId,
    target: VoiceTarget,
    link: V::Link,
    sink: V::Sink,
    playing: Option<PlaybackId>,
}

/// Queue, mode flags and session of one guild.
///
/// Every transition takes `&mut self`; the owner serializes access (one lock
/// per guild) so nothing in here needs its own synchronization.
pub struct PlaybackController<V: VoiceLink> {
    guild_id: GuildId,
    voice: Arc<V>,
    library: Arc<dyn TrackLibrary>,
    signals: flume::Sender<Signal>,
    settings: ControllerSettings,
    queue: Queue,
    flags: ModeFlags,
    session: Option<Session<V>>,
    paused: bool,
    continuation_pending: bool,
    consecutive_failures: usize,
    next_session: u64,
    rng: StdRng,
}

impl<V: VoiceLink> PlaybackController<V> {
    pub fn new(
        guild_id: GuildId,
        voice: Arc<V>,
        library: Arc<dyn TrackLibrary>,
        signals: flume::Sender<Signal>,
        settings: ControllerSettings,
    ) -> Self {
        let flags = ModeFlags {
            autoplaying: settings.autoplay,
            ..ModeFlags::default()
        };

        Self {
            guild_id,
            voice,
            library,
            signals,
            settings,
            queue: Queue::new(),
            flags,
            session: None,
            paused: false,
            continuation_pending: false,
            consecutive_failures: 0,
            next_session: 0,
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    #[cfg(test)]
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn flags(&self) -> ModeFlags {
        self.flags
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    #[cfg(test)]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn session_target(&self) -> Option<VoiceTarget> {
        self.session.as_ref().map(|s| s.target)
    }

    pub fn playing(&self) -> Option<PlaybackId> {
        self.session.as_ref().and_then(|s| s.playing)
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            current: self.queue.current().cloned(),
            position: self.queue.position(),
            len: self.queue.len(),
            flags: self.flags,
            paused: self.paused,
            connected: self.session.is_some(),
        }
    }

    /// Resolves and queues `tracks`, replacing the queue when `replace` is set.
    ///
    /// Nothing changes unless every track resolves. Returns how many tracks
    /// were added.
    pub async fn enqueue(&mut self, tracks: Vec<Track>, replace: bool) -> PlaybackResult<usize> {
        let base = if replace { 0 } else { self.queue.len() };
        if base + tracks.len() > self.settings.max_queue_size {
            return Err(PlaybackError::QueueFull(self.settings.max_queue_size));
        }

        let mut resolved = Vec::with_capacity(tracks.len());
        for track in &tracks {
            let reference = track.reference().display().to_string();
            let found = self.library.resolve(track.reference()).await.map_err(|e| {
                warn!("🚫 Could not resolve {}: {}", reference, e);
                PlaybackError::InvalidTrack(reference.clone())
            })?;
            resolved.push(Track::new(found.reference(), track.name()));
        }

        let added = resolved.len();
        if replace {
            self.queue.replace(resolved);
            self.consecutive_failures = 0;
        } else {
            self.queue.extend(resolved);
        }

        info!(
            "➕ Queued {} track(s) in guild {} (replace: {}, total: {})",
            added,
            self.guild_id,
            replace,
            self.queue.len()
        );
        Ok(added)
    }

    /// Moves the pointer to `index` without touching the sink.
    pub fn select(&mut self, index: usize) -> PlaybackResult<()> {
        if self.queue.select(index) {
            Ok(())
        } else {
            Err(PlaybackError::InvalidTrack((index + 1).to_string()))
        }
    }

    /// Returns the guild's session, opening one if there is none.
    ///
    /// A fresh session starts playing right away when the queue has tracks.
    pub async fn ensure_session(&mut self, target: VoiceTarget) -> PlaybackResult<SessionOutcome> {
        if let Some(session) = &self.session {
            debug!(
                "{} (guild {}, session {:?})",
                PlaybackError::SessionAlreadyActive,
                self.guild_id,
                session.id
            );
            return Ok(SessionOutcome::Reused);
        }

        let link = self.voice.connect(target).await?;
        let id = SessionId(self.next_session);
        self.next_session += 1;

        let sink = match self
            .voice
            .subscribe(&link, SignalSender::new(id, self.signals.clone()))
            .await
        {
            Ok(sink) => sink,
            Err(e) => {
                warn!("❌ Could not subscribe a sink in guild {}: {}", self.guild_id, e);
                if let Err(destroy_err) = self.voice.destroy(link).await {
                    warn!("Error destroying half-open link: {}", destroy_err);
                }
                return Err(e);
            }
        };

        info!(
            "🔊 Session {:?} opened in guild {} (channel {})",
            id, self.guild_id, target.channel_id
        );
        self.session = Some(Session {
            id,
            target,
            link,
            sink,
            playing: None,
        });
        self.paused = false;

        self.play_current().await;
        Ok(SessionOutcome::Created)
    }

    /// Like [`ensure_session`](Self::ensure_session), but moves an existing
    /// session to another channel.
    pub async fn relocate(&mut self, target: VoiceTarget) -> PlaybackResult<SessionOutcome> {
        if let Some(current) = self.session_target() {
            if current.channel_id == target.channel_id {
                return Ok(SessionOutcome::Reused);
            }
            info!(
                "🚚 Moving guild {} from channel {} to {}",
                self.guild_id, current.channel_id, target.channel_id
            );
            self.teardown().await;
        }

        self.ensure_session(target).await
    }

    /// Submits the track under the pointer. Without a session or tracks this
    /// does nothing.
    pub async fn play_current(&mut self) {
        self.submit_current(Direction::Forward).await;
    }

    /// Like [`play_current`](Self::play_current); a track that cannot be
    /// submitted is passed over in `direction`.
    async fn submit_current(&mut self, direction: Direction) {
        loop {
            let (Some(session), Some(track)) = (self.session.as_mut(), self.queue.current()) else {
                return;
            };

            match session.sink.play(track).await {
                Ok(id) => {
                    info!("🎵 Now playing in guild {}: {}", self.guild_id, track.name());
                    session.playing = Some(id);
                    self.paused = false;
                    return;
                }
                Err(e) => {
                    warn!("❌ Could not start {}: {}", track.name(), e);
                    session.playing = None;
                    if !self.note_failure().await {
                        return;
                    }
                    self.step_past_failure(direction);
                }
            }
        }
    }

    /// Moves the pointer after a track ended, failed or was skipped, starts
    /// whatever is current afterwards and releases an idle session.
    pub async fn advance(&mut self, reason: AdvanceReason) {
        debug!("Advancing guild {} ({:?})", self.guild_id, reason);

        match reason {
            AdvanceReason::EndedNormally if self.flags.looping => {
                self.consecutive_failures = 0;
                debug!("🔂 Repeating current track in guild {}", self.guild_id);
            }
            AdvanceReason::EndedNormally | AdvanceReason::EndedWithError => {
                if reason == AdvanceReason::EndedWithError {
                    if !self.note_failure().await {
                        return;
                    }
                } else {
                    self.consecutive_failures = 0;
                }

                if !self.queue.is_empty() {
                    if reason == AdvanceReason::EndedWithError {
                        self.step_past_failure(Direction::Forward);
                    } else {
                        self.step_forward();
                    }
                } else if self.flags.autoplaying && !self.continue_with_fetched().await {
                    info!("📭 Nothing to continue with in guild {}", self.guild_id);
                    self.teardown().await;
                    return;
                }
            }
            AdvanceReason::SkippedForward => {
                self.consecutive_failures = 0;
                self.step_forward();
            }
            AdvanceReason::SkippedBackward => {
                self.consecutive_failures = 0;
                self.queue.step_backward();
            }
        }

        let direction = if reason == AdvanceReason::SkippedBackward {
            Direction::Backward
        } else {
            Direction::Forward
        };
        self.submit_current(direction).await;
        self.teardown_if_idle().await;
    }

    /// Returns whether playback state changed.
    pub async fn pause(&mut self) -> PlaybackResult<bool> {
        let session = self.session.as_ref().ok_or(PlaybackError::NotPlaying)?;
        if self.paused {
            return Ok(false);
        }

        session.sink.pause().await?;
        self.paused = true;
        info!("⏸️ Playback paused in guild {}", self.guild_id);
        Ok(true)
    }

    /// Returns whether playback state changed.
    pub async fn resume(&mut self) -> PlaybackResult<bool> {
        let session = self.session.as_ref().ok_or(PlaybackError::NotPlaying)?;
        if !self.paused {
            return Ok(false);
        }

        session.sink.unpause().await?;
        self.paused = false;
        info!("▶️ Playback resumed in guild {}", self.guild_id);
        Ok(true)
    }

    pub fn shuffle(&mut self, on: bool) {
        self.flags.shuffling = on;
        if on {
            self.queue.shuffle_tail(&mut self.rng);
            info!("🔀 Shuffle enabled in guild {}", self.guild_id);
        } else {
            self.queue.restart_cycle();
            info!("➡️ Shuffle disabled in guild {}", self.guild_id);
        }
    }

    pub fn set_looping(&mut self, on: bool) {
        self.flags.looping = on;
        info!("🔁 Looping {} in guild {}", on_off(on), self.guild_id);
    }

    pub fn set_autoplay(&mut self, on: bool) {
        self.flags.autoplaying = on;
        info!("📻 Autoplay {} in guild {}", on_off(on), self.guild_id);
    }

    /// Releases the session when there is nothing left to play and nothing
    /// coming. Returns whether it did.
    pub async fn teardown_if_idle(&mut self) -> bool {
        if self.session.is_none()
            || !self.queue.is_empty()
            || self.flags.autoplaying
            || self.continuation_pending
        {
            return false;
        }

        info!("📭 Queue empty, leaving voice in guild {}", self.guild_id);
        self.teardown().await;
        true
    }

    /// Detaches the sink, then destroys the link.
    pub async fn teardown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        session.sink.detach().await;
        if let Err(e) = self.voice.destroy(session.link).await {
            warn!("Error destroying voice link in guild {}: {}", self.guild_id, e);
        }

        self.paused = false;
        self.consecutive_failures = 0;
        info!("👋 Session {:?} closed in guild {}", session.id, self.guild_id);
    }

    /// Clears the queue and leaves.
    pub async fn stop(&mut self) {
        self.queue.clear();
        self.teardown().await;
        info!("⏹️ Playback stopped in guild {}", self.guild_id);
    }

    pub async fn on_signal(&mut self, signal: Signal) {
        let Some((current, playing)) = self.session.as_ref().map(|s| (s.id, s.playing)) else {
            debug!("Ignoring {:?}: no session in guild {}", signal.event, self.guild_id);
            return;
        };

        if signal.session != current {
            debug!("Ignoring stale signal from session {:?}", signal.session);
            return;
        }

        match signal.event {
            SessionEvent::TrackIdle(id) if playing == Some(id) => {
                self.clear_playing();
                self.advance(AdvanceReason::EndedNormally).await;
            }
            SessionEvent::TrackError { id, reason } if playing == Some(id) => {
                warn!("{} (guild {})", PlaybackError::SinkError(reason), self.guild_id);
                self.clear_playing();
                self.advance(AdvanceReason::EndedWithError).await;
            }
            SessionEvent::TrackIdle(_) | SessionEvent::TrackError { .. } => {
                debug!("Ignoring signal for a replaced track in guild {}", self.guild_id);
            }
            SessionEvent::LinkConnected => {
                info!("🔗 Voice link up in guild {}", self.guild_id);
            }
            SessionEvent::LinkDisconnected => self.on_link_disconnected().await,
            SessionEvent::LinkDestroyed => {
                warn!("🔌 Voice link destroyed in guild {}", self.guild_id);
                self.teardown().await;
            }
            SessionEvent::LinkError(reason) => {
                error!("⚠️ Voice link failed in guild {}: {}", self.guild_id, reason);
                self.teardown().await;
            }
        }
    }

    /// Gives a dropped link a bounded window to recover before tearing down.
    pub async fn on_link_disconnected(&mut self) {
        let window = self.settings.reconnect_window;
        let Some(session) = &self.session else {
            return;
        };

        warn!(
            "⚠️ Voice link dropped in guild {}, waiting up to {} for recovery",
            self.guild_id,
            humantime::format_duration(window)
        );

        if self.voice.await_recovery(&session.link, window).await {
            info!("✅ Voice link recovered in guild {}", self.guild_id);
            return;
        }

        let reason = format!("no recovery within {}", humantime::format_duration(window));
        error!("{} (guild {})", PlaybackError::LinkDisconnected(reason), self.guild_id);
        self.teardown().await;
    }

    fn step_forward(&mut self) {
        if self.flags.shuffling {
            self.queue.draw_shuffled(&mut self.rng);
        } else {
            self.queue.step_forward();
        }
    }

    /// Moves off a failing track without picking it again.
    fn step_past_failure(&mut self, direction: Direction) {
        if direction == Direction::Backward {
            self.queue.step_backward();
            return;
        }

        let failed = self.queue.position();
        self.step_forward();
        if self.queue.len() > 1 && self.queue.position() == failed {
            self.queue.step_forward();
        }
    }

    /// Counts a failed track. Once every track of the queue failed in a row
    /// the session is released and this returns false.
    async fn note_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        if self.consecutive_failures < self.queue.len() {
            return true;
        }

        error!(
            "❌ All {} track(s) failed in a row in guild {}, giving up",
            self.consecutive_failures, self.guild_id
        );
        self.teardown().await;
        false
    }

    async fn continue_with_fetched(&mut self) -> bool {
        self.continuation_pending = true;
        let fetched = self.library.fetch_continuation().await;
        self.continuation_pending = false;

        if fetched.is_empty() {
            return false;
        }

        let room = self.settings.max_queue_size.saturating_sub(self.queue.len());
        let fetched: Vec<Track> = fetched.into_iter().take(room).collect();
        info!("📻 Autoplay added {} track(s) in guild {}", fetched.len(), self.guild_id);
        self.queue.extend(fetched);
        !self.queue.is_empty()
    }

    fn clear_playing(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.playing = None;
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "enabled"
    } else {
        "disabled"
    }
}
