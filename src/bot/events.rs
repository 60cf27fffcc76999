use serenity::async_trait;
use songbird::{
    events::{
        context_data::{DisconnectKind, DisconnectReason},
        CoreEvent,
    },
    Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::audio::{
    link::{PlaybackId, SessionEvent, SignalSender},
    player::LinkState,
};

/// Turns track end and error events into session signals.
pub struct TrackSignalForwarder {
    signals: SignalSender,
    failed: bool,
}

#[async_trait]
impl VoiceEventHandler for TrackSignalForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if let EventContext::Track(track_list) = ctx {
            for (state, handle) in *track_list {
                let id = PlaybackId(handle.uuid().as_u128());
                if self.failed {
                    self.signals.emit(SessionEvent::TrackError {
                        id,
                        reason: format!("{:?}", state.playing),
                    });
                } else {
                    self.signals.emit(SessionEvent::TrackIdle(id));
                }
            }
        }

        None
    }
}

/// Keeps the link state current and reports driver changes as signals.
pub struct DriverSignalForwarder {
    signals: SignalSender,
    state: Arc<watch::Sender<LinkState>>,
}

#[async_trait]
impl VoiceEventHandler for DriverSignalForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        match ctx {
            EventContext::DriverConnect(_) | EventContext::DriverReconnect(_) => {
                debug!("🔗 Voice driver up (session {:?})", self.signals.session());
                self.state.send_replace(LinkState::Connected);
                self.signals.emit(SessionEvent::LinkConnected);
            }
            EventContext::DriverDisconnect(data) => {
                let (state, event) = classify_disconnect(&data.kind, data.reason.as_ref());
                if let Some(reason) = &data.reason {
                    warn!("🔌 Voice driver disconnected ({:?}): {:?}", data.kind, reason);
                }
                self.state.send_replace(state);
                self.signals.emit(event);
            }
            _ => {}
        }

        None
    }
}

/// Maps a driver disconnect onto the link state and the signal to emit.
///
/// No reason, or a requested one, means the call was left on purpose. A live
/// connection that drops may still come back. A failed (re)connect is final:
/// songbird only reports it once its retries are exhausted.
fn classify_disconnect(
    kind: &DisconnectKind,
    reason: Option<&DisconnectReason>,
) -> (LinkState, SessionEvent) {
    match reason {
        None | Some(DisconnectReason::Requested) => {
            (LinkState::Gone, SessionEvent::LinkDestroyed)
        }
        Some(_) if matches!(kind, DisconnectKind::Runtime) => {
            (LinkState::Dropped, SessionEvent::LinkDisconnected)
        }
        Some(reason) => (
            LinkState::Gone,
            SessionEvent::LinkError(format!("{:?} attempt failed: {:?}", kind, reason)),
        ),
    }
}

/// Registers every forwarder a session needs on `call`.
pub fn register_voice_events(
    call: &mut songbird::Call,
    signals: SignalSender,
    state: Arc<watch::Sender<LinkState>>,
) {
    call.add_global_event(
        VoiceEvent::Track(TrackEvent::End),
        TrackSignalForwarder {
            signals: signals.clone(),
            failed: false,
        },
    );

    call.add_global_event(
        VoiceEvent::Track(TrackEvent::Error),
        TrackSignalForwarder {
            signals: signals.clone(),
            failed: true,
        },
    );

    for event in [
        CoreEvent::DriverConnect,
        CoreEvent::DriverReconnect,
        CoreEvent::DriverDisconnect,
    ] {
        call.add_global_event(
            VoiceEvent::Core(event),
            DriverSignalForwarder {
                signals: signals.clone(),
                state: state.clone(),
            },
        );
    }
}
