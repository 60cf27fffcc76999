use thiserror::Error;

/// Errors raised by the playback core and its collaborators.
///
/// Only some of them ever reach a user: `InvalidTrack`, `NotPlaying`,
/// `QueueFull`, `Library` and `Download` are replied to whoever issued the
/// command.
/// The rest are logged and contained to the guild's session.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Track not found: {0}")]
    InvalidTrack(String),

    #[error("No music is currently playing")]
    NotPlaying,

    #[error("The queue is full (max {0} tracks)")]
    QueueFull(usize),

    #[error("Audio sink error: {0}")]
    SinkError(String),

    #[error("Voice link disconnected: {0}")]
    LinkDisconnected(String),

    /// Internal guard, never shown to users.
    #[error("A playback session is already active for this guild")]
    SessionAlreadyActive,

    #[error("Music library unavailable: {0}")]
    Library(String),

    #[error("Download failed: {0}")]
    Download(String),
}

impl PlaybackError {
    /// Whether the error is worth replying to the command issuer.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidTrack(_)
                | Self::NotPlaying
                | Self::QueueFull(_)
                | Self::Library(_)
                | Self::Download(_)
        )
    }
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_not_user_facing() {
        assert!(PlaybackError::NotPlaying.is_user_facing());
        assert!(PlaybackError::InvalidTrack("7".into()).is_user_facing());
        assert!(!PlaybackError::SessionAlreadyActive.is_user_facing());
        assert!(!PlaybackError::SinkError("decode".into()).is_user_facing());
    }

    #[test]
    fn messages_name_the_reference() {
        let err = PlaybackError::InvalidTrack("song.mp3".into());
        assert_eq!(err.to_string(), "Track not found: song.mp3");
    }
}
