pub mod download;
pub mod library;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::audio::error::PlaybackResult;

pub use download::Downloader;
pub use library::LocalLibrary;

/// One playable item: a file the sink can open plus the name users see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    reference: PathBuf,
    name: String,
}

impl Track {
    pub fn new(reference: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            name: name.into(),
        }
    }

    /// Uses the file name as display name.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self::new(path, name)
    }

    pub fn reference(&self) -> &Path {
        &self.reference
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// How a user points at a track of the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSelector {
    /// 1-based, as printed by `list`.
    Number(usize),
    Name(String),
}

/// Where playable tracks come from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackLibrary: Send + Sync {
    /// Everything that can be played, in listing order.
    async fn list_available(&self) -> PlaybackResult<Vec<Track>>;

    /// Checks that `reference` points at something playable.
    async fn resolve(&self, reference: &Path) -> PlaybackResult<Track>;

    /// More tracks for autoplay once the queue is exhausted. Empty when the
    /// library has nothing to offer.
    async fn fetch_continuation(&self) -> Vec<Track>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_is_the_file_name() {
        let track = Track::from_path("/srv/music/Intro Theme.mp3");
        assert_eq!(track.name(), "Intro Theme.mp3");
        assert_eq!(track.reference(), Path::new("/srv/music/Intro Theme.mp3"));
    }

    #[test]
    fn explicit_names_are_kept() {
        let track = Track::new("/tmp/x.mp3", "Downloaded song");
        assert_eq!(track.name(), "Downloaded song");
    }
}
