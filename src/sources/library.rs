use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Track, TrackLibrary, TrackSelector};
use crate::audio::error::{PlaybackError, PlaybackResult};

/// A folder of audio files.
///
/// Listing order is the file name order, which is what `list` numbers and
/// what `play <number>` refers to.
#[derive(Debug, Clone)]
pub struct LocalLibrary {
    root: PathBuf,
    extensions: Vec<String>,
}

impl LocalLibrary {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_playable(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

#[async_trait]
impl TrackLibrary for LocalLibrary {
    async fn list_available(&self) -> PlaybackResult<Vec<Track>> {
        let unavailable = |e: std::io::Error| {
            PlaybackError::Library(format!("{}: {}", self.root.display(), e))
        };

        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(unavailable)?;
        let mut tracks = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && self.is_playable(&path) {
                tracks.push(Track::from_path(path));
            }
        }

        tracks.sort_by(|a, b| a.name().cmp(b.name()));
        debug!("📁 {} playable file(s) in {}", tracks.len(), self.root.display());
        Ok(tracks)
    }

    async fn resolve(&self, reference: &Path) -> PlaybackResult<Track> {
        let path = if reference.is_absolute() {
            reference.to_path_buf()
        } else {
            self.root.join(reference)
        };

        let not_found = || PlaybackError::InvalidTrack(reference.display().to_string());
        let metadata = tokio::fs::metadata(&path).await.map_err(|_| not_found())?;

        if !metadata.is_file() || !self.is_playable(&path) {
            return Err(not_found());
        }

        Ok(Track::from_path(path))
    }

    async fn fetch_continuation(&self) -> Vec<Track> {
        info!("📻 Local library has no continuation source");
        Vec::new()
    }
}

/// Finds the index of the track `selector` points at.
///
/// Names match case-insensitively, first exactly (with or without the
/// extension), then as a substring.
pub fn find_track(tracks: &[Track], selector: &TrackSelector) -> Option<usize> {
    match selector {
        TrackSelector::Number(number) => number
            .checked_sub(1)
            .filter(|index| *index < tracks.len()),
        TrackSelector::Name(query) => {
            let query = query.to_lowercase();
            let exact = tracks.iter().position(|track| {
                let name = track.name().to_lowercase();
                let stem = track
                    .reference()
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_lowercase());
                name == query || stem.as_deref() == Some(query.as_str())
            });

            exact.or_else(|| {
                tracks
                    .iter()
                    .position(|track| track.name().to_lowercase().contains(&query))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn library_in(dir: &Path) -> LocalLibrary {
        LocalLibrary::new(dir, vec!["mp3".to_string()])
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"ID3").unwrap();
    }

    #[tokio::test]
    async fn lists_only_playable_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b-side.mp3");
        touch(dir.path(), "A Song.MP3");
        touch(dir.path(), "cover.jpg");
        std::fs::create_dir(dir.path().join("nested.mp3")).unwrap();

        let tracks = library_in(dir.path()).list_available().await.unwrap();
        let names: Vec<&str> = tracks.iter().map(Track::name).collect();

        assert_eq!(names, vec!["A Song.MP3", "b-side.mp3"]);
    }

    #[tokio::test]
    async fn missing_folder_is_a_library_error() {
        let dir = tempfile::tempdir().unwrap();
        let library = library_in(&dir.path().join("nope"));

        let err = library.list_available().await.unwrap_err();
        assert!(matches!(err, PlaybackError::Library(_)));
    }

    #[tokio::test]
    async fn resolves_relative_and_absolute_references() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "track.mp3");
        let library = library_in(dir.path());

        let relative = library.resolve(Path::new("track.mp3")).await.unwrap();
        let absolute = library.resolve(&dir.path().join("track.mp3")).await.unwrap();

        assert_eq!(relative, absolute);
        assert_eq!(relative.reference(), dir.path().join("track.mp3"));
    }

    #[tokio::test]
    async fn rejects_missing_and_unsupported_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "notes.txt");
        let library = library_in(dir.path());

        assert!(matches!(
            library.resolve(Path::new("ghost.mp3")).await,
            Err(PlaybackError::InvalidTrack(_))
        ));
        assert!(matches!(
            library.resolve(Path::new("notes.txt")).await,
            Err(PlaybackError::InvalidTrack(_))
        ));
    }

    #[tokio::test]
    async fn no_continuation_for_a_folder() {
        let dir = tempfile::tempdir().unwrap();
        assert!(library_in(dir.path()).fetch_continuation().await.is_empty());
    }

    #[test]
    fn finds_by_number_and_name() {
        let tracks: Vec<Track> = ["Alpha.mp3", "beta.mp3", "Gamma Ray.mp3"]
            .iter()
            .map(|n| Track::from_path(format!("/m/{n}")))
            .collect();

        assert_eq!(find_track(&tracks, &TrackSelector::Number(1)), Some(0));
        assert_eq!(find_track(&tracks, &TrackSelector::Number(3)), Some(2));
        assert_eq!(find_track(&tracks, &TrackSelector::Number(0)), None);
        assert_eq!(find_track(&tracks, &TrackSelector::Number(4)), None);
        assert_eq!(find_track(&tracks, &TrackSelector::Name("BETA".into())), Some(1));
        assert_eq!(find_track(&tracks, &TrackSelector::Name("ray".into())), Some(2));
        assert_eq!(find_track(&tracks, &TrackSelector::Name("delta".into())), None);
    }

    #[test]
    fn exact_name_beats_substring() {
        let tracks: Vec<Track> = ["Intro (remix).mp3", "Intro.mp3"]
            .iter()
            .map(|n| Track::from_path(format!("/m/{n}")))
            .collect();

        assert_eq!(find_track(&tracks, &TrackSelector::Name("intro".into())), Some(1));
    }
}
