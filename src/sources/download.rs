use async_process::{Command, Stdio};
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::audio::error::{PlaybackError, PlaybackResult};

static YOUTUBE_URL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.)?(youtube\.com/(watch\?v=|embed/|v/)|youtu\.be/|music\.youtube\.com/)",
    )
    .ok()
});

/// What yt-dlp reports once the audio has been extracted and moved.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadedMedia {
    pub title: String,
    pub filepath: PathBuf,
}

/// Fetches audio from a URL into the music folder with `yt-dlp`.
#[derive(Debug, Clone)]
pub struct Downloader {
    output_dir: PathBuf,
    timeout: Duration,
}

impl Downloader {
    pub fn new(output_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            output_dir: output_dir.into(),
            timeout,
        }
    }

    pub fn is_youtube_url(url: &str) -> bool {
        YOUTUBE_URL
            .as_ref()
            .map(|re| re.is_match(url))
            .unwrap_or(false)
    }

    /// Only http(s) URLs are handed to yt-dlp.
    pub fn validate_url(raw: &str) -> PlaybackResult<Url> {
        let url = Url::parse(raw)
            .map_err(|e| PlaybackError::Download(format!("invalid URL `{}`: {}", raw, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(PlaybackError::Download(format!(
                "unsupported scheme `{}`",
                other
            ))),
        }
    }

    fn args(&self, url: &Url) -> Vec<String> {
        let template = self.output_dir.join("%(title)s.%(ext)s");

        vec![
            "-x".into(),
            "--audio-format".into(),
            "mp3".into(),
            "--no-playlist".into(),
            "--no-progress".into(),
            "--quiet".into(),
            "--no-simulate".into(),
            "-o".into(),
            template.display().to_string(),
            "--print".into(),
            "after_move:%(.{title,filepath})j".into(),
            url.to_string(),
        ]
    }

    /// Downloads and converts `raw` to mp3, returning where the file landed.
    pub async fn download(&self, raw: &str) -> PlaybackResult<DownloadedMedia> {
        let url = Self::validate_url(raw)?;
        if !Self::is_youtube_url(url.as_str()) {
            warn!("⚠️ Not a YouTube URL, letting yt-dlp try anyway: {}", url);
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| PlaybackError::Download(format!("{}: {}", self.output_dir.display(), e)))?;

        info!("⬇️ Downloading {}", url);

        let job = Command::new("yt-dlp")
            .args(self.args(&url))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, job)
            .await
            .map_err(|_| {
                PlaybackError::Download(format!(
                    "timed out after {}",
                    humantime::format_duration(self.timeout)
                ))
            })?
            .map_err(|e| PlaybackError::Download(format!("could not run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlaybackError::Download(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let media = parse_download_output(&String::from_utf8_lossy(&output.stdout))?;
        info!("✅ Downloaded \"{}\" to {}", media.title, media.filepath.display());
        Ok(media)
    }
}

/// Picks the last JSON line yt-dlp printed.
pub fn parse_download_output(stdout: &str) -> PlaybackResult<DownloadedMedia> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| match serde_json::from_str::<DownloadedMedia>(line) {
            Ok(media) => Some(media),
            Err(e) => {
                debug!("Skipping unparsable yt-dlp line: {}", e);
                None
            }
        })
        .ok_or_else(|| PlaybackError::Download("yt-dlp did not report a file".into()))
}
