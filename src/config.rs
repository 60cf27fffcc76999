use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::audio::controller::ControllerSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,
    pub guild_id: Option<u64>,
    pub voice_channel_id: Option<u64>,
    pub text_channel_id: Option<u64>,

    // Library
    pub music_dir: PathBuf,
    pub audio_extensions: Vec<String>,

    // Playback
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub reconnect_window: Duration,
    pub download_timeout: Duration,

    // Features
    pub enable_autoplay: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            command_prefix: var("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),
            guild_id: parse_optional(&var, "GUILD_ID")?,
            voice_channel_id: parse_optional(&var, "VOICE_CHANNEL_ID")?,
            text_channel_id: parse_optional(&var, "TEXT_CHANNEL_ID")?,

            // Library
            music_dir: var("MUSIC_DIR").map(PathBuf::from).unwrap_or(defaults.music_dir),
            audio_extensions: var("AUDIO_EXTENSIONS")
                .map(|raw| {
                    raw.split(',')
                        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
                        .filter(|ext| !ext.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.audio_extensions),

            // Playback
            default_volume: parse_or(&var, "DEFAULT_VOLUME", defaults.default_volume)?,
            max_queue_size: parse_or(&var, "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            reconnect_window: duration_or(&var, "RECONNECT_WINDOW", defaults.reconnect_window)?,
            download_timeout: duration_or(&var, "DOWNLOAD_TIMEOUT", defaults.download_timeout)?,

            // Features
            enable_autoplay: parse_or(&var, "ENABLE_AUTOPLAY", defaults.enable_autoplay)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size and reconnect window must be greater than 0
    /// - At least one audio extension
    /// - `VOICE_CHANNEL_ID` only makes sense together with `GUILD_ID`
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.reconnect_window.is_zero() {
            anyhow::bail!("Reconnect window must be greater than 0");
        }

        if self.audio_extensions.is_empty() {
            anyhow::bail!("At least one audio extension is required");
        }

        if self.command_prefix.chars().any(char::is_whitespace) {
            anyhow::bail!("Command prefix cannot contain whitespace");
        }

        if self.voice_channel_id.is_some() && self.guild_id.is_none() {
            anyhow::bail!("VOICE_CHANNEL_ID requires GUILD_ID");
        }

        Ok(())
    }

    /// Channel to join on startup, when both ids are configured.
    pub fn autojoin(&self) -> Option<(u64, u64)> {
        self.guild_id.zip(self.voice_channel_id)
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            max_queue_size: self.max_queue_size,
            reconnect_window: self.reconnect_window,
            autoplay: self.enable_autoplay,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Never includes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: prefix `{}`, autojoin {}\n  \
            Library: {} ({})\n  \
            Playback: {}% vol, {} queue, {} reconnect window, {} download timeout\n  \
            Features: Autoplay={}",
            self.command_prefix,
            self.autojoin()
                .map_or("off".to_string(), |(guild, channel)| format!("{}/{}", guild, channel)),
            self.music_dir.display(),
            self.audio_extensions.join(", "),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            humantime::format_duration(self.reconnect_window),
            humantime::format_duration(self.download_timeout),
            self.enable_autoplay
        )
    }
}

fn parse_optional<F>(var: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| raw.trim().parse::<u64>().with_context(|| format!("{} must be a numeric id", key)))
        .transpose()
}

fn parse_or<F, T>(var: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("Invalid value for {}", key)),
        None => Ok(default),
    }
}

fn duration_or<F>(var: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => humantime::parse_duration(raw.trim())
            .with_context(|| format!("{} must be a duration like `5s`", key)),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            command_prefix: "!".to_string(),
            guild_id: None,
            voice_channel_id: None,
            text_channel_id: None,

            // Library defaults
            music_dir: "./Music".into(),
            audio_extensions: vec!["mp3".to_string()],

            // Playback defaults
            default_volume: 0.5,
            max_queue_size: 1000,
            reconnect_window: Duration::from_secs(5),
            download_timeout: Duration::from_secs(600),

            // Feature defaults
            enable_autoplay: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_token_is_set() {
        let config = load(&[("DISCORD_TOKEN", "abc")]).unwrap();

        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.music_dir, PathBuf::from("./Music"));
        assert_eq!(config.audio_extensions, vec!["mp3".to_string()]);
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.reconnect_window, Duration::from_secs(5));
        assert_eq!(config.download_timeout, Duration::from_secs(600));
        assert!(!config.enable_autoplay);
        assert_eq!(config.autojoin(), None);
    }

    #[test]
    fn token_is_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn reads_every_override() {
        let config = load(&[
            ("DISCORD_TOKEN", "abc"),
            ("COMMAND_PREFIX", "?"),
            ("GUILD_ID", "10"),
            ("VOICE_CHANNEL_ID", "20"),
            ("TEXT_CHANNEL_ID", "30"),
            ("MUSIC_DIR", "/srv/music"),
            ("AUDIO_EXTENSIONS", "MP3, .flac"),
            ("DEFAULT_VOLUME", "0.8"),
            ("MAX_QUEUE_SIZE", "50"),
            ("RECONNECT_WINDOW", "10s"),
            ("DOWNLOAD_TIMEOUT", "2m"),
            ("ENABLE_AUTOPLAY", "true"),
        ])
        .unwrap();

        assert_eq!(config.command_prefix, "?");
        assert_eq!(config.autojoin(), Some((10, 20)));
        assert_eq!(config.text_channel_id, Some(30));
        assert_eq!(config.audio_extensions, vec!["mp3".to_string(), "flac".to_string()]);
        assert_eq!(config.reconnect_window, Duration::from_secs(10));
        assert_eq!(config.download_timeout, Duration::from_secs(120));

        let settings = config.controller_settings();
        assert_eq!(settings.max_queue_size, 50);
        assert!(settings.autoplay);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("DEFAULT_VOLUME", "3")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("MAX_QUEUE_SIZE", "0")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("RECONNECT_WINDOW", "soon")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("GUILD_ID", "general")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("VOICE_CHANNEL_ID", "20")]).is_err());
    }

    #[test]
    fn summary_hides_the_token() {
        let config = load(&[("DISCORD_TOKEN", "super-secret")]).unwrap();
        let summary = config.summary();

        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("5s"));
    }
}
