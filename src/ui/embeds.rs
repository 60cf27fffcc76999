use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::controller::PlayerSnapshot;

/// Shared embed colors.
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Local Jukebox";

fn on_off(on: bool) -> &'static str {
    if on {
        "On"
    } else {
        "Off"
    }
}

/// Body of the control panel.
pub fn create_now_playing_embed(snapshot: &PlayerSnapshot) -> CreateEmbed {
    let color = match (&snapshot.current, snapshot.connected, snapshot.paused) {
        (Some(_), true, true) => colors::WARNING_ORANGE,
        (Some(_), true, false) => colors::SUCCESS_GREEN,
        _ => colors::NEUTRAL_GRAY,
    };

    let position = match snapshot.position {
        Some(index) => format!("{}/{}", index + 1, snapshot.len),
        None => "-".to_string(),
    };

    CreateEmbed::default()
        .title("🎵 Control Panel")
        .description(snapshot.now_playing_text())
        .color(color)
        .field("📜 Track", position, true)
        .field("🔁 Loop", on_off(snapshot.flags.looping), true)
        .field("🔀 Shuffle", on_off(snapshot.flags.shuffling), true)
        .field("📻 Autoplay", on_off(snapshot.flags.autoplaying), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Reply for a failed command.
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
