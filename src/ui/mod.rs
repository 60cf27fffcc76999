//! Control panel shown in the guild's text channel.

pub mod buttons;
pub mod embeds;
pub mod panel;
