use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use crate::audio::controller::PlayerSnapshot;

/// Custom ids of the control panel buttons.
pub mod button_ids {
    pub const PREVIOUS: &str = "previous";
    pub const NEXT: &str = "next";
    pub const PAUSE: &str = "pause";
    pub const SHUFFLE: &str = "shuffle";
    pub const LOOP: &str = "loop";
}

/// What a control panel button does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Previous,
    Next,
    PauseResume,
    Shuffle,
    Loop,
}

impl ControlAction {
    pub const ALL: [ControlAction; 5] = [
        ControlAction::Previous,
        ControlAction::Next,
        ControlAction::PauseResume,
        ControlAction::Shuffle,
        ControlAction::Loop,
    ];

    pub fn custom_id(self) -> &'static str {
        match self {
            ControlAction::Previous => button_ids::PREVIOUS,
            ControlAction::Next => button_ids::NEXT,
            ControlAction::PauseResume => button_ids::PAUSE,
            ControlAction::Shuffle => button_ids::SHUFFLE,
            ControlAction::Loop => button_ids::LOOP,
        }
    }

    pub fn from_custom_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.custom_id() == id)
    }

    fn button(self, snapshot: &PlayerSnapshot) -> CreateButton {
        let toggled = |on: bool| {
            if on {
                ButtonStyle::Success
            } else {
                ButtonStyle::Secondary
            }
        };

        let (emoji, style) = match self {
            ControlAction::Previous => ('⏮', ButtonStyle::Secondary),
            ControlAction::Next => ('⏭', ButtonStyle::Secondary),
            ControlAction::PauseResume if snapshot.paused => ('▶', ButtonStyle::Primary),
            ControlAction::PauseResume => ('⏸', ButtonStyle::Primary),
            ControlAction::Shuffle => ('🔀', toggled(snapshot.flags.shuffling)),
            ControlAction::Loop => ('🔁', toggled(snapshot.flags.looping)),
        };

        CreateButton::new(self.custom_id())
            .emoji(emoji)
            .style(style)
            .disabled(!snapshot.connected)
    }
}

/// Builds the control panel button row.
pub fn create_player_controls(snapshot: &PlayerSnapshot) -> Vec<CreateActionRow> {
    let buttons = ControlAction::ALL
        .into_iter()
        .map(|action| action.button(snapshot))
        .collect();

    vec![CreateActionRow::Buttons(buttons)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::controller::ModeFlags;

    fn snapshot(connected: bool) -> PlayerSnapshot {
        PlayerSnapshot {
            current: None,
            position: None,
            len: 0,
            flags: ModeFlags::default(),
            paused: false,
            connected,
        }
    }

    #[test]
    fn custom_ids_round_trip() {
        for action in ControlAction::ALL {
            assert_eq!(ControlAction::from_custom_id(action.custom_id()), Some(action));
        }
        assert_eq!(ControlAction::from_custom_id("music_stop"), None);
    }

    #[test]
    fn one_row_with_every_action() {
        let rows = create_player_controls(&snapshot(true));
        assert_eq!(rows.len(), 1);

        let json = serde_json::to_string(&rows).unwrap();
        for id in ["previous", "next", "pause", "shuffle", "loop"] {
            assert!(json.contains(&format!("\"{}\"", id)), "missing {id}");
        }
    }
}
