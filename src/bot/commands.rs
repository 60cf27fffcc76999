use crate::sources::TrackSelector;

/// Discord refuses messages longer than this.
pub const MESSAGE_LIMIT: usize = 2000;

/// A chat command after prefix stripping and argument parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Without a selector, resumes a running session or starts the whole
    /// library.
    Play(Option<TrackSelector>),
    Pause,
    Resume,
    Next,
    Previous,
    List,
    Shuffle,
    Loop,
    Autoplay,
    /// Without a name, joins the caller's voice channel.
    Join(Option<String>),
    Control,
    Help,
    Download(String),
    Leave,
    /// Usage error for a known command.
    Invalid { usage: &'static str },
    Unknown(String),
}

impl ChatCommand {
    /// Whether the control panel needs a redraw after running it.
    pub fn changes_playback(&self) -> bool {
        matches!(
            self,
            ChatCommand::Play(_)
                | ChatCommand::Pause
                | ChatCommand::Resume
                | ChatCommand::Next
                | ChatCommand::Previous
                | ChatCommand::Shuffle
                | ChatCommand::Loop
                | ChatCommand::Autoplay
                | ChatCommand::Join(_)
                | ChatCommand::Leave
        )
    }
}

/// Parses `content` if it starts with `prefix`. Anything else is not a
/// command and yields `None`.
pub fn parse(content: &str, prefix: &str) -> Option<ChatCommand> {
    let body = content.trim().strip_prefix(prefix)?;
    let mut words = body.split_whitespace();
    let name = words.next()?.to_lowercase();
    let rest = words.collect::<Vec<_>>().join(" ");
    let argument = (!rest.is_empty()).then_some(rest);

    let command = match name.as_str() {
        "play" => ChatCommand::Play(argument.map(|arg| match arg.parse::<usize>() {
            Ok(number) => TrackSelector::Number(number),
            Err(_) => TrackSelector::Name(arg),
        })),
        "pause" => ChatCommand::Pause,
        "resume" => ChatCommand::Resume,
        "next" | "skip" => ChatCommand::Next,
        "previous" | "prev" => ChatCommand::Previous,
        "list" => ChatCommand::List,
        "shuffle" => ChatCommand::Shuffle,
        "loop" => ChatCommand::Loop,
        "autoplay" => ChatCommand::Autoplay,
        "join" => ChatCommand::Join(argument),
        "control" => ChatCommand::Control,
        "help" => ChatCommand::Help,
        "download" => match argument {
            Some(url) if !url.contains(' ') => ChatCommand::Download(url),
            _ => ChatCommand::Invalid { usage: "download <url>" },
        },
        "leave" | "stop" => ChatCommand::Leave,
        _ => ChatCommand::Unknown(name),
    };

    Some(command)
}

pub fn help_text(prefix: &str) -> String {
    let entries = [
        ("play [number|name]", "Start the library or one track, or resume"),
        ("pause", "Pause playback"),
        ("resume", "Resume playback"),
        ("next", "Skip to the next track"),
        ("previous", "Go back one track"),
        ("list", "List the music library"),
        ("shuffle", "Toggle shuffle"),
        ("loop", "Toggle repeating the current track"),
        ("autoplay", "Toggle autoplay"),
        ("join [channel]", "Join your voice channel, or the named one"),
        ("control", "Show the control panel"),
        ("download <url>", "Download audio into the library and queue it"),
        ("leave", "Stop and leave the voice channel"),
        ("help", "Show this message"),
    ];

    let mut text = String::from("🎵 **Commands**\n");
    for (usage, description) in entries {
        text.push_str(&format!("`{}{}` - {}\n", prefix, usage, description));
    }
    text
}

/// Splits `text` on line boundaries into pieces of at most `limit` bytes.
/// A single line longer than `limit` is cut at char boundaries.
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let mut line = line;
        while line.len() > limit {
            let mut cut = limit;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(line[..cut].to_string());
            line = &line[cut..];
        }

        let needed = if current.is_empty() { line.len() } else { current.len() + 1 + line.len() };
        if needed > limit {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
