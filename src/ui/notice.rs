use serenity::model::permissions::Permissions;
use std::time::Duration;

use crate::audio::track::{LoopMode, Track};

/// How long user-input errors stay visible before being deleted.
pub const EPHEMERAL_TTL: Duration = Duration::from_secs(10);

/// Everything the bot can say in a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    // Playback
    NowPlaying(Track),
    QueueEmpty,
    NoHistory,
    NothingPlaying,
    TrackQueued { track: Track, position: usize },
    PlaylistQueued { name: String, count: usize },
    NoMatches(String),
    LoadFailed(String),
    Removed(Track),
    IndexOutOfRange(usize),
    Skipped,
    WentBack,
    LoopModeChanged(LoopMode),
    QueueListing {
        current: Option<Track>,
        upcoming: Vec<Track>,
        total: usize,
        loop_mode: LoopMode,
    },

    // General
    Pong,
    Help { prefix: String, commands: Vec<HelpEntry> },
    MentionGreeting { prefix: String },

    // Rejections and failures
    NotInVoice,
    WrongVoiceChannel,
    MissingBotPermissions(Permissions),
    MissingUserPermissions(Permissions),
    CooldownActive(Duration),
    InvalidArguments { usage: String },
    DispatchTimeout,
    NoCapacity,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HelpEntry {
    pub category: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub usage: String,
}

impl Notice {
    /// TTL used when the caller doesn't pick one.
    pub fn default_ttl(&self) -> Option<Duration> {
        match self {
            Notice::NowPlaying(track) => track.duration,
            Notice::CooldownActive(remaining) => Some((*remaining).max(Duration::from_secs(1))),
            Notice::NotInVoice
            | Notice::WrongVoiceChannel
            | Notice::MissingBotPermissions(_)
            | Notice::MissingUserPermissions(_)
            | Notice::InvalidArguments { .. }
            | Notice::DispatchTimeout
            | Notice::NoCapacity
            | Notice::IndexOutOfRange(_) => Some(EPHEMERAL_TTL),
            Notice::Error(_) => Some(Duration::from_secs(20)),
            _ => None,
        }
    }
}
