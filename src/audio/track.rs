use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

/// A loaded, immutable backend track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub author: Option<String>,
    pub duration: Option<Duration>,
    /// Playable source the backend resolves again on every start.
    pub uri: String,
    pub artwork: Option<String>,
}

impl Track {
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: None,
            duration: None,
            uri: uri.into(),
            artwork: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_artwork(mut self, artwork: impl Into<String>) -> Self {
        self.artwork = Some(artwork.into());
        self
    }
}

/// Outcome of a backend track lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    Track(Track),
    Playlist { name: String, tracks: Vec<Track> },
    NoMatches,
    LoadFailed(String),
}

/// Why the backend stopped a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Reached the end of the stream.
    Finished,
    /// Failed while loading or decoding.
    LoadFailed,
    /// Stopped explicitly.
    Stopped,
    /// Replaced by a newly started track.
    Replaced,
}

impl EndReason {
    /// Whether the scheduler should pick the next track after this end.
    pub fn may_start_next(self) -> bool {
        matches!(self, EndReason::Finished | EndReason::LoadFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    #[default]
    None,
    Track,
    Queue,
}

impl LoopMode {
    /// NONE -> TRACK -> QUEUE -> NONE
    pub fn next(self) -> Self {
        match self {
            LoopMode::None => LoopMode::Track,
            LoopMode::Track => LoopMode::Queue,
            LoopMode::Queue => LoopMode::None,
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopMode::None => write!(f, "none"),
            LoopMode::Track => write!(f, "track"),
            LoopMode::Queue => write!(f, "queue"),
        }
    }
}

impl FromStr for LoopMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(LoopMode::None),
            "track" | "song" => Ok(LoopMode::Track),
            "queue" | "all" => Ok(LoopMode::Queue),
            other => anyhow::bail!("unknown loop mode: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_finished_and_load_failed_advance() {
        assert!(EndReason::Finished.may_start_next());
        assert!(EndReason::LoadFailed.may_start_next());
        assert!(!EndReason::Stopped.may_start_next());
        assert!(!EndReason::Replaced.may_start_next());
    }

    #[test]
    fn loop_mode_cycles_through_all_modes() {
        assert_eq!(LoopMode::None.next(), LoopMode::Track);
        assert_eq!(LoopMode::Track.next(), LoopMode::Queue);
        assert_eq!(LoopMode::Queue.next(), LoopMode::None);
    }

    #[test]
    fn loop_mode_parses_aliases() {
        assert_eq!("OFF".parse::<LoopMode>().unwrap(), LoopMode::None);
        assert_eq!("song".parse::<LoopMode>().unwrap(), LoopMode::Track);
        assert_eq!("all".parse::<LoopMode>().unwrap(), LoopMode::Queue);
        assert!("sometimes".parse::<LoopMode>().is_err());
    }
}
