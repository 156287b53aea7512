use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use thiserror::Error;

use super::track::{EndReason, LoadResult, Track};

/// Voice gateway close code for an invalidated session.
pub const SESSION_INVALID: u16 = 4006;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not connected to a voice channel in guild {0}")]
    NotConnected(GuildId),

    #[error("failed to join voice channel: {0}")]
    Join(String),

    #[error("player error: {0}")]
    Player(String),
}

/// Events emitted by the audio backend, delivered in order on one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Ready {
        node: String,
    },
    Stats {
        node: String,
        players: usize,
        playing_players: usize,
    },
    TrackStart {
        guild_id: GuildId,
        track: Track,
    },
    TrackEnd {
        guild_id: GuildId,
        track: Track,
        reason: EndReason,
    },
    ConnectionClosed {
        guild_id: GuildId,
        code: u16,
    },
}

impl BackendEvent {
    /// The guild the event belongs to; node-wide events have none.
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            BackendEvent::Ready { .. } | BackendEvent::Stats { .. } => None,
            BackendEvent::TrackStart { guild_id, .. }
            | BackendEvent::TrackEnd { guild_id, .. }
            | BackendEvent::ConnectionClosed { guild_id, .. } => Some(*guild_id),
        }
    }
}

/// The audio service that decodes and streams into voice channels.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    async fn connect_voice(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), BackendError>;

    async fn load_track(&self, query: &str) -> Result<LoadResult, BackendError>;

    /// Creates or updates the guild's player so it plays `track`, replacing
    /// whatever was playing.
    async fn play(&self, guild_id: GuildId, track: Track, volume: f32) -> Result<(), BackendError>;

    async fn stop(&self, guild_id: GuildId) -> Result<(), BackendError>;

    /// The track the guild's player currently holds, if any.
    fn active_track(&self, guild_id: GuildId) -> Option<Track>;
}
