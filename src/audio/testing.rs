//! In-memory audio backend that records player instructions.
//!
//! Unlike the real backend it emits no events: tests drive the scheduler's
//! `on_track_start` / `on_track_end` by hand to pin down event ordering.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::all::{ChannelId, GuildId};
use std::{collections::HashMap, sync::Arc, time::Duration};

use super::backend::{AudioBackend, BackendError};
use super::track::{LoadResult, Track};

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCall {
    Play(Track),
    Stop,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    calls: Arc<Mutex<Vec<(GuildId, PlayerCall)>>>,
    active: Arc<Mutex<HashMap<GuildId, Track>>>,
    joined: Arc<Mutex<Vec<(GuildId, ChannelId)>>>,
    results: Arc<Mutex<HashMap<String, LoadResult>>>,
    volumes: Arc<Mutex<Vec<f32>>>,
    load_delay: Arc<Mutex<Duration>>,
    join_delay: Arc<Mutex<Duration>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_result(&self, query: &str, result: LoadResult) {
        self.results.lock().insert(query.to_string(), result);
    }

    /// Makes every lookup take `delay`, like a slow yt-dlp run.
    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock() = delay;
    }

    /// Makes joining voice take `delay`; the join is recorded once it is done.
    pub fn set_join_delay(&self, delay: Duration) {
        *self.join_delay.lock() = delay;
    }

    /// Pretends the guild's player already holds `track`.
    pub fn set_active(&self, guild_id: GuildId, track: Track) {
        self.active.lock().insert(guild_id, track);
    }

    /// Pretends the guild's player finished and holds nothing.
    pub fn clear_active(&self, guild_id: GuildId) {
        self.active.lock().remove(&guild_id);
    }

    pub fn calls(&self, guild_id: GuildId) -> Vec<PlayerCall> {
        self.calls
            .lock()
            .iter()
            .filter(|(g, _)| *g == guild_id)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn played(&self, guild_id: GuildId) -> Vec<Track> {
        self.calls(guild_id)
            .into_iter()
            .filter_map(|call| match call {
                PlayerCall::Play(track) => Some(track),
                PlayerCall::Stop => None,
            })
            .collect()
    }

    pub fn joined(&self) -> Vec<(GuildId, ChannelId)> {
        self.joined.lock().clone()
    }

    pub fn volumes(&self) -> Vec<f32> {
        self.volumes.lock().clone()
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    async fn connect_voice(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), BackendError> {
        let delay = *self.join_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.joined.lock().push((guild_id, channel_id));
        Ok(())
    }

    async fn load_track(&self, query: &str) -> Result<LoadResult, BackendError> {
        let delay = *self.load_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.results.lock().get(query).cloned().unwrap_or(LoadResult::NoMatches))
    }

    async fn play(&self, guild_id: GuildId, track: Track, volume: f32) -> Result<(), BackendError> {
        self.volumes.lock().push(volume);
        self.active.lock().insert(guild_id, track.clone());
        self.calls.lock().push((guild_id, PlayerCall::Play(track)));
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), BackendError> {
        self.active.lock().remove(&guild_id);
        self.calls.lock().push((guild_id, PlayerCall::Stop));
        Ok(())
    }

    fn active_track(&self, guild_id: GuildId) -> Option<Track> {
        self.active.lock().get(&guild_id).cloned()
    }
}
