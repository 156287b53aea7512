use anyhow::Result;
use parking_lot::RwLock;
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

use super::backend::AudioBackend;
use super::track::{EndReason, LoopMode, Track};
use crate::bot::gateway::ChatGateway;
use crate::ui::Notice;

pub const HISTORY_CAPACITY: usize = 50;

/// Bounded stack of played tracks; the oldest entry is evicted on overflow.
#[derive(Debug, Default, Clone)]
pub struct TrackHistory {
    // front = oldest, back = most recent
    entries: VecDeque<Track>,
}

impl TrackHistory {
    /// Pushes `track`, returning the evicted oldest entry when full.
    pub fn push(&mut self, track: Track) -> Option<Track> {
        let evicted = if self.entries.len() >= HISTORY_CAPACITY {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(track);
        evicted
    }

    pub fn pop_recent(&mut self) -> Option<Track> {
        self.entries.pop_back()
    }

    pub fn drain_oldest_first(&mut self) -> Vec<Track> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.entries.iter()
    }
}

#[derive(Debug, Default)]
pub struct PlaybackState {
    queue: VecDeque<Track>,
    history: TrackHistory,
    current: Option<Track>,
    loop_mode: LoopMode,
    // Suppresses the history push for the end event a backtrack produces.
    going_back: bool,
}

/// Read-only copy of a scheduler's state.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    pub history: Vec<Track>,
    pub loop_mode: LoopMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Started,
    /// 1-based position in the queue.
    Queued { position: usize },
}

/// Per-guild playback state machine.
///
/// Every public operation runs under the guild's state lock, so enqueue,
/// skip, back, remove, loop changes and the two backend event handlers never
/// interleave for the same guild. Different guilds never share a lock.
pub struct PlaybackScheduler {
    guild_id: GuildId,
    state: Mutex<PlaybackState>,
    backend: Arc<dyn AudioBackend>,
    gateway: Arc<dyn ChatGateway>,
    reply_channel: Arc<RwLock<ChannelId>>,
    volume: f32,
}

impl PlaybackScheduler {
    pub fn new(
        guild_id: GuildId,
        backend: Arc<dyn AudioBackend>,
        gateway: Arc<dyn ChatGateway>,
        reply_channel: Arc<RwLock<ChannelId>>,
        volume: f32,
    ) -> Self {
        Self {
            guild_id,
            state: Mutex::new(PlaybackState::default()),
            backend,
            gateway,
            reply_channel,
            volume,
        }
    }

    /// Starts `track` right away when the player is idle, otherwise appends it.
    pub async fn enqueue(&self, track: Track) -> Result<Enqueued> {
        let mut state = self.state.lock().await;

        if self.backend.active_track(self.guild_id).is_none() {
            self.start(track).await?;
            return Ok(Enqueued::Started);
        }

        info!("➕ Queued in guild {}: {}", self.guild_id, track.title);
        state.queue.push_back(track);
        Ok(Enqueued::Queued {
            position: state.queue.len(),
        })
    }

    /// Appends every track; when the player is idle the first appended track
    /// is taken off the queue and started.
    pub async fn enqueue_playlist(&self, tracks: Vec<Track>) -> Result<usize> {
        let mut state = self.state.lock().await;
        let count = tracks.len();
        let first_new = state.queue.len();
        state.queue.extend(tracks);
        info!("➕ Queued {} tracks in guild {}", count, self.guild_id);

        if count > 0 && self.backend.active_track(self.guild_id).is_none() {
            if let Some(first) = state.queue.remove(first_new) {
                self.start(first).await?;
            }
        }

        Ok(count)
    }

    pub async fn on_track_start(&self, track: Track) {
        let mut state = self.state.lock().await;
        info!("▶️ Track started in guild {}: {}", self.guild_id, track.title);
        state.current = Some(track.clone());

        let ttl = track.duration;
        self.notify(Notice::NowPlaying(track), ttl);
    }

    pub async fn on_track_end(&self, ended: Track, reason: EndReason) {
        let mut state = self.state.lock().await;
        debug!("⏹️ Track ended in guild {} ({:?}): {}", self.guild_id, reason, ended.title);

        let previous = state.current.take();
        let going_back = std::mem::take(&mut state.going_back);
        if !going_back {
            if let Some(previous) = previous {
                state.history.push(previous);
            }
        }

        if !reason.may_start_next() {
            return;
        }

        // An enqueue may already have started something after the natural end.
        if self.backend.active_track(self.guild_id).is_some() {
            debug!("⏭️ Guild {} already playing again, not advancing", self.guild_id);
            return;
        }

        let result = match state.loop_mode {
            // A track that fails to load would fail again forever.
            LoopMode::Track if reason == EndReason::LoadFailed => self.advance(&mut state).await,
            LoopMode::Track => {
                info!("🔂 Repeating in guild {}: {}", self.guild_id, ended.title);
                self.start(ended).await
            }
            LoopMode::Queue => self.advance_looping_queue(&mut state, ended).await,
            LoopMode::None => self.advance(&mut state).await,
        };

        if let Err(e) = result {
            error!("Error starting next track in guild {}: {:?}", self.guild_id, e);
        }
    }

    /// Moves forward exactly once, ignoring the loop mode.
    ///
    /// Returns `false` when the player holds nothing to skip.
    pub async fn skip(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        if self.backend.active_track(self.guild_id).is_none() {
            return Ok(false);
        }

        state.going_back = false;
        self.advance(&mut state).await?;
        Ok(true)
    }

    /// Replays the most recent history entry. The interrupted track goes back
    /// to the head of the queue so forward order resumes after the replay.
    ///
    /// Returns `false` (and tells the channel) when there is no history.
    pub async fn back(&self) -> Result<bool> {
        let mut state = self.state.lock().await;

        let Some(previous) = state.history.pop_recent() else {
            self.notify(Notice::NoHistory, None);
            return Ok(false);
        };

        // Only a replaced track produces an end event to swallow.
        state.going_back = self.backend.active_track(self.guild_id).is_some();
        if let Some(current) = state.current.take() {
            state.queue.push_front(current);
        }

        info!("⏮️ Going back in guild {}: {}", self.guild_id, previous.title);
        self.start(previous).await?;
        Ok(true)
    }

    /// Removes the queue entry at `index` (0-based); out of range is a no-op.
    pub async fn remove_track(&self, index: usize) -> Option<Track> {
        let mut state = self.state.lock().await;
        let removed = state.queue.remove(index);
        if let Some(track) = &removed {
            debug!("❌ Removed queue position {} in guild {}: {}", index, self.guild_id, track.title);
        }
        removed
    }

    pub async fn set_loop_mode(&self, mode: LoopMode) {
        let mut state = self.state.lock().await;
        state.loop_mode = mode;
        info!("🔁 Loop mode in guild {} set to {}", self.guild_id, mode);
    }

    pub async fn loop_mode(&self) -> LoopMode {
        self.state.lock().await.loop_mode
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock().await;
        QueueSnapshot {
            current: state.current.clone(),
            queue: state.queue.iter().cloned().collect(),
            history: state.history.iter().cloned().collect(),
            loop_mode: state.loop_mode,
        }
    }

    async fn advance_looping_queue(&self, state: &mut MutexGuard<'_, PlaybackState>, ended: Track) -> Result<()> {
        if state.queue.is_empty() {
            if state.history.is_empty() {
                return self.start(ended).await;
            }
            let replay = state.history.drain_oldest_first();
            info!("🔁 Refilling queue of guild {} with {} tracks from history", self.guild_id, replay.len());
            state.queue.extend(replay);
        }
        self.advance(state).await
    }

    async fn advance(&self, state: &mut MutexGuard<'_, PlaybackState>) -> Result<()> {
        match state.queue.pop_front() {
            Some(next) => {
                info!("➡️ Next in guild {}: {}", self.guild_id, next.title);
                self.start(next).await
            }
            None => {
                info!("📭 Queue empty in guild {}", self.guild_id);
                state.current = None;
                self.notify(Notice::QueueEmpty, None);
                self.backend.stop(self.guild_id).await?;
                Ok(())
            }
        }
    }

    async fn start(&self, track: Track) -> Result<()> {
        self.backend.play(self.guild_id, track, self.volume).await?;
        Ok(())
    }

    fn notify(&self, notice: Notice, ttl: Option<std::time::Duration>) {
        let channel_id = *self.reply_channel.read();
        self.gateway.notify(channel_id, None, notice, ttl);
    }
}
