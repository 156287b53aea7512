use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{GuildId, UserId};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Who shares a cooldown window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CooldownScope {
    #[default]
    User,
    Guild,
    UserGuild,
}

impl CooldownScope {
    /// Key under which `command`'s last use is recorded.
    pub fn key(self, command: &str, user_id: UserId, guild_id: GuildId) -> String {
        match self {
            CooldownScope::User => format!("{}:{}", command, user_id),
            CooldownScope::Guild => format!("{}:{}", command, guild_id),
            CooldownScope::UserGuild => format!("{}:{}:{}", command, user_id, guild_id),
        }
    }
}

/// A use of `key` recorded ahead of running the command.
///
/// Hand it back through [`CooldownManager::release`] when the command did not
/// go through, so the invoker is not throttled for nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownReservation {
    key: String,
    reserved_at: Instant,
}

/// Last-use timestamps for commands that enforce a cooldown.
#[derive(Debug, Default)]
pub struct CooldownManager {
    last_used: DashMap<String, Instant>,
}

impl CooldownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks `key` against a `window` cooldown and, when it is free, records
    /// the use in the same step. Returns the time left otherwise.
    ///
    /// Zero windows are not tracked and never reserve anything.
    pub fn try_acquire(&self, key: &str, window: Duration) -> Result<Option<CooldownReservation>, Duration> {
        if window.is_zero() {
            return Ok(None);
        }

        let now = Instant::now();
        match self.last_used.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let remaining = window.saturating_sub(now.saturating_duration_since(*entry.get()));
                if !remaining.is_zero() {
                    return Err(remaining);
                }
                entry.insert(now);
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
            }
        }

        Ok(Some(CooldownReservation {
            key: key.to_string(),
            reserved_at: now,
        }))
    }

    /// Drops a reservation, unless a later use already replaced it.
    pub fn release(&self, reservation: CooldownReservation) {
        let released = self
            .last_used
            .remove_if(&reservation.key, |_, last_used| *last_used == reservation.reserved_at);
        if released.is_some() {
            debug!("Cooldown released for {}", reservation.key);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last_used.is_empty()
    }
}
