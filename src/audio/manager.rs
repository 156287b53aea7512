use dashmap::DashMap;
use parking_lot::RwLock;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::info;

use super::backend::AudioBackend;
use super::scheduler::PlaybackScheduler;
use crate::bot::gateway::ChatGateway;

/// One guild's music state: its scheduler plus the channel notices go to.
pub struct EntityMusicManager {
    pub guild_id: GuildId,
    pub scheduler: PlaybackScheduler,
    reply_channel: Arc<RwLock<ChannelId>>,
}

impl EntityMusicManager {
    fn new(
        guild_id: GuildId,
        reply_channel: ChannelId,
        backend: Arc<dyn AudioBackend>,
        gateway: Arc<dyn ChatGateway>,
        volume: f32,
    ) -> Self {
        let reply_channel = Arc::new(RwLock::new(reply_channel));
        let scheduler = PlaybackScheduler::new(guild_id, backend, gateway, reply_channel.clone(), volume);
        Self {
            guild_id,
            scheduler,
            reply_channel,
        }
    }

    pub fn set_reply_channel(&self, channel_id: ChannelId) {
        *self.reply_channel.write() = channel_id;
    }
}

/// Registry of per-guild managers, created lazily and kept for the process lifetime.
pub struct MusicManagers {
    managers: DashMap<GuildId, Arc<EntityMusicManager>>,
    backend: Arc<dyn AudioBackend>,
    gateway: Arc<dyn ChatGateway>,
    volume: f32,
}

impl MusicManagers {
    pub fn new(backend: Arc<dyn AudioBackend>, gateway: Arc<dyn ChatGateway>, volume: f32) -> Self {
        Self {
            managers: DashMap::new(),
            backend,
            gateway,
            volume,
        }
    }

    /// Returns the guild's manager, creating it on first use. Notices from
    /// then on go to `reply_channel`, the channel of the latest command.
    pub fn get_or_create(&self, guild_id: GuildId, reply_channel: ChannelId) -> Arc<EntityMusicManager> {
        let manager = self
            .managers
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🎵 Creating music manager for guild {}", guild_id);
                Arc::new(EntityMusicManager::new(
                    guild_id,
                    reply_channel,
                    self.backend.clone(),
                    self.gateway.clone(),
                    self.volume,
                ))
            })
            .clone();

        manager.set_reply_channel(reply_channel);
        manager
    }

    /// Existing manager only; backend events for unknown guilds are dropped.
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<EntityMusicManager>> {
        self.managers.get(&guild_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::FakeBackend;
    use crate::bot::testing::RecordingGateway;

    fn managers() -> MusicManagers {
        MusicManagers::new(Arc::new(FakeBackend::new()), Arc::new(RecordingGateway::new()), 0.35)
    }

    #[test]
    fn get_or_create_reuses_the_same_manager() {
        let managers = managers();
        let guild = GuildId::new(1);

        let first = managers.get_or_create(guild, ChannelId::new(10));
        let second = managers.get_or_create(guild, ChannelId::new(10));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(managers.len(), 1);
    }

    #[test]
    fn get_does_not_create() {
        let managers = managers();

        assert!(managers.get(GuildId::new(7)).is_none());
        assert!(managers.is_empty());
    }

    #[tokio::test]
    async fn scheduler_notices_follow_reply_channel() {
        let gateway = RecordingGateway::new();
        let managers = MusicManagers::new(Arc::new(FakeBackend::new()), Arc::new(gateway.clone()), 0.35);
        let guild = GuildId::new(1);

        let manager = managers.get_or_create(guild, ChannelId::new(10));
        managers.get_or_create(guild, ChannelId::new(30));
        manager.scheduler.back().await.unwrap();

        assert_eq!(gateway.sent()[0].0, ChannelId::new(30));
    }
}
