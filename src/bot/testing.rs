//! In-memory chat gateway that records every notice instead of talking to Discord.

use chrono::Utc;
use parking_lot::Mutex;
use serenity::all::{ChannelId, GuildId, MessageId, Permissions, UserId};
use std::{collections::HashMap, sync::Arc, time::Duration};

use super::commands::{CommandContext, CommandEnv};
use super::gateway::ChatGateway;
use crate::audio::{manager::MusicManagers, testing::FakeBackend};
use crate::ui::Notice;

/// Captured notice: (channel, replied-to message, notice, ttl)
pub type SentNotice = (ChannelId, Option<MessageId>, Notice, Option<Duration>);

pub fn bot_user_id() -> UserId {
    UserId::new(999)
}

pub const GUILD: u64 = 1;
pub const TEXT_CHANNEL: u64 = 10;
pub const VOICE_CHANNEL: u64 = 50;
pub const AUTHOR: u64 = 7;

/// A `!command args` invocation by [`AUTHOR`], who sits in [`VOICE_CHANNEL`].
pub fn context(message_id: u64, command: &str, args: &[&str]) -> CommandContext {
    CommandContext {
        message_id: MessageId::new(message_id),
        guild_id: GuildId::new(GUILD),
        channel_id: ChannelId::new(TEXT_CHANNEL),
        author_id: UserId::new(AUTHOR),
        voice_channel_id: Some(ChannelId::new(VOICE_CHANNEL)),
        bot_voice_channel_id: None,
        command: command.to_string(),
        args: args.iter().map(|arg| arg.to_string()).collect(),
        raw_args: args.join(" "),
        prefix: "!".to_string(),
        is_mention_prefix: false,
        created_at: Utc::now(),
    }
}

pub fn env(backend: &FakeBackend, gateway: &RecordingGateway) -> CommandEnv {
    CommandEnv {
        managers: Arc::new(MusicManagers::new(
            Arc::new(backend.clone()),
            Arc::new(gateway.clone()),
            0.35,
        )),
        backend: Arc::new(backend.clone()),
        gateway: Arc::new(gateway.clone()),
        help: Vec::new(),
    }
}

#[derive(Clone, Default)]
pub struct RecordingGateway {
    sent: Arc<Mutex<Vec<SentNotice>>>,
    deleted: Arc<Mutex<Vec<MessageId>>>,
    bot_permissions: Arc<Mutex<Permissions>>,
    user_permissions: Arc<Mutex<HashMap<UserId, Permissions>>>,
    self_voice: Arc<Mutex<HashMap<GuildId, ChannelId>>>,
}

impl RecordingGateway {
    /// A gateway where the bot and every user hold all permissions.
    pub fn new() -> Self {
        let gateway = Self::default();
        *gateway.bot_permissions.lock() = Permissions::all();
        gateway
    }

    pub fn set_bot_permissions(&self, permissions: Permissions) {
        *self.bot_permissions.lock() = permissions;
    }

    pub fn set_user_permissions(&self, user_id: UserId, permissions: Permissions) {
        self.user_permissions.lock().insert(user_id, permissions);
    }

    pub fn set_self_voice(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.self_voice.lock().insert(guild_id, channel_id);
    }

    pub fn sent(&self) -> Vec<SentNotice> {
        self.sent.lock().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.sent.lock().iter().map(|(_, _, notice, _)| notice.clone()).collect()
    }

    pub fn deleted(&self) -> Vec<MessageId> {
        self.deleted.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl ChatGateway for RecordingGateway {
    fn current_user_id(&self) -> Option<UserId> {
        Some(bot_user_id())
    }

    fn notify(&self, channel_id: ChannelId, reply_to: Option<MessageId>, notice: Notice, ttl: Option<Duration>) {
        self.sent.lock().push((channel_id, reply_to, notice, ttl));
    }

    fn delete_message(&self, _channel_id: ChannelId, message_id: MessageId) {
        self.deleted.lock().push(message_id);
    }

    fn bot_permissions(&self, _guild_id: GuildId, _channel_id: ChannelId) -> Permissions {
        *self.bot_permissions.lock()
    }

    fn user_permissions(&self, _guild_id: GuildId, _channel_id: ChannelId, user_id: UserId) -> Permissions {
        self.user_permissions
            .lock()
            .get(&user_id)
            .copied()
            .unwrap_or_else(Permissions::all)
    }

    fn self_voice_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.self_voice.lock().get(&guild_id).copied()
    }
}
