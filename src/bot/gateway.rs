use serenity::{
    all::{Cache, ChannelId, GuildId, Http, MessageId, Permissions, UserId},
    builder::{CreateMessage, CreateAllowedMentions},
};
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tracing::{debug, error, warn};

use crate::ui::{embeds, Notice};

/// The chat platform as seen by the dispatch core and the schedulers.
///
/// Notices are fire-and-forget: implementations deliver them in the
/// background and only log failures.
pub trait ChatGateway: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;

    /// Sends `notice` to `channel_id`, optionally as a reply, deleting it
    /// after `ttl` when one is given.
    fn notify(&self, channel_id: ChannelId, reply_to: Option<MessageId>, notice: Notice, ttl: Option<Duration>);

    fn delete_message(&self, channel_id: ChannelId, message_id: MessageId);

    fn bot_permissions(&self, guild_id: GuildId, channel_id: ChannelId) -> Permissions;

    fn user_permissions(&self, guild_id: GuildId, channel_id: ChannelId, user_id: UserId) -> Permissions;

    /// The voice channel the bot currently occupies in `guild_id`.
    fn self_voice_channel(&self, guild_id: GuildId) -> Option<ChannelId>;
}

/// [`ChatGateway`] backed by serenity's HTTP client and cache.
///
/// The client handles only exist once the serenity client is built, which
/// happens after the event handler; [`SerenityGateway::attach`] closes that
/// loop at startup.
#[derive(Default)]
pub struct SerenityGateway {
    handles: OnceLock<(Arc<Http>, Arc<Cache>)>,
}

impl SerenityGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, http: Arc<Http>, cache: Arc<Cache>) {
        if self.handles.set((http, cache)).is_err() {
            warn!("Serenity gateway already attached");
        }
    }

    fn http(&self) -> Option<Arc<Http>> {
        match self.handles.get() {
            Some((http, _)) => Some(http.clone()),
            None => {
                warn!("Serenity gateway used before attach");
                None
            }
        }
    }

    fn cache(&self) -> Option<&Arc<Cache>> {
        self.handles.get().map(|(_, cache)| cache)
    }

    fn permissions_of(&self, guild_id: GuildId, channel_id: ChannelId, user_id: UserId) -> Permissions {
        let Some(cache) = self.cache() else {
            return Permissions::empty();
        };
        let Some(guild) = cache.guild(guild_id) else {
            return Permissions::empty();
        };
        let Some(member) = guild.members.get(&user_id) else {
            debug!("Member {} not cached in guild {}", user_id, guild_id);
            return Permissions::empty();
        };
        match guild.channels.get(&channel_id) {
            Some(channel) => guild.user_permissions_in(channel, member),
            None => Permissions::empty(),
        }
    }
}

impl ChatGateway for SerenityGateway {
    fn current_user_id(&self) -> Option<UserId> {
        self.cache().map(|cache| cache.current_user().id)
    }

    fn notify(&self, channel_id: ChannelId, reply_to: Option<MessageId>, notice: Notice, ttl: Option<Duration>) {
        let Some(http) = self.http() else { return };

        tokio::spawn(async move {
            let mut message = CreateMessage::new()
                .embed(embeds::render(&notice))
                .allowed_mentions(CreateAllowedMentions::new().replied_user(false));
            if let Some(reply_to) = reply_to {
                message = message.reference_message((channel_id, reply_to));
            }

            let sent = match channel_id.send_message(&http, message).await {
                Ok(sent) => sent,
                Err(e) => {
                    error!("Error sending notice to channel {}: {:?}", channel_id, e);
                    return;
                }
            };

            if let Some(ttl) = ttl {
                tokio::time::sleep(ttl).await;
                if let Err(e) = http.delete_message(channel_id, sent.id, None).await {
                    debug!("Could not delete expired notice {}: {:?}", sent.id, e);
                }
            }
        });
    }

    fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) {
        let Some(http) = self.http() else { return };

        tokio::spawn(async move {
            if let Err(e) = http.delete_message(channel_id, message_id, None).await {
                warn!("Could not delete message {}: {:?}", message_id, e);
            }
        });
    }

    fn bot_permissions(&self, guild_id: GuildId, channel_id: ChannelId) -> Permissions {
        match self.current_user_id() {
            Some(user_id) => self.permissions_of(guild_id, channel_id, user_id),
            None => Permissions::empty(),
        }
    }

    fn user_permissions(&self, guild_id: GuildId, channel_id: ChannelId, user_id: UserId) -> Permissions {
        self.permissions_of(guild_id, channel_id, user_id)
    }

    fn self_voice_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let cache = self.cache()?;
        let self_id = cache.current_user().id;
        let guild = cache.guild(guild_id)?;
        guild.voice_states.get(&self_id).and_then(|state| state.channel_id)
    }
}
