//! # Bot Module
//!
//! Discord side of Ensemble Music.
//!
//! Inbound chat messages are turned into [`router::InboundMessage`]s and
//! handed to the [`router::CommandRouter`], which parses the prefix, runs the
//! preflight checks and either dispatches the command through the hub or runs
//! it locally.
//!
//! ## Architecture
//!
//! - [`MusicBot`] implements Serenity's [`EventHandler`] and only translates
//!   gateway events; it holds no playback state.
//! - [`commands`] holds the static command registry.
//! - [`pending`] tracks commands waiting for a hub resolution.
//! - [`gateway`] is the outbound side (notices, permissions, voice state).

use serenity::{
    all::{Context, EventHandler, Message, Ready},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, info};

pub mod commands;
pub mod cooldown;
pub mod errors;
pub mod gateway;
pub mod pending;
pub mod router;

#[cfg(test)]
pub mod testing;

use router::{CommandRouter, DispatchOutcome, InboundMessage};

/// Serenity event handler that feeds chat messages to the command router.
pub struct MusicBot {
    router: Arc<CommandRouter>,
}

impl MusicBot {
    pub fn new(router: Arc<CommandRouter>) -> Self {
        Self { router }
    }
}

/// Snapshot of what the cache knows about `msg` at arrival time.
fn inbound_from(ctx: &Context, msg: &Message) -> InboundMessage {
    let (member_voice_channel_id, self_voice_channel_id) = msg
        .guild_id
        .and_then(|guild_id| {
            let guild = ctx.cache.guild(guild_id)?;
            let self_id = ctx.cache.current_user().id;
            let channel_of = |user_id| guild.voice_states.get(&user_id).and_then(|state| state.channel_id);
            Some((channel_of(msg.author.id), channel_of(self_id)))
        })
        .unwrap_or((None, None));

    InboundMessage {
        author_id: msg.author.id,
        is_bot: msg.author.bot,
        guild_id: msg.guild_id,
        channel_id: msg.channel_id,
        message_id: msg.id,
        content: msg.content.clone(),
        mentioned_user_ids: msg.mentions.iter().map(|user| user.id).collect(),
        member_voice_channel_id,
        self_voice_channel_id,
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let inbound = inbound_from(&ctx, &msg);
        let outcome = self.router.handle(inbound).await;

        if outcome != DispatchOutcome::Ignored {
            debug!(message_id = %msg.id, ?outcome, "Message handled");
        }
    }
}
