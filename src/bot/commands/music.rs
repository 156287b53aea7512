use anyhow::Result;
use async_trait::async_trait;
use serenity::model::permissions::Permissions;
use std::time::Duration;
use tracing::{info, warn};

use super::{CommandCategory, CommandContext, CommandDescriptor, CommandEnv, CommandResult, PrefixCommand};
use crate::audio::{
    scheduler::Enqueued,
    track::{LoadResult, LoopMode},
};
use crate::bot::cooldown::CooldownScope;
use crate::ui::Notice;

const QUEUE_PAGE_SIZE: usize = 10;

/// Direct links are loaded as-is; anything else becomes a search.
fn build_query(raw: &str) -> String {
    let raw = raw.trim();
    match url::Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => raw.to_string(),
        _ => format!("ytsearch:{}", raw),
    }
}

/// Reproduce una canción o playlist
pub struct Play {
    descriptor: CommandDescriptor,
}

impl Play {
    pub fn new() -> Self {
        Self {
            descriptor: CommandDescriptor::new("play", CommandCategory::Music)
                .aliases(&["p"])
                .usage("play <song name | url>")
                .cooldown(Duration::from_secs(5))
                .cooldown_scope(CooldownScope::UserGuild)
                .bot_permissions(Permissions::CONNECT | Permissions::SPEAK)
                .requires_voice(),
        }
    }
}

#[async_trait]
impl PrefixCommand for Play {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &CommandContext, env: &CommandEnv) -> Result<CommandResult> {
        if ctx.args.is_empty() {
            return Ok(CommandResult::InvalidArguments);
        }

        let manager = env.managers.get_or_create(ctx.guild_id, ctx.channel_id);

        if ctx.bot_voice_channel_id.is_none() {
            let Some(voice_channel_id) = ctx.voice_channel_id else {
                return Ok(CommandResult::Error("not in a voice channel".to_string()));
            };
            if let Err(e) = env.backend.connect_voice(ctx.guild_id, voice_channel_id).await {
                warn!("Error joining voice in guild {}: {:?}", ctx.guild_id, e);
                return Ok(CommandResult::Error(e.to_string()));
            }
        }

        let query = build_query(&ctx.raw_args);
        info!("🔍 Loading '{}' for guild {}", query, ctx.guild_id);

        match env.backend.load_track(&query).await? {
            LoadResult::Track(track) => match manager.scheduler.enqueue(track.clone()).await? {
                // The now-playing notice follows from the start event.
                Enqueued::Started => {}
                Enqueued::Queued { position } => env.reply(ctx, Notice::TrackQueued { track, position }),
            },
            LoadResult::Playlist { name, tracks } => {
                let count = manager.scheduler.enqueue_playlist(tracks).await?;
                env.reply(ctx, Notice::PlaylistQueued { name, count });
            }
            LoadResult::NoMatches => env.reply(ctx, Notice::NoMatches(ctx.raw_args.clone())),
            LoadResult::LoadFailed(reason) => env.reply(ctx, Notice::LoadFailed(reason)),
        }

        Ok(CommandResult::Success)
    }
}

pub struct Skip {
    descriptor: CommandDescriptor,
}

impl Skip {
    pub fn new() -> Self {
        Self {
            descriptor: CommandDescriptor::new("skip", CommandCategory::Music)
                .aliases(&["s", "next"])
                .usage("skip")
                .cooldown_scope(CooldownScope::Guild),
        }
    }
}

#[async_trait]
impl PrefixCommand for Skip {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &CommandContext, env: &CommandEnv) -> Result<CommandResult> {
        let manager = env.managers.get_or_create(ctx.guild_id, ctx.channel_id);

        let notice = if manager.scheduler.skip().await? {
            Notice::Skipped
        } else {
            Notice::NothingPlaying
        };
        env.reply(ctx, notice);
        Ok(CommandResult::Success)
    }
}

pub struct Back {
    descriptor: CommandDescriptor,
}

impl Back {
    pub fn new() -> Self {
        Self {
            descriptor: CommandDescriptor::new("back", CommandCategory::Music)
                .aliases(&["b", "previous"])
                .usage("back")
                .cooldown_scope(CooldownScope::Guild),
        }
    }
}

#[async_trait]
impl PrefixCommand for Back {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &CommandContext, env: &CommandEnv) -> Result<CommandResult> {
        let manager = env.managers.get_or_create(ctx.guild_id, ctx.channel_id);

        // An empty history is reported by the scheduler itself.
        if manager.scheduler.back().await? {
            env.reply(ctx, Notice::WentBack);
        }
        Ok(CommandResult::Success)
    }
}

pub struct Loop {
    descriptor: CommandDescriptor,
}

impl Loop {
    pub fn new() -> Self {
        Self {
            descriptor: CommandDescriptor::new("loop", CommandCategory::Music)
                .aliases(&["l", "repeat"])
                .usage("loop [none | track | queue]"),
        }
    }
}

#[async_trait]
impl PrefixCommand for Loop {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &CommandContext, env: &CommandEnv) -> Result<CommandResult> {
        let manager = env.managers.get_or_create(ctx.guild_id, ctx.channel_id);

        let mode = match ctx.args.first() {
            None => manager.scheduler.loop_mode().await.next(),
            Some(arg) => match arg.parse::<LoopMode>() {
                Ok(mode) => mode,
                Err(_) => return Ok(CommandResult::InvalidArguments),
            },
        };

        manager.scheduler.set_loop_mode(mode).await;
        env.reply(ctx, Notice::LoopModeChanged(mode));
        Ok(CommandResult::Success)
    }
}

pub struct Remove {
    descriptor: CommandDescriptor,
}

impl Remove {
    pub fn new() -> Self {
        Self {
            descriptor: CommandDescriptor::new("remove", CommandCategory::Music)
                .aliases(&["rm"])
                .usage("remove <position>"),
        }
    }
}

#[async_trait]
impl PrefixCommand for Remove {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &CommandContext, env: &CommandEnv) -> Result<CommandResult> {
        let Some(position) = ctx.args.first().and_then(|arg| arg.parse::<usize>().ok()).filter(|&p| p > 0) else {
            return Ok(CommandResult::InvalidArguments);
        };

        let manager = env.managers.get_or_create(ctx.guild_id, ctx.channel_id);
        match manager.scheduler.remove_track(position - 1).await {
            Some(track) => env.reply(ctx, Notice::Removed(track)),
            None => env.reply(ctx, Notice::IndexOutOfRange(position)),
        }
        Ok(CommandResult::Success)
    }
}

/// Muestra la cola de reproducción
pub struct Queue {
    descriptor: CommandDescriptor,
}

impl Queue {
    pub fn new() -> Self {
        Self {
            descriptor: CommandDescriptor::new("queue", CommandCategory::Music)
                .aliases(&["q"])
                .usage("queue"),
        }
    }
}

#[async_trait]
impl PrefixCommand for Queue {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &CommandContext, env: &CommandEnv) -> Result<CommandResult> {
        let manager = env.managers.get_or_create(ctx.guild_id, ctx.channel_id);
        let snapshot = manager.scheduler.snapshot().await;

        if snapshot.current.is_none() && snapshot.queue.is_empty() {
            env.reply(ctx, Notice::NothingPlaying);
            return Ok(CommandResult::Success);
        }

        let total = snapshot.queue.len();
        env.reply(
            ctx,
            Notice::QueueListing {
                current: snapshot.current,
                upcoming: snapshot.queue.into_iter().take(QUEUE_PAGE_SIZE).collect(),
                total,
                loop_mode: snapshot.loop_mode,
            },
        );
        Ok(CommandResult::Success)
    }
}
