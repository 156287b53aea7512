use chrono::Utc;
use regex::Regex;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::commands::{
    CommandCategory, CommandContext, CommandDescriptor, CommandEnv, CommandRegistry, CommandResult, PrefixCommand,
};
use super::cooldown::{CooldownManager, CooldownReservation};
use super::errors::{DispatchError, PreflightFailure};
use super::pending::{PendingCommandTable, Resolved};
use crate::config::Config;
use crate::hub::schema::{DispatchRequest, Resolution, Topic};
use crate::hub::SyncTransport;
use crate::storage::GuildSettingsStore;
use crate::ui::Notice;

/// The parts of a chat message the router looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub author_id: UserId,
    pub is_bot: bool,
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub content: String,
    pub mentioned_user_ids: Vec<UserId>,
    pub member_voice_channel_id: Option<ChannelId>,
    pub self_voice_channel_id: Option<ChannelId>,
}

/// How handling one message ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Not a command for this bot.
    Ignored,
    /// Unknown command after a mention; the greeting was sent.
    Greeted,
    Rejected(PreflightFailure),
    Executed {
        result: CommandResult,
        /// Whether the hub told this process to run it.
        distributed: bool,
    },
    NoCapacity,
    TimedOut,
    Failed,
}

impl DispatchOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(
            self,
            DispatchOutcome::Executed {
                result: CommandResult::Success,
                ..
            }
        )
    }
}

struct MatchedPrefix {
    prefix: String,
    is_mention: bool,
}

pub struct CommandRouter {
    registry: Arc<CommandRegistry>,
    env: CommandEnv,
    pending: Arc<PendingCommandTable>,
    cooldowns: Arc<CooldownManager>,
    transport: Arc<dyn SyncTransport>,
    settings: Arc<GuildSettingsStore>,
    default_prefix: String,
    process_id: String,
    dispatch_timeout: Duration,
    mention: Regex,
}

impl CommandRouter {
    pub fn new(
        config: &Config,
        registry: Arc<CommandRegistry>,
        env: CommandEnv,
        pending: Arc<PendingCommandTable>,
        cooldowns: Arc<CooldownManager>,
        transport: Arc<dyn SyncTransport>,
        settings: Arc<GuildSettingsStore>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            registry,
            env,
            pending,
            cooldowns,
            transport,
            settings,
            default_prefix: config.default_prefix.clone(),
            process_id: config.process_id.clone(),
            dispatch_timeout: config.dispatch_timeout(),
            mention: Regex::new(r"^<@!?(\d+)>")?,
        })
    }

    /// Handles one inbound message end to end. Never fails: every problem
    /// becomes an outcome and, where the invoker should know, a notice.
    pub async fn handle(&self, message: InboundMessage) -> DispatchOutcome {
        if message.is_bot {
            return DispatchOutcome::Ignored;
        }
        let Some(guild_id) = message.guild_id else {
            return DispatchOutcome::Ignored;
        };
        let Some(matched) = self.match_prefix(&message, guild_id).await else {
            return DispatchOutcome::Ignored;
        };

        let rest = message.content[matched.prefix.len()..].trim();
        let mut tokens = rest.split_whitespace();
        let Some(name) = tokens.next() else {
            return DispatchOutcome::Ignored;
        };

        let Some(command) = self.registry.find(name) else {
            if matched.is_mention {
                let prefix = self.settings.prefix(guild_id).await.unwrap_or_else(|| self.default_prefix.clone());
                self.env.gateway.notify(
                    message.channel_id,
                    Some(message.message_id),
                    Notice::MentionGreeting { prefix },
                    None,
                );
                return DispatchOutcome::Greeted;
            }
            return DispatchOutcome::Ignored;
        };

        let ctx = CommandContext {
            message_id: message.message_id,
            guild_id,
            channel_id: message.channel_id,
            author_id: message.author_id,
            voice_channel_id: message.member_voice_channel_id,
            bot_voice_channel_id: message.self_voice_channel_id,
            command: command.descriptor().name.to_string(),
            args: tokens.map(str::to_string).collect(),
            raw_args: rest[name.len()..].trim().to_string(),
            prefix: matched.prefix,
            is_mention_prefix: matched.is_mention,
            created_at: Utc::now(),
        };

        let reservation = match self.preflight(command.descriptor(), &ctx) {
            Ok(reservation) => reservation,
            Err(failure) => {
                debug!(message_id = %ctx.message_id, command = %ctx.command, "Rejected: {}", failure);
                self.reply_error(&ctx, DispatchError::UserInput(failure.clone()));
                return DispatchOutcome::Rejected(failure);
            }
        };

        let outcome = self.dispatch(command, ctx).await;

        // The cooldown only sticks to commands that actually went through.
        if let Some(reservation) = reservation {
            if !outcome.succeeded() {
                self.cooldowns.release(reservation);
            }
        }
        outcome
    }

    /// Self-mention first, then the guild's prefix, then the default one.
    async fn match_prefix(&self, message: &InboundMessage, guild_id: GuildId) -> Option<MatchedPrefix> {
        if let Some(self_id) = self.env.gateway.current_user_id() {
            if let Some(captures) = self.mention.captures(&message.content) {
                let mentions_self = captures[1].parse::<u64>().ok() == Some(self_id.get())
                    && message.mentioned_user_ids.contains(&self_id);
                if mentions_self {
                    return Some(MatchedPrefix {
                        prefix: captures[0].to_string(),
                        is_mention: true,
                    });
                }
            }
        }

        let guild_prefix = self.settings.prefix(guild_id).await;
        let matched = [guild_prefix.as_deref(), Some(self.default_prefix.as_str())]
            .into_iter()
            .flatten()
            .find(|prefix| starts_with_ignore_case(&message.content, prefix))
            .map(|prefix| MatchedPrefix {
                prefix: message.content[..prefix.len()].to_string(),
                is_mention: false,
            });
        matched
    }

    /// Runs the checks in order and, once all pass, reserves the cooldown.
    fn preflight(
        &self,
        descriptor: &CommandDescriptor,
        ctx: &CommandContext,
    ) -> Result<Option<CooldownReservation>, PreflightFailure> {
        if descriptor.needs_voice() {
            let Some(member_channel) = ctx.voice_channel_id else {
                return Err(PreflightFailure::NotInVoice);
            };
            if ctx.bot_voice_channel_id.is_some_and(|bot_channel| bot_channel != member_channel) {
                return Err(PreflightFailure::WrongVoiceChannel);
            }
        }

        let permission_channel = match descriptor.needs_voice() {
            true => ctx.voice_channel_id.unwrap_or(ctx.channel_id),
            false => ctx.channel_id,
        };
        let granted = self.env.gateway.bot_permissions(ctx.guild_id, permission_channel);
        let missing = descriptor.bot_permissions - granted;
        if !missing.is_empty() {
            return Err(PreflightFailure::MissingBotPermissions(missing));
        }

        let granted = self.env.gateway.user_permissions(ctx.guild_id, ctx.channel_id, ctx.author_id);
        let missing = descriptor.user_permissions - granted;
        if !missing.is_empty() {
            return Err(PreflightFailure::MissingUserPermissions(missing));
        }

        self.cooldowns
            .try_acquire(&descriptor.cooldown_key(ctx), descriptor.cooldown)
            .map_err(PreflightFailure::CooldownActive)
    }

    async fn dispatch(&self, command: Arc<dyn PrefixCommand>, ctx: CommandContext) -> DispatchOutcome {
        if !self.transport.is_connected() {
            debug!(message_id = %ctx.message_id, "Hub disconnected, running locally");
            return self.execute(command.as_ref(), ctx, false).await;
        }

        let topic = match command.descriptor().category {
            CommandCategory::Music => Topic::MusicDispatch,
            CommandCategory::General => Topic::GenericDispatch,
        };
        let waiter = self.pending.put(ctx.clone());

        if let Err(e) = self.publish(topic, &ctx).await {
            warn!(message_id = %ctx.message_id, "{}, running locally", e);
            // A resolution can only have won if the publish actually went out.
            if let Some(ctx) = self.pending.take(ctx.message_id) {
                return self.execute(command.as_ref(), ctx, false).await;
            }
        }

        match self.await_resolution(ctx.message_id, waiter).await {
            Ok(Resolved {
                resolution: Resolution::Proceed,
                context,
            }) => self.execute(command.as_ref(), context, true).await,
            Ok(Resolved {
                resolution: Resolution::NoCapacity,
                context,
            }) => {
                info!(message_id = %context.message_id, "No process has capacity");
                self.reply_error(&context, DispatchError::BackendUnavailable);
                DispatchOutcome::NoCapacity
            }
            Err(e) => {
                warn!(message_id = %ctx.message_id, command = %ctx.command, "Command timed out");
                self.reply_error(&ctx, e);
                DispatchOutcome::TimedOut
            }
        }
    }

    async fn publish(&self, topic: Topic, ctx: &CommandContext) -> Result<(), DispatchError> {
        let request = DispatchRequest {
            topic,
            correlation_id: ctx.message_id,
            origin_process_id: self.process_id.clone(),
            guild_id: ctx.guild_id,
            channel_id: ctx.channel_id,
            voice_channel_id: ctx.voice_channel_id,
            args: ctx.args.clone(),
        };
        self.transport.publish(topic.as_str(), request.encode()?).await?;
        debug!(message_id = %ctx.message_id, topic = topic.as_str(), "Dispatch request published");
        Ok(())
    }

    /// Waits for the hub, bounded by the dispatch timeout. The pending table
    /// decides races: on timeout, whoever takes the entry first wins.
    async fn await_resolution(
        &self,
        message_id: MessageId,
        mut waiter: oneshot::Receiver<Resolved>,
    ) -> Result<Resolved, DispatchError> {
        match tokio::time::timeout(self.dispatch_timeout, &mut waiter).await {
            Ok(Ok(resolved)) => Ok(resolved),
            // Swept or replaced before anyone resolved it.
            Ok(Err(_)) => Err(DispatchError::Timeout),
            Err(_) => match self.pending.take(message_id) {
                Some(_) => Err(DispatchError::Timeout),
                None => waiter.await.map_err(|_| DispatchError::Timeout),
            },
        }
    }

    async fn execute(&self, command: &dyn PrefixCommand, ctx: CommandContext, distributed: bool) -> DispatchOutcome {
        let descriptor = command.descriptor();
        info!(message_id = %ctx.message_id, guild_id = %ctx.guild_id, "▶️ Running {}", descriptor.name);

        match command.execute(&ctx, &self.env).await {
            Ok(result) => {
                self.finish(descriptor, &ctx, &result);
                DispatchOutcome::Executed { result, distributed }
            }
            Err(e) => {
                error!(message_id = %ctx.message_id, "Error running {}: {:?}", descriptor.name, e);
                self.reply_error(&ctx, DispatchError::Unexpected(e));
                DispatchOutcome::Failed
            }
        }
    }

    fn finish(&self, descriptor: &CommandDescriptor, ctx: &CommandContext, result: &CommandResult) {
        match result {
            CommandResult::Success => {
                if descriptor.delete_invocation {
                    self.env.gateway.delete_message(ctx.channel_id, ctx.message_id);
                }
            }
            CommandResult::Error(message) => self.env.reply(ctx, Notice::Error(message.clone())),
            CommandResult::CooldownActive(remaining) => self.env.reply(ctx, Notice::CooldownActive(*remaining)),
            CommandResult::InsufficientPermissions => {}
            CommandResult::InvalidArguments => self.env.reply(
                ctx,
                Notice::InvalidArguments {
                    usage: format!("{}{}", ctx.prefix, descriptor.usage),
                },
            ),
        }
    }

    fn reply_error(&self, ctx: &CommandContext, error: DispatchError) {
        if let Some(notice) = error.notice() {
            self.env.reply(ctx, notice);
        }
    }
}

fn starts_with_ignore_case(content: &str, prefix: &str) -> bool {
    content
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
