//! Prefix commands: descriptors, the parsed invocation, and the static registry.

pub mod general;
pub mod music;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::model::{
    id::{ChannelId, GuildId, MessageId, UserId},
    permissions::Permissions,
};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use super::cooldown::CooldownScope;
use super::gateway::ChatGateway;
use crate::audio::{backend::AudioBackend, manager::MusicManagers};
use crate::ui::{HelpEntry, Notice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandCategory {
    General,
    Music,
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandCategory::General => write!(f, "general"),
            CommandCategory::Music => write!(f, "music"),
        }
    }
}

/// Static description of a command, fixed at startup.
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub category: CommandCategory,
    pub usage: &'static str,
    pub cooldown: Duration,
    pub cooldown_scope: CooldownScope,
    pub bot_permissions: Permissions,
    pub user_permissions: Permissions,
    pub requires_voice: bool,
    pub delete_invocation: bool,
}

impl CommandDescriptor {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(2);

    pub fn new(name: &'static str, category: CommandCategory) -> Self {
        Self {
            name,
            aliases: &[],
            category,
            usage: name,
            cooldown: Self::DEFAULT_COOLDOWN,
            cooldown_scope: CooldownScope::User,
            bot_permissions: Permissions::empty(),
            user_permissions: Permissions::empty(),
            requires_voice: false,
            delete_invocation: false,
        }
    }

    pub fn aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn usage(mut self, usage: &'static str) -> Self {
        self.usage = usage;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn cooldown_scope(mut self, scope: CooldownScope) -> Self {
        self.cooldown_scope = scope;
        self
    }

    pub fn bot_permissions(mut self, permissions: Permissions) -> Self {
        self.bot_permissions = permissions;
        self
    }

    pub fn user_permissions(mut self, permissions: Permissions) -> Self {
        self.user_permissions = permissions;
        self
    }

    pub fn requires_voice(mut self) -> Self {
        self.requires_voice = true;
        self
    }

    pub fn delete_invocation(mut self) -> Self {
        self.delete_invocation = true;
        self
    }

    /// Music commands always need the invoker in voice.
    pub fn needs_voice(&self) -> bool {
        self.category == CommandCategory::Music || self.requires_voice
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }

    pub fn cooldown_key(&self, ctx: &CommandContext) -> String {
        self.cooldown_scope.key(self.name, ctx.author_id, ctx.guild_id)
    }

    pub fn help_entry(&self) -> HelpEntry {
        HelpEntry {
            category: self.category.to_string(),
            name: self.name.to_string(),
            aliases: self.aliases.iter().map(|alias| alias.to_string()).collect(),
            usage: self.usage.to_string(),
        }
    }
}

/// One inbound message parsed into a command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandContext {
    /// Also the correlation id while the command is pending on the hub.
    pub message_id: MessageId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub voice_channel_id: Option<ChannelId>,
    pub bot_voice_channel_id: Option<ChannelId>,
    /// Canonical command name, aliases already resolved.
    pub command: String,
    pub args: Vec<String>,
    pub raw_args: String,
    pub prefix: String,
    pub is_mention_prefix: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    Success,
    Error(String),
    CooldownActive(Duration),
    InsufficientPermissions,
    InvalidArguments,
}

/// Shared handles every command runs with.
pub struct CommandEnv {
    pub managers: Arc<MusicManagers>,
    pub backend: Arc<dyn AudioBackend>,
    pub gateway: Arc<dyn ChatGateway>,
    pub help: Vec<HelpEntry>,
}

impl CommandEnv {
    /// Answers the invoking message with `notice`.
    pub fn reply(&self, ctx: &CommandContext, notice: Notice) {
        let ttl = notice.default_ttl();
        self.gateway.notify(ctx.channel_id, Some(ctx.message_id), notice, ttl);
    }
}

#[async_trait]
pub trait PrefixCommand: Send + Sync {
    fn descriptor(&self) -> &CommandDescriptor;

    async fn execute(&self, ctx: &CommandContext, env: &CommandEnv) -> Result<CommandResult>;
}

/// Commands by name and alias, built once at startup.
pub struct CommandRegistry {
    commands: Vec<Arc<dyn PrefixCommand>>,
    lookup: HashMap<String, usize>,
}

impl CommandRegistry {
    /// Fails when two commands claim the same name or alias.
    pub fn new(commands: Vec<Arc<dyn PrefixCommand>>) -> Result<Self> {
        let mut lookup = HashMap::new();

        for (index, command) in commands.iter().enumerate() {
            for name in command.descriptor().names() {
                if let Some(previous) = lookup.insert(name.to_lowercase(), index) {
                    anyhow::bail!(
                        "Command name '{}' of '{}' already taken by '{}'",
                        name,
                        command.descriptor().name,
                        commands[previous].descriptor().name
                    );
                }
            }
        }

        Ok(Self { commands, lookup })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(vec![
            Arc::new(general::Ping::new()),
            Arc::new(general::Help::new()),
            Arc::new(music::Play::new()),
            Arc::new(music::Skip::new()),
            Arc::new(music::Back::new()),
            Arc::new(music::Loop::new()),
            Arc::new(music::Remove::new()),
            Arc::new(music::Queue::new()),
        ])
    }

    /// Case-insensitive lookup by name or alias.
    pub fn find(&self, name: &str) -> Option<Arc<dyn PrefixCommand>> {
        self.lookup
            .get(&name.to_lowercase())
            .map(|&index| self.commands[index].clone())
    }

    /// Help listing, grouped by category.
    pub fn help_entries(&self) -> Vec<HelpEntry> {
        let mut descriptors: Vec<&CommandDescriptor> = self.commands.iter().map(|c| c.descriptor()).collect();
        descriptors.sort_by_key(|descriptor| descriptor.category);
        descriptors.into_iter().map(CommandDescriptor::help_entry).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
