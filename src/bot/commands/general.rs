use anyhow::Result;
use async_trait::async_trait;

use super::{CommandCategory, CommandContext, CommandDescriptor, CommandEnv, CommandResult, PrefixCommand};
use crate::ui::Notice;

pub struct Ping {
    descriptor: CommandDescriptor,
}

impl Ping {
    pub fn new() -> Self {
        Self {
            descriptor: CommandDescriptor::new("ping", CommandCategory::General).usage("ping"),
        }
    }
}

#[async_trait]
impl PrefixCommand for Ping {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &CommandContext, env: &CommandEnv) -> Result<CommandResult> {
        env.reply(ctx, Notice::Pong);
        Ok(CommandResult::Success)
    }
}

/// Lista todos los comandos disponibles
pub struct Help {
    descriptor: CommandDescriptor,
}

impl Help {
    pub fn new() -> Self {
        Self {
            descriptor: CommandDescriptor::new("help", CommandCategory::General)
                .aliases(&["h"])
                .usage("help"),
        }
    }
}

#[async_trait]
impl PrefixCommand for Help {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &CommandContext, env: &CommandEnv) -> Result<CommandResult> {
        env.reply(
            ctx,
            Notice::Help {
                prefix: ctx.prefix.clone(),
                commands: env.help.clone(),
            },
        );
        Ok(CommandResult::Success)
    }
}
