use serenity::model::permissions::Permissions;
use std::time::Duration;
use thiserror::Error;

use crate::hub::HubError;
use crate::ui::Notice;

/// Why a command was turned down before running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreflightFailure {
    #[error("invoker is not in a voice channel")]
    NotInVoice,

    #[error("invoker is in a different voice channel than the bot")]
    WrongVoiceChannel,

    #[error("bot is missing permissions: {0:?}")]
    MissingBotPermissions(Permissions),

    #[error("invoker is missing permissions: {0:?}")]
    MissingUserPermissions(Permissions),

    #[error("command on cooldown for {0:?}")]
    CooldownActive(Duration),
}

impl PreflightFailure {
    pub fn notice(&self) -> Notice {
        match self {
            PreflightFailure::NotInVoice => Notice::NotInVoice,
            PreflightFailure::WrongVoiceChannel => Notice::WrongVoiceChannel,
            PreflightFailure::MissingBotPermissions(missing) => Notice::MissingBotPermissions(*missing),
            PreflightFailure::MissingUserPermissions(missing) => Notice::MissingUserPermissions(*missing),
            PreflightFailure::CooldownActive(remaining) => Notice::CooldownActive(*remaining),
        }
    }
}

/// Every way dispatching a command can go wrong.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    UserInput(#[from] PreflightFailure),

    /// Handled by running the command locally instead.
    #[error("hub unavailable: {0}")]
    TransientDispatch(#[from] HubError),

    #[error("no resolution from the hub in time")]
    Timeout,

    #[error("no process has capacity for the command")]
    BackendUnavailable,

    #[error("command failed: {0:#}")]
    Unexpected(#[from] anyhow::Error),
}

impl DispatchError {
    /// What the invoker is told, if anything.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            DispatchError::UserInput(failure) => Some(failure.notice()),
            DispatchError::TransientDispatch(_) => None,
            DispatchError::Timeout => Some(Notice::DispatchTimeout),
            DispatchError::BackendUnavailable => Some(Notice::NoCapacity),
            DispatchError::Unexpected(e) => Some(Notice::Error(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_hub_errors_stay_silent() {
        assert_eq!(DispatchError::from(HubError::NotConnected).notice(), None);
    }

    #[test]
    fn user_errors_map_to_their_notice() {
        let err = DispatchError::from(PreflightFailure::MissingBotPermissions(Permissions::SPEAK));

        assert_eq!(err.notice(), Some(Notice::MissingBotPermissions(Permissions::SPEAK)));
    }

    #[test]
    fn unexpected_failures_get_a_generic_error() {
        let err = DispatchError::from(anyhow::anyhow!("boom"));

        assert_eq!(err.notice(), Some(Notice::Error("boom".to_string())));
    }
}
