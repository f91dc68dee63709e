//! Error types surfaced by dispatch operations.

use crate::dispatcher::DispatcherState;
use crate::error::{DispatchFailure, ErrorSeverity};
use crate::persist::PersistenceError;
use crate::reference::ReferenceRefusal;
use crate::types::{ActionId, DispatcherId, EntityId};

/// Why `CanStartDispatcher` / `IsDispatcherValid` evaluated to false.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StartRefusal {
    #[error("leader {0} no longer resolves")]
    LeaderLost(EntityId),

    #[error("script rejected the start")]
    ScriptRejected,

    #[error("script reports the dispatcher invalid")]
    ScriptInvalid,

    #[error("{dispatcher}: {refusal}")]
    Reference {
        dispatcher: String,
        refusal: ReferenceRefusal,
    },

    #[error("action {0} cannot be reactivated")]
    ActionInvalid(ActionId),
}

impl DispatchFailure for StartRefusal {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::LeaderLost(_) | Self::ActionInvalid(_) => ErrorSeverity::Recoverable,
            Self::ScriptRejected | Self::ScriptInvalid => ErrorSeverity::Validation,
            Self::Reference { refusal, .. } => refusal.severity(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::LeaderLost(_) => "leader_lost",
            Self::ScriptRejected => "script_rejected",
            Self::ScriptInvalid => "script_invalid",
            Self::Reference { refusal, .. } => refusal.error_code(),
            Self::ActionInvalid(_) => "action_invalid",
        }
    }
}

/// Errors returned by [`ActionDispatchSystem`](super::ActionDispatchSystem)
/// operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown dispatcher {0}")]
    UnknownDispatcher(DispatcherId),

    #[error("unknown action {0}")]
    UnknownAction(ActionId),

    #[error("dispatcher {dispatcher} cannot start: {refusal}")]
    StartRefused {
        dispatcher: String,
        refusal: StartRefusal,
    },

    #[error("dispatcher {0} can only be driven on the authority")]
    NotAuthority(String),

    #[error("dispatcher {dispatcher} is {state}, expected {expected}")]
    UnexpectedState {
        dispatcher: String,
        state: DispatcherState,
        expected: DispatcherState,
    },

    #[error("{0} is a sub-dispatcher; use its main dispatcher")]
    SubDispatcher(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl DispatchFailure for DispatchError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::UnknownDispatcher(_) | Self::UnknownAction(_) | Self::SubDispatcher(_) => {
                ErrorSeverity::Internal
            }
            Self::StartRefused { refusal, .. } => refusal.severity(),
            Self::NotAuthority(_) => ErrorSeverity::Validation,
            Self::UnexpectedState { .. } => ErrorSeverity::Recoverable,
            Self::Persistence(e) => e.severity(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownDispatcher(_) => "unknown_dispatcher",
            Self::UnknownAction(_) => "unknown_action",
            Self::StartRefused { refusal, .. } => refusal.error_code(),
            Self::NotAuthority(_) => "not_authority",
            Self::UnexpectedState { .. } => "unexpected_state",
            Self::SubDispatcher(_) => "sub_dispatcher",
            Self::Persistence(e) => e.error_code(),
        }
    }
}
