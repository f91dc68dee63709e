//! Action lifecycle contract.
//!
//! An action is a unit of owned behavior ("move to point", "play sequence").
//! The dispatch system drives it through its lifecycle: it sets the
//! [`ActionState`] itself and then runs the matching hook of
//! [`DispatchableAction`]. Implementations never see dispatcher internals;
//! they talk back through [`ActionContext`].

mod context;
mod slot;

pub use context::ActionContext;
pub(crate) use slot::{ActionHook, ActionSlot};

use serde::{Deserialize, Serialize};

use crate::entity::EntityRegistry;
use crate::persist::SaveState;

/// Lifecycle state of an action.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ActionState {
    /// Not running. Initial state, and the resting state after deactivation,
    /// a completed abort, or a save.
    #[default]
    Deactive,
    /// Running under its owning dispatcher.
    Active,
    /// Asked to abort; waiting for the action to report completion.
    Aborting,
    /// Reported itself invalid at activation time. Terminal for this run.
    Invalid,
}

impl ActionState {
    /// Active and aborting actions still hold on to world state.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active | Self::Aborting)
    }

    pub fn is_terminal_failed(self) -> bool {
        matches!(self, Self::Invalid)
    }
}

/// Result of [`DispatchableAction::when_action_aborted`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortProgress {
    /// The action stopped synchronously.
    Completed,
    /// The action needs more time (e.g. blending out an animation) and will
    /// call [`ActionContext::abort_finished`] when done.
    Pending,
}

/// Host-delivered notification addressed to a running action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSignal {
    /// An asynchronous request the action issued (path following, sequence
    /// playback) completed.
    Completed { request: u64, succeeded: bool },
    /// Free-form script signal.
    Custom(String),
}

/// Behavior of a concrete action type.
///
/// All hooks run synchronously on the simulation thread and may call back into
/// the dispatch system through the context. A hook addressed to an action
/// whose hook is already running is queued and runs right after it returns.
pub trait DispatchableAction: SaveState + Send {
    /// Whether the action can be activated now. Checked at activation and
    /// before a saved dispatcher is reactivated.
    fn is_action_valid(&self, _entities: &EntityRegistry) -> bool {
        true
    }

    /// The action became active and should start doing its work.
    fn when_action_actived(&mut self, ctx: &mut ActionContext<'_>);

    /// The action was deactivated without being aborted: it finished, its
    /// dispatcher finished or was suspended, or it requested the abort itself.
    fn when_action_deactived(&mut self, _ctx: &mut ActionContext<'_>) {}

    /// The owning dispatcher is aborting.
    fn when_action_aborted(&mut self, _ctx: &mut ActionContext<'_>) -> AbortProgress {
        AbortProgress::Completed
    }

    /// The action is resumed from saved state.
    fn when_action_reactived(&mut self, ctx: &mut ActionContext<'_>) {
        self.when_action_actived(ctx);
    }

    /// A host signal arrived while the action was active.
    fn on_signal(&mut self, _ctx: &mut ActionContext<'_>, _signal: &ActionSignal) {}
}
