use std::collections::VecDeque;

use super::{ActionSignal, ActionState, DispatchableAction};
use crate::types::DispatcherId;

/// Hook invocation addressed to an action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ActionHook {
    Actived,
    Deactived,
    Aborted,
    Reactived,
    Signal(ActionSignal),
}

/// System-side record of one action.
///
/// `behavior` is `None` while one of its hooks is running; hooks addressed to
/// it in the meantime wait in `deferred`. `released` marks a slot whose
/// dispatcher let go of it while its hook was running, so the slot is dropped
/// once the hook returns.
pub(crate) struct ActionSlot {
    pub(crate) name: String,
    pub(crate) kind: &'static str,
    pub(crate) state: ActionState,
    pub(crate) owner: Option<DispatcherId>,
    /// Dispatcher whose script is told when the action finishes. Differs
    /// from `owner` when a sub-dispatcher launched the action.
    pub(crate) listener: Option<DispatcherId>,
    pub(crate) behavior: Option<Box<dyn DispatchableAction>>,
    pub(crate) deferred: VecDeque<ActionHook>,
    pub(crate) released: bool,
}

impl ActionSlot {
    pub(crate) fn new(name: String, behavior: Box<dyn DispatchableAction>) -> Self {
        Self {
            name,
            kind: behavior.kind(),
            state: ActionState::Deactive,
            owner: None,
            listener: None,
            behavior: Some(behavior),
            deferred: VecDeque::new(),
            released: false,
        }
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.behavior.is_none()
    }
}
