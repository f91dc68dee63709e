use crate::config::DispatchConfig;
use crate::entity::EntityRegistry;
use crate::system::{AbortRequest, ActionDispatchSystem};
use crate::types::{ActionEvent, ActionId, DispatcherId};

/// Handle given to action hooks for talking back to the dispatch system.
pub struct ActionContext<'a> {
    system: &'a mut ActionDispatchSystem,
    action: ActionId,
}

impl<'a> ActionContext<'a> {
    pub(crate) fn new(system: &'a mut ActionDispatchSystem, action: ActionId) -> Self {
        Self { system, action }
    }

    pub fn action(&self) -> ActionId {
        self.action
    }

    /// Dispatcher currently owning this action.
    pub fn owner(&self) -> Option<DispatcherId> {
        self.system.action_owner(self.action)
    }

    pub fn entities(&self) -> &EntityRegistry {
        self.system.entities()
    }

    pub fn config(&self) -> &DispatchConfig {
        self.system.config()
    }

    /// Logical clock of the dispatch system.
    pub fn clock(&self) -> u64 {
        self.system.clock()
    }

    /// Completes the action with a named outcome. The action is deactivated
    /// and released, and the script that launched it is told the outcome.
    pub fn finish(&mut self, event: impl Into<ActionEvent>) {
        self.system.finish_action(self.action, event.into());
    }

    /// Completes an abort this action previously answered with
    /// [`AbortProgress::Pending`](super::AbortProgress::Pending).
    pub fn abort_finished(&mut self) {
        self.system.abort_finished(self.action);
    }

    /// Aborts the owning dispatcher. This action is only deactivated; every
    /// other owned action is aborted.
    pub fn request_abort_dispatch(&mut self) {
        if let Some(owner) = self.owner() {
            self.system
                .abort_dispatch(owner, AbortRequest::new().deactivating(self.action));
        }
    }

    /// Direct access to the system for anything not covered above.
    pub fn system(&mut self) -> &mut ActionDispatchSystem {
        self.system
    }
}
