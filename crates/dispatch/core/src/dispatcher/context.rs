use super::{BarrierCallback, DispatcherScript, DispatcherState};
use crate::action::DispatchableAction;
use crate::entity::EntityRegistry;
use crate::system::{AbortRequest, ActionDispatchSystem};
use crate::types::{ActionId, DispatcherId, EntityId, FinishTag, NodeId};

/// Handle given to script hooks for driving their dispatcher.
///
/// Action management always routes to the main dispatcher, so scripts of
/// sub-dispatchers use the same calls as top-level scripts.
pub struct ScriptContext<'a> {
    system: &'a mut ActionDispatchSystem,
    dispatcher: DispatcherId,
}

impl<'a> ScriptContext<'a> {
    pub(crate) fn new(system: &'a mut ActionDispatchSystem, dispatcher: DispatcherId) -> Self {
        Self { system, dispatcher }
    }

    /// Dispatcher whose script is running.
    pub fn dispatcher(&self) -> DispatcherId {
        self.dispatcher
    }

    /// Outermost dispatcher of the ownership chain.
    pub fn main_dispatcher(&self) -> DispatcherId {
        self.system.main_dispatcher(self.dispatcher)
    }

    pub fn state(&self) -> Option<DispatcherState> {
        self.system.state(self.dispatcher)
    }

    pub fn leader(&self) -> Option<EntityId> {
        self.system
            .dispatcher(self.main_dispatcher())
            .and_then(|d| d.leader())
    }

    pub fn entities(&self) -> &EntityRegistry {
        self.system.entities()
    }

    pub fn clock(&self) -> u64 {
        self.system.clock()
    }

    /// Creates an action and hands it to the main dispatcher.
    ///
    /// Returns `None` when the action could not be activated; if the action
    /// reported itself invalid the whole dispatcher is aborting by then.
    pub fn activate(
        &mut self,
        name: impl Into<String>,
        action: impl DispatchableAction + 'static,
    ) -> Option<ActionId> {
        let id = self.system.create_action(name, action);
        let main = self.main_dispatcher();
        if self.system.invoke_for(main, id, self.dispatcher) {
            Some(id)
        } else {
            self.system.discard_action(id);
            None
        }
    }

    /// Hands an already created action to the main dispatcher.
    pub fn invoke(&mut self, action: ActionId) -> bool {
        let main = self.main_dispatcher();
        self.system.invoke_for(main, action, self.dispatcher)
    }

    /// Finishes this dispatcher with `tag`.
    pub fn finish(&mut self, tag: impl Into<FinishTag>) {
        self.system.finish_dispatch(self.dispatcher, tag.into());
    }

    /// Aborts the main dispatcher and every owned action.
    pub fn abort(&mut self) {
        self.system
            .abort_dispatch(self.dispatcher, AbortRequest::new());
    }

    /// Enters the barrier `node` as participant `index` of `participants`.
    pub fn enter_barrier(&mut self, node: NodeId, index: usize, participants: usize) -> bool {
        self.system
            .enter_together_flow_control(self.dispatcher, node, index, participants)
    }

    /// Like [`enter_barrier`](Self::enter_barrier), registering `on_complete`
    /// to run once when the last participant arrives.
    pub fn enter_barrier_with(
        &mut self,
        node: NodeId,
        index: usize,
        participants: usize,
        on_complete: BarrierCallback,
    ) -> bool {
        self.system.enter_together_flow_control_with(
            self.dispatcher,
            node,
            index,
            participants,
            on_complete,
        )
    }

    /// Creates a sub-dispatcher under this one, registers it under `node` and
    /// runs its start hook.
    pub fn active_sub_dispatcher(
        &mut self,
        node: NodeId,
        name: impl Into<String>,
        script: impl DispatcherScript + 'static,
    ) -> DispatcherId {
        let sub = self
            .system
            .create_sub_dispatcher(self.dispatcher, name, script);
        self.system.active_sub_dispatcher(self.dispatcher, node, sub);
        sub
    }

    /// Re-enters the sub-dispatcher registered under `node`, if any.
    pub fn try_active_sub_dispatcher(&mut self, node: NodeId) -> bool {
        self.system.try_active_sub_dispatcher(self.dispatcher, node)
    }

    /// Direct access to the system for anything not covered above.
    pub fn system(&mut self) -> &mut ActionDispatchSystem {
        self.system
    }
}
