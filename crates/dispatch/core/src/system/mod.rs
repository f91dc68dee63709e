//! The dispatch system: sole owner of dispatchers, actions and claims.
//!
//! Every transition goes through [`ActionDispatchSystem`]. Scripts and actions
//! are boxed behaviors stored next to their bookkeeping; while one of their
//! hooks runs the behavior is checked out of its record, so the hook gets a
//! `&mut` to the whole system through its context. Hooks addressed to a
//! behavior that is checked out are queued on its record and run as soon as
//! the running hook returns. State bookkeeping is never queued.

mod errors;
mod flow;
mod lifecycle;
mod persist;
mod world;

pub use errors::{DispatchError, StartRefusal};

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use crate::action::{
    AbortProgress, ActionContext, ActionHook, ActionSlot, ActionState, DispatchableAction,
};
use crate::config::DispatchConfig;
use crate::dispatcher::{
    AbortCallback, DeactivatedCallback, Dispatcher, DispatcherScript, DispatcherState,
    FinishListener, ScriptContext, ScriptHook,
};
use crate::entity::{ClaimTable, EntityRegistry};
use crate::leader::LeaderMonitor;
use crate::manager::{DispatcherManager, DispatcherRegistry};
use crate::types::{ActionId, DispatcherId, EntityId, FinishTag};

/// Options of [`ActionDispatchSystem::abort_dispatch`].
#[derive(Default)]
pub struct AbortRequest {
    pub(crate) deactivate_target: Option<ActionId>,
    pub(crate) on_aborted: Option<AbortCallback>,
}

impl AbortRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deactivates `action` instead of aborting it. Used when the action
    /// itself asked for the abort.
    pub fn deactivating(mut self, action: ActionId) -> Self {
        self.deactivate_target = Some(action);
        self
    }

    /// Runs `callback` once when the abort completes.
    pub fn on_aborted(
        mut self,
        callback: impl FnOnce(&mut ActionDispatchSystem, DispatcherId) + Send + 'static,
    ) -> Self {
        self.on_aborted = Some(Box::new(callback));
        self
    }
}

impl std::fmt::Debug for AbortRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortRequest")
            .field("deactivate_target", &self.deactivate_target)
            .field("on_aborted", &self.on_aborted.is_some())
            .finish()
    }
}

/// Owner of every dispatcher, action and entity claim.
pub struct ActionDispatchSystem {
    config: DispatchConfig,
    clock: u64,
    entities: EntityRegistry,
    claims: ClaimTable,
    leaders: LeaderMonitor,
    dispatchers: BTreeMap<DispatcherId, Dispatcher>,
    actions: BTreeMap<ActionId, ActionSlot>,
    registry: DispatcherRegistry,
    managers: Vec<Box<dyn DispatcherManager>>,
    next_dispatcher: u32,
    next_action: u32,
}

impl ActionDispatchSystem {
    pub fn new(config: DispatchConfig) -> Self {
        Self::with_entities(config, EntityRegistry::new())
    }

    pub fn with_entities(config: DispatchConfig, entities: EntityRegistry) -> Self {
        Self {
            config,
            clock: 0,
            entities,
            claims: ClaimTable::new(),
            leaders: LeaderMonitor::default(),
            dispatchers: BTreeMap::new(),
            actions: BTreeMap::new(),
            registry: DispatcherRegistry::new(),
            managers: Vec::new(),
            next_dispatcher: 1,
            next_action: 1,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Logical clock, advanced by [`tick`](Self::tick).
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    /// Mutable entity access for spawning. Removing entities should go
    /// through [`destroy_entity`](Self::destroy_entity) so leader loss is
    /// observed.
    pub fn entities_mut(&mut self) -> &mut EntityRegistry {
        &mut self.entities
    }

    pub fn claims(&self) -> &ClaimTable {
        &self.claims
    }

    /// Built-in manager tracking active managed dispatchers.
    pub fn registry(&self) -> &DispatcherRegistry {
        &self.registry
    }

    /// Adds a manager notified of every managed dispatcher transition.
    pub fn add_manager(&mut self, manager: impl DispatcherManager + 'static) {
        self.managers.push(Box::new(manager));
    }

    pub fn add_boxed_manager(&mut self, manager: Box<dyn DispatcherManager>) {
        self.managers.push(manager);
    }

    // ===== dispatchers =====

    /// Creates a top-level dispatcher in the `Deactive` state.
    pub fn create_dispatcher(
        &mut self,
        name: impl Into<String>,
        script: impl DispatcherScript + 'static,
    ) -> DispatcherId {
        self.insert_dispatcher(name.into(), None, Box::new(script))
    }

    /// [`create_dispatcher`](Self::create_dispatcher) for scripts already
    /// boxed, e.g. sent across a channel.
    pub fn create_boxed_dispatcher(
        &mut self,
        name: impl Into<String>,
        script: Box<dyn DispatcherScript>,
    ) -> DispatcherId {
        self.insert_dispatcher(name.into(), None, script)
    }

    /// Creates a sub-dispatcher record under `parent`. It does nothing until
    /// [`active_sub_dispatcher`](Self::active_sub_dispatcher) registers it.
    pub fn create_sub_dispatcher(
        &mut self,
        parent: DispatcherId,
        name: impl Into<String>,
        script: impl DispatcherScript + 'static,
    ) -> DispatcherId {
        assert!(
            self.dispatchers.contains_key(&parent),
            "sub-dispatcher created under unknown dispatcher {parent}"
        );
        self.insert_dispatcher(name.into(), Some(parent), Box::new(script))
    }

    pub(crate) fn insert_dispatcher(
        &mut self,
        name: String,
        parent: Option<DispatcherId>,
        script: Box<dyn DispatcherScript>,
    ) -> DispatcherId {
        let id = DispatcherId(self.next_dispatcher);
        self.next_dispatcher += 1;
        let dispatcher = Dispatcher::new(id, name, parent, script);
        if self.config.warn_unset_references
            && let Some(script) = dispatcher.script.as_ref()
        {
            crate::reference::warn_unset(
                &dispatcher.debug_name(),
                &script.declared_references(),
            );
        }
        trace!("created dispatcher {}", dispatcher.debug_name());
        self.dispatchers.insert(id, dispatcher);
        id
    }

    pub fn dispatcher(&self, id: DispatcherId) -> Option<&Dispatcher> {
        self.dispatchers.get(&id)
    }

    /// All dispatcher records, sub-dispatchers included, in id order.
    pub fn dispatchers(&self) -> impl Iterator<Item = &Dispatcher> + '_ {
        self.dispatchers.values()
    }

    /// Effective state: a sub-dispatcher reports its main dispatcher's state.
    pub fn state(&self, id: DispatcherId) -> Option<DispatcherState> {
        self.dispatchers
            .get(&self.main_dispatcher(id))
            .map(|d| d.state)
    }

    pub fn is_sub_dispatcher(&self, id: DispatcherId) -> bool {
        self.dispatchers
            .get(&id)
            .is_some_and(Dispatcher::is_sub_dispatcher)
    }

    /// Outermost dispatcher of the ownership chain of `id`.
    pub fn main_dispatcher(&self, id: DispatcherId) -> DispatcherId {
        let mut current = id;
        while let Some(parent) = self.dispatchers.get(&current).and_then(|d| d.parent) {
            current = parent;
        }
        current
    }

    /// Sets the leader entity. Only meaningful before the dispatcher starts.
    pub fn set_leader(&mut self, id: DispatcherId, leader: Option<EntityId>) {
        let Some(dispatcher) = self.dispatchers.get_mut(&id) else {
            warn!("set_leader on unknown dispatcher {}", id);
            return;
        };
        assert_eq!(
            dispatcher.state,
            DispatcherState::Deactive,
            "leader of {} changed while running",
            dispatcher.debug_name()
        );
        dispatcher.leader = leader;
    }

    /// Opts a dispatcher in or out of manager notifications.
    pub fn set_managed(&mut self, id: DispatcherId, managed: bool) {
        if let Some(dispatcher) = self.dispatchers.get_mut(&id) {
            dispatcher.managed = managed;
        }
    }

    /// Adds a listener of the tagged finish broadcast of `id`.
    pub fn add_finish_listener(
        &mut self,
        id: DispatcherId,
        listener: impl FnMut(DispatcherId, &FinishTag) + Send + 'static,
    ) {
        if let Some(dispatcher) = self.dispatchers.get_mut(&id) {
            dispatcher
                .finish_listeners
                .push(Box::new(listener) as FinishListener);
        }
    }

    /// Registers a callback fired once when the next abort of `id` completes.
    pub fn assign_on_abort(
        &mut self,
        id: DispatcherId,
        callback: impl FnOnce(&mut ActionDispatchSystem, DispatcherId) + Send + 'static,
    ) {
        let main = self.main_dispatcher(id);
        if let Some(dispatcher) = self.dispatchers.get_mut(&main) {
            dispatcher.abort_callbacks.push(Box::new(callback));
        }
    }

    /// Registers a callback fired on the next deactivation of `id`, replacing
    /// any previous one.
    pub fn on_deactivated(
        &mut self,
        id: DispatcherId,
        callback: impl FnOnce(&mut ActionDispatchSystem, DispatcherId, bool) + Send + 'static,
    ) {
        let main = self.main_dispatcher(id);
        if let Some(dispatcher) = self.dispatchers.get_mut(&main) {
            dispatcher.on_deactivated = Some(Box::new(callback) as DeactivatedCallback);
        }
    }

    /// Whether `id` currently observes its leader.
    pub fn is_watching_leader(&self, id: DispatcherId) -> bool {
        self.leaders.is_watching(id)
    }

    /// Drops a deactive dispatcher and its sub-dispatchers.
    pub fn remove_dispatcher(&mut self, id: DispatcherId) -> Result<(), DispatchError> {
        let dispatcher = self
            .dispatchers
            .get(&id)
            .ok_or(DispatchError::UnknownDispatcher(id))?;
        let name = dispatcher.debug_name();
        let parent = dispatcher.parent;
        let state = self.state(id).unwrap_or_default();
        if state != DispatcherState::Deactive {
            return Err(DispatchError::UnexpectedState {
                dispatcher: name,
                state,
                expected: DispatcherState::Deactive,
            });
        }
        if let Some(parent) = parent.and_then(|p| self.dispatchers.get_mut(&p)) {
            parent.sub_dispatchers.retain(|_, sub| *sub != id);
        }
        self.destroy_tree(id);
        debug!("removed dispatcher {}", name);
        Ok(())
    }

    /// Removes `id` and everything registered below it.
    pub(crate) fn destroy_tree(&mut self, id: DispatcherId) {
        let Some(dispatcher) = self.dispatchers.remove(&id) else {
            return;
        };
        for action in dispatcher.current_actions {
            self.release_action(action);
        }
        self.claims.release_all(id);
        if let Some(leader) = dispatcher.leader {
            self.leaders.unwatch(leader, id);
        }
        self.registry.forget(id);
        for sub in dispatcher.sub_dispatchers.into_values() {
            self.destroy_tree(sub);
        }
    }

    // ===== actions =====

    /// Creates an unowned action in the `Deactive` state.
    pub fn create_action(
        &mut self,
        name: impl Into<String>,
        action: impl DispatchableAction + 'static,
    ) -> ActionId {
        self.insert_action(ActionSlot::new(name.into(), Box::new(action)))
    }

    pub(crate) fn insert_action(&mut self, slot: ActionSlot) -> ActionId {
        let id = ActionId(self.next_action);
        self.next_action += 1;
        self.actions.insert(id, slot);
        id
    }

    /// Drops an action that never made it into a dispatcher.
    pub(crate) fn discard_action(&mut self, id: ActionId) {
        if self.actions.get(&id).is_some_and(|slot| slot.owner.is_none()) {
            self.release_action(id);
        }
    }

    /// Detaches an action from its dispatcher and drops it, or marks it for
    /// dropping if one of its hooks is running.
    pub(crate) fn release_action(&mut self, id: ActionId) {
        let Some(slot) = self.actions.get_mut(&id) else {
            return;
        };
        slot.owner = None;
        slot.listener = None;
        if slot.is_busy() {
            slot.released = true;
        } else {
            self.actions.remove(&id);
        }
    }

    pub fn action_state(&self, id: ActionId) -> Option<ActionState> {
        self.actions.get(&id).map(|slot| slot.state)
    }

    pub fn action_owner(&self, id: ActionId) -> Option<DispatcherId> {
        self.actions.get(&id).and_then(|slot| slot.owner)
    }

    pub fn action_name(&self, id: ActionId) -> Option<&str> {
        self.actions.get(&id).map(|slot| slot.name.as_str())
    }

    /// Number of live action records.
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Read access to an action's behavior, e.g. for inspection in tests.
    /// `None` while one of its hooks is running.
    pub fn action_behavior(&self, id: ActionId) -> Option<&dyn DispatchableAction> {
        self.actions
            .get(&id)
            .and_then(|slot| slot.behavior.as_deref())
    }

    pub(crate) fn debug_name(&self, id: DispatcherId) -> String {
        self.dispatchers
            .get(&id)
            .map_or_else(|| format!("<gone>{id}"), Dispatcher::debug_name)
    }

    pub(crate) fn action_debug_name(&self, id: ActionId) -> String {
        self.actions
            .get(&id)
            .map_or_else(|| format!("<gone>{id}"), |slot| format!("{}{}", slot.name, id))
    }

    // ===== hooks =====

    pub(crate) fn run_script_hook(&mut self, id: DispatcherId, hook: ScriptHook) {
        let Some(dispatcher) = self.dispatchers.get_mut(&id) else {
            return;
        };
        let Some(mut script) = dispatcher.script.take() else {
            trace!("deferring {:?} for {}", hook, dispatcher.debug_name());
            dispatcher.deferred.push_back(hook);
            return;
        };

        let mut next = Some(hook);
        while let Some(hook) = next {
            if let Some(dispatcher) = self.dispatchers.get_mut(&id) {
                dispatcher.checked_out_references = script.declared_references();
            }
            self.invoke_script_hook(id, script.as_mut(), hook);
            next = self
                .dispatchers
                .get_mut(&id)
                .and_then(|d| d.deferred.pop_front());
        }

        if let Some(dispatcher) = self.dispatchers.get_mut(&id) {
            dispatcher.checked_out_references.clear();
            dispatcher.script = Some(script);
        }
    }

    fn invoke_script_hook(
        &mut self,
        id: DispatcherId,
        script: &mut dyn DispatcherScript,
        hook: ScriptHook,
    ) {
        let mut ctx = ScriptContext::new(self, id);
        match hook {
            ScriptHook::DispatchStart => script.when_dispatch_start(&mut ctx),
            ScriptHook::Actived => script.when_actived(&mut ctx),
            ScriptHook::Deactived(cleanly) => script.when_deactived(&mut ctx, cleanly),
            ScriptHook::ActionFinished(action, event) => {
                script.when_action_finished(&mut ctx, action, &event)
            }
            ScriptHook::SubFinished(node, tag) => {
                script.when_sub_dispatch_finished(&mut ctx, node, &tag)
            }
        }
    }

    pub(crate) fn run_action_hook(&mut self, id: ActionId, hook: ActionHook) {
        let Some(slot) = self.actions.get_mut(&id) else {
            return;
        };
        let Some(mut behavior) = slot.behavior.take() else {
            trace!("deferring {:?} for action {}{}", hook, slot.name, id);
            slot.deferred.push_back(hook);
            return;
        };

        let mut next = Some(hook);
        while let Some(hook) = next {
            self.invoke_action_hook(id, behavior.as_mut(), hook);
            next = self
                .actions
                .get_mut(&id)
                .and_then(|slot| slot.deferred.pop_front());
        }

        match self.actions.get_mut(&id) {
            Some(slot) if slot.released => {
                self.actions.remove(&id);
            }
            Some(slot) => slot.behavior = Some(behavior),
            None => {}
        }
    }

    fn invoke_action_hook(
        &mut self,
        id: ActionId,
        behavior: &mut dyn DispatchableAction,
        hook: ActionHook,
    ) {
        let mut ctx = ActionContext::new(self, id);
        match hook {
            ActionHook::Actived => behavior.when_action_actived(&mut ctx),
            ActionHook::Deactived => behavior.when_action_deactived(&mut ctx),
            ActionHook::Reactived => behavior.when_action_reactived(&mut ctx),
            ActionHook::Signal(signal) => behavior.on_signal(&mut ctx, &signal),
            ActionHook::Aborted => {
                if behavior.when_action_aborted(&mut ctx) == AbortProgress::Completed {
                    self.abort_finished(id);
                }
            }
        }
    }

    /// Delivers a lifecycle notification to the registry and every manager.
    /// Unmanaged dispatchers are skipped.
    fn notify(&mut self, id: DispatcherId, event: fn(&mut dyn DispatcherManager, DispatcherId)) {
        if !self.dispatchers.get(&id).is_some_and(|d| d.managed) {
            return;
        }
        event(&mut self.registry, id);
        for manager in &mut self.managers {
            event(manager.as_mut(), id);
        }
    }
}

impl std::fmt::Debug for ActionDispatchSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatchSystem")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("dispatchers", &self.dispatchers.len())
            .field("actions", &self.actions.len())
            .field("claims", &self.claims.len())
            .finish_non_exhaustive()
    }
}
