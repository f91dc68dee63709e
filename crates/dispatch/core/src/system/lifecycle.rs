//! Start, abort, finish and reactivation of dispatchers and their actions.

use std::mem;

use tracing::{debug, error, info, warn};

use super::{AbortRequest, ActionDispatchSystem, DispatchError, StartRefusal};
use crate::action::{ActionHook, ActionSignal, ActionState};
use crate::dispatcher::{
    AbortCallback, DeactivatedCallback, Dispatcher, DispatcherState, ScriptHook,
};
use crate::reference::{DeclaredReference, validate_references};
use crate::types::{ActionEvent, ActionId, DispatcherId, FinishTag};

impl ActionDispatchSystem {
    // ===== predicates =====

    /// Whether `id` (or its main dispatcher) could start right now.
    pub fn can_start_dispatcher(&self, id: DispatcherId) -> bool {
        self.dispatchers
            .get(&self.main_dispatcher(id))
            .is_some_and(|d| self.start_check(d).is_ok())
    }

    /// Whether `id` (or its main dispatcher) is still valid.
    pub fn is_dispatcher_valid(&self, id: DispatcherId) -> bool {
        self.dispatchers
            .get(&self.main_dispatcher(id))
            .is_some_and(|d| self.validity(d).is_ok())
    }

    /// Leader, script predicate and references of the whole tree.
    ///
    /// While one of the script's own hooks runs its predicates are skipped;
    /// its references are read from the copy taken at check-out.
    pub(crate) fn validity(&self, dispatcher: &Dispatcher) -> Result<(), StartRefusal> {
        if let Some(leader) = dispatcher.leader
            && !self.entities.is_resolvable(leader)
        {
            return Err(StartRefusal::LeaderLost(leader));
        }
        if let Some(script) = dispatcher.script.as_ref()
            && !script.is_dispatcher_valid(&self.entities)
        {
            return Err(StartRefusal::ScriptInvalid);
        }
        self.tree_references(dispatcher.id, dispatcher.id)
    }

    pub(crate) fn start_check(&self, dispatcher: &Dispatcher) -> Result<(), StartRefusal> {
        self.validity(dispatcher)?;
        if let Some(script) = dispatcher.script.as_ref()
            && !script.can_start_dispatcher(&self.entities)
        {
            return Err(StartRefusal::ScriptRejected);
        }
        Ok(())
    }

    fn reactivate_check(&self, dispatcher: &Dispatcher) -> Result<(), StartRefusal> {
        self.start_check(dispatcher)?;
        for &action in &dispatcher.current_actions {
            let valid = self
                .actions
                .get(&action)
                .and_then(|slot| slot.behavior.as_ref())
                .is_none_or(|behavior| behavior.is_action_valid(&self.entities));
            if !valid {
                return Err(StartRefusal::ActionInvalid(action));
            }
        }
        Ok(())
    }

    /// Validates the references of `id` and everything registered below it,
    /// with `owner` as the claiming dispatcher.
    pub(crate) fn tree_references(
        &self,
        id: DispatcherId,
        owner: DispatcherId,
    ) -> Result<(), StartRefusal> {
        let Some(dispatcher) = self.dispatchers.get(&id) else {
            return Ok(());
        };
        validate_references(
            owner,
            &dispatcher.declared_references(),
            &self.entities,
            &self.claims,
        )
        .map_err(|refusal| StartRefusal::Reference {
            dispatcher: dispatcher.debug_name(),
            refusal,
        })?;
        for &sub in dispatcher.sub_dispatchers.values() {
            self.tree_references(sub, owner)?;
        }
        Ok(())
    }

    fn collect_references(&self, id: DispatcherId, out: &mut Vec<DeclaredReference>) {
        let Some(dispatcher) = self.dispatchers.get(&id) else {
            return;
        };
        out.extend(dispatcher.declared_references());
        for &sub in dispatcher.sub_dispatchers.values() {
            self.collect_references(sub, out);
        }
    }

    /// Claims every dispatch-capable entity referenced by the tree of `id`
    /// for `owner`.
    pub(crate) fn claim_tree(&mut self, id: DispatcherId, owner: DispatcherId) {
        let mut references = Vec::new();
        self.collect_references(id, &mut references);
        for entity in references.into_iter().filter_map(|r| r.entity) {
            if self.entities.capability(entity).is_none() {
                continue;
            }
            if let Err(conflict) = self.claims.claim(entity, owner) {
                warn!("{} while claiming for {}", conflict, self.debug_name(owner));
            }
        }
    }

    // ===== start =====

    /// Starts a deactive top-level dispatcher.
    ///
    /// # Panics
    ///
    /// If `id` is a sub-dispatcher or is not `Deactive`.
    pub fn start_dispatch(&mut self, id: DispatcherId) -> Result<(), DispatchError> {
        let dispatcher = self
            .dispatchers
            .get(&id)
            .ok_or(DispatchError::UnknownDispatcher(id))?;
        let name = dispatcher.debug_name();
        assert!(
            !dispatcher.is_sub_dispatcher(),
            "sub-dispatcher {name} must be started through active_sub_dispatcher"
        );
        if !self.config.is_authority() {
            error!("dispatcher {} can only start on the authority", name);
            return Err(DispatchError::NotAuthority(name));
        }
        assert_eq!(
            dispatcher.state,
            DispatcherState::Deactive,
            "dispatcher {name} started while not deactive"
        );
        if let Err(refusal) = self.start_check(dispatcher) {
            warn!("dispatcher {} cannot start: {}", name, refusal);
            return Err(DispatchError::StartRefused {
                dispatcher: name,
                refusal,
            });
        }

        self.activate_dispatcher(id);
        info!("dispatcher {} started", name);
        self.run_script_hook(id, ScriptHook::DispatchStart);
        Ok(())
    }

    /// Starts `id` and registers `on_deactivated` for its next deactivation.
    /// The callback is dropped if the start is refused.
    pub fn start_dispatch_with_event(
        &mut self,
        id: DispatcherId,
        on_deactivated: impl FnOnce(&mut ActionDispatchSystem, DispatcherId, bool) + Send + 'static,
    ) -> Result<(), DispatchError> {
        let start_check = self
            .dispatchers
            .get(&id)
            .ok_or(DispatchError::UnknownDispatcher(id))
            .map(|d| self.start_check(d));
        if let Ok(Ok(())) = start_check
            && self.config.is_authority()
        {
            self.on_deactivated(id, on_deactivated);
        }
        self.start_dispatch(id)
    }

    /// Claims, leader observation, `Active` state, notifications and the
    /// script's activation hook.
    fn activate_dispatcher(&mut self, id: DispatcherId) {
        self.claim_tree(id, id);
        let Some(dispatcher) = self.dispatchers.get_mut(&id) else {
            return;
        };
        dispatcher.state = DispatcherState::Active;
        if let Some(leader) = dispatcher.leader
            && let Some(kind) = self.entities.kind(leader)
            && let Some(watch) = self.leaders.watch(leader, kind, id)
        {
            debug!("{} watches {} of leader {}", self.debug_name(id), watch, leader);
        }
        self.notify(id, |m, id| m.on_dispatcher_started(id));
        self.run_script_hook(id, ScriptHook::Actived);
    }

    // ===== actions =====

    /// Hands `action` to the dispatcher `id`, activating it.
    ///
    /// Returns `false` when the dispatcher is not active or the action is
    /// invalid; an invalid action aborts the whole dispatcher.
    ///
    /// # Panics
    ///
    /// If `id` is a sub-dispatcher, or the action is already owned.
    pub fn invoke_active_action(&mut self, id: DispatcherId, action: ActionId) -> bool {
        self.invoke_for(id, action, id)
    }

    pub(crate) fn invoke_for(
        &mut self,
        id: DispatcherId,
        action: ActionId,
        listener: DispatcherId,
    ) -> bool {
        let Some(dispatcher) = self.dispatchers.get(&id) else {
            error!("action {} invoked on unknown dispatcher {}", action, id);
            return false;
        };
        let name = dispatcher.debug_name();
        assert!(
            !dispatcher.is_sub_dispatcher(),
            "actions are owned by the main dispatcher, not by {name}"
        );
        assert!(
            !dispatcher.current_actions.contains(&action),
            "action {action} invoked twice on {name}"
        );
        let state = dispatcher.state;

        let Some(slot) = self.actions.get(&action) else {
            error!("unknown action {} invoked on {}", action, name);
            return false;
        };
        assert!(
            slot.owner.is_none(),
            "action {action} is already owned by another dispatcher"
        );
        if state != DispatcherState::Active {
            warn!("{} is {}; action {} is not activated", name, state, action);
            return false;
        }
        let valid = slot
            .behavior
            .as_ref()
            .is_none_or(|behavior| behavior.is_action_valid(&self.entities));

        if let Some(dispatcher) = self.dispatchers.get_mut(&id) {
            dispatcher.current_actions.push(action);
        }
        let Some(slot) = self.actions.get_mut(&action) else {
            return false;
        };
        slot.owner = Some(id);
        slot.listener = Some(listener);

        if valid {
            slot.state = ActionState::Active;
            debug!("{} activated {}", name, self.action_debug_name(action));
            self.run_action_hook(action, ActionHook::Actived);
            true
        } else {
            slot.state = ActionState::Invalid;
            warn!(
                "{} is invalid; aborting {}",
                self.action_debug_name(action),
                name
            );
            self.abort_dispatch(id, AbortRequest::new());
            false
        }
    }

    /// Completes an active action with `event`.
    pub fn finish_action(&mut self, action: ActionId, event: ActionEvent) {
        let Some(slot) = self.actions.get_mut(&action) else {
            warn!("finish of unknown action {}", action);
            return;
        };
        if slot.state != ActionState::Active {
            debug!(
                "action {}{} finished while {}; ignored",
                slot.name, action, slot.state
            );
            return;
        }
        slot.state = ActionState::Deactive;
        let owner = slot.owner;
        let listener = slot.listener;
        if let Some(dispatcher) = owner.and_then(|o| self.dispatchers.get_mut(&o)) {
            dispatcher.current_actions.retain(|&a| a != action);
        }
        debug!("{} finished with `{}`", self.action_debug_name(action), event);

        self.run_action_hook(action, ActionHook::Deactived);
        self.release_action(action);
        if let Some(listener) = listener {
            self.run_script_hook(listener, ScriptHook::ActionFinished(action, event));
        }
    }

    /// An aborting action reports that it stopped.
    pub fn abort_finished(&mut self, action: ActionId) {
        let Some(slot) = self.actions.get_mut(&action) else {
            return;
        };
        if slot.state != ActionState::Aborting {
            debug!(
                "abort_finished for {}{} while {}; ignored",
                slot.name, action, slot.state
            );
            return;
        }
        slot.state = ActionState::Deactive;
        if let Some(owner) = slot.owner {
            self.try_complete_abort(owner);
        }
    }

    /// Delivers a host signal to an active action. Signals for actions that
    /// are not active are dropped.
    pub fn signal_action(&mut self, action: ActionId, signal: ActionSignal) {
        match self.actions.get(&action).map(|slot| slot.state) {
            Some(ActionState::Active) => self.run_action_hook(action, ActionHook::Signal(signal)),
            Some(state) => debug!("signal {:?} for {} dropped while {}", signal, action, state),
            None => warn!("signal {:?} for unknown action {}", signal, action),
        }
    }

    // ===== abort =====

    /// Aborts the main dispatcher of `id`.
    ///
    /// Active actions are aborted, except `request.deactivate_target` which
    /// is deactivated. Once no owned action is active or aborting the
    /// dispatcher deactivates and the abort callbacks fire. Aborting an
    /// already aborting dispatcher only appends the callback.
    ///
    /// # Panics
    ///
    /// If the dispatcher is `Deactive`.
    pub fn abort_dispatch(&mut self, id: DispatcherId, request: AbortRequest) {
        let main = self.main_dispatcher(id);
        let AbortRequest {
            deactivate_target,
            on_aborted,
        } = request;
        let now = self.clock;
        let Some(dispatcher) = self.dispatchers.get_mut(&main) else {
            error!("abort of unknown dispatcher {}", id);
            return;
        };
        let name = dispatcher.debug_name();
        match dispatcher.state {
            DispatcherState::Deactive => panic!("abort of deactive dispatcher {name}"),
            DispatcherState::Aborting => {
                debug!("{} is already aborting", name);
                dispatcher.abort_callbacks.extend(on_aborted);
                return;
            }
            DispatcherState::Active => {}
        }

        dispatcher.state = DispatcherState::Aborting;
        dispatcher.aborting_since = Some(now);
        dispatcher.sweeping = true;
        dispatcher.abort_callbacks.extend(on_aborted);
        let actions = dispatcher.current_actions.clone();
        info!("aborting {} with {} owned actions", name, actions.len());
        self.notify(main, |m, id| m.on_dispatcher_aborted(id));

        for action in actions {
            let Some(slot) = self.actions.get_mut(&action) else {
                continue;
            };
            match slot.state {
                ActionState::Active if deactivate_target == Some(action) => {
                    slot.state = ActionState::Deactive;
                    self.run_action_hook(action, ActionHook::Deactived);
                }
                ActionState::Active => {
                    slot.state = ActionState::Aborting;
                    self.run_action_hook(action, ActionHook::Aborted);
                }
                ActionState::Aborting => {}
                ActionState::Deactive | ActionState::Invalid => {
                    slot.state = ActionState::Deactive;
                }
            }
        }

        if let Some(dispatcher) = self.dispatchers.get_mut(&main) {
            dispatcher.sweeping = false;
        }
        self.try_complete_abort(main);
    }

    pub(crate) fn try_complete_abort(&mut self, main: DispatcherId) {
        let Some(dispatcher) = self.dispatchers.get(&main) else {
            return;
        };
        if dispatcher.state != DispatcherState::Aborting || dispatcher.sweeping {
            return;
        }
        let pending = dispatcher
            .current_actions
            .iter()
            .filter(|a| {
                self.actions
                    .get(a)
                    .is_some_and(|slot| slot.state.is_active())
            })
            .count();
        if pending > 0 {
            debug!("{} waits for {} aborting actions", dispatcher.debug_name(), pending);
            return;
        }
        if let Some(callbacks) = self.release_deactivated(main, false) {
            self.run_deactivation_callbacks(main, false, callbacks);
        }
    }

    /// Moves `main` to `Deactive`, releases claims, leader observation and
    /// owned actions, then tells the managers. Callbacks are handed back so
    /// they run only after every manager saw the deactivation.
    fn release_deactivated(
        &mut self,
        main: DispatcherId,
        finished_cleanly: bool,
    ) -> Option<DeactivationCallbacks> {
        let dispatcher = self.dispatchers.get_mut(&main)?;
        dispatcher.state = DispatcherState::Deactive;
        dispatcher.aborting_since = None;
        let actions = mem::take(&mut dispatcher.current_actions);
        let callbacks = DeactivationCallbacks {
            on_aborted: mem::take(&mut dispatcher.abort_callbacks),
            on_deactivated: dispatcher.on_deactivated.take(),
        };
        let leader = dispatcher.leader;
        let name = dispatcher.debug_name();

        let released = self.claims.release_all(main);
        if let Some(leader) = leader {
            self.leaders.unwatch(leader, main);
        }
        for action in actions {
            if let Some(slot) = self.actions.get_mut(&action) {
                slot.state = ActionState::Deactive;
            }
            self.release_action(action);
        }
        info!(
            "{} deactivated ({}), released {} claims",
            name,
            if finished_cleanly { "finished" } else { "aborted" },
            released.len()
        );
        self.notify(main, |m, id| m.on_dispatcher_deactivated(id));
        Some(callbacks)
    }

    /// Runs the `Deactived` hook and the caller's callbacks. Any of them may
    /// start `main` again.
    fn run_deactivation_callbacks(
        &mut self,
        main: DispatcherId,
        finished_cleanly: bool,
        callbacks: DeactivationCallbacks,
    ) {
        self.run_script_hook(main, ScriptHook::Deactived(finished_cleanly));
        if !finished_cleanly {
            for callback in callbacks.on_aborted {
                callback(self, main);
            }
        }
        if let Some(callback) = callbacks.on_deactivated {
            callback(self, main, finished_cleanly);
        }
    }

    // ===== finish =====

    /// Finishes `id` with `tag`.
    ///
    /// A main dispatcher deactivates its remaining actions, releases its
    /// claims and deactivates. A sub-dispatcher only broadcasts `tag` and
    /// tells its parent's script; its main dispatcher keeps running.
    ///
    /// # Panics
    ///
    /// If the (main) dispatcher is not `Active`.
    pub fn finish_dispatch(&mut self, id: DispatcherId, tag: FinishTag) {
        let Some(dispatcher) = self.dispatchers.get(&id) else {
            error!("finish of unknown dispatcher {}", id);
            return;
        };
        let name = dispatcher.debug_name();
        let declared = dispatcher.finish_tags();
        if !declared.is_empty() && !declared.contains(&tag.as_str()) {
            warn!("{} finished with undeclared tag `{}`", name, tag);
        }

        if let Some(parent) = dispatcher.parent {
            let state = self.state(id).unwrap_or_default();
            assert_eq!(
                state,
                DispatcherState::Active,
                "sub-dispatcher {name} finished while its main dispatcher is {state}"
            );
            let node = self.dispatchers.get(&parent).and_then(|p| {
                p.sub_dispatchers
                    .iter()
                    .find_map(|(&node, &sub)| (sub == id).then_some(node))
            });
            info!("sub-dispatcher {} finished with `{}`", name, tag);
            self.broadcast_finish(id, &tag);
            match node {
                Some(node) => self.run_script_hook(parent, ScriptHook::SubFinished(node, tag)),
                None => warn!("{} finished but is not registered under its parent", name),
            }
            return;
        }

        assert_eq!(
            dispatcher.state,
            DispatcherState::Active,
            "dispatcher {name} finished while not active"
        );
        info!("dispatcher {} finished with `{}`", name, tag);
        for action in dispatcher.current_actions.clone() {
            let Some(slot) = self.actions.get_mut(&action) else {
                continue;
            };
            if slot.state == ActionState::Active {
                slot.state = ActionState::Deactive;
                self.run_action_hook(action, ActionHook::Deactived);
            }
        }
        let callbacks = self.release_deactivated(id, true);
        self.notify(id, |m, id| m.on_dispatcher_finished(id));
        self.broadcast_finish(id, &tag);
        if let Some(callbacks) = callbacks {
            self.run_deactivation_callbacks(id, true, callbacks);
        }
    }

    fn broadcast_finish(&mut self, id: DispatcherId, tag: &FinishTag) {
        let Some(dispatcher) = self.dispatchers.get_mut(&id) else {
            return;
        };
        for listener in &mut dispatcher.finish_listeners {
            listener(id, tag);
        }
    }

    // ===== reactivation =====

    /// Reactivates a restored or suspended dispatcher together with every
    /// action still listed in its current actions.
    ///
    /// # Panics
    ///
    /// If `id` is a sub-dispatcher or is not `Deactive`.
    pub fn reactive_dispatch(&mut self, id: DispatcherId) -> Result<(), DispatchError> {
        let dispatcher = self
            .dispatchers
            .get(&id)
            .ok_or(DispatchError::UnknownDispatcher(id))?;
        let name = dispatcher.debug_name();
        assert!(
            !dispatcher.is_sub_dispatcher(),
            "sub-dispatcher {name} is reactivated with its main dispatcher"
        );
        if !self.config.is_authority() {
            error!("dispatcher {} can only be reactivated on the authority", name);
            return Err(DispatchError::NotAuthority(name));
        }
        assert_eq!(
            dispatcher.state,
            DispatcherState::Deactive,
            "dispatcher {name} reactivated while not deactive"
        );
        if let Err(refusal) = self.reactivate_check(dispatcher) {
            warn!("dispatcher {} cannot be reactivated: {}", name, refusal);
            return Err(DispatchError::StartRefused {
                dispatcher: name,
                refusal,
            });
        }
        let actions = dispatcher.current_actions.clone();

        self.activate_dispatcher(id);
        info!("dispatcher {} reactivated with {} actions", name, actions.len());
        for action in actions {
            if self.state(id) != Some(DispatcherState::Active) {
                break;
            }
            let Some(slot) = self.actions.get_mut(&action) else {
                continue;
            };
            slot.state = ActionState::Active;
            slot.owner = Some(id);
            self.run_action_hook(action, ActionHook::Reactived);
        }
        Ok(())
    }

    /// Deactivates an active dispatcher and its actions without releasing
    /// them, so a later [`reactive_dispatch`](Self::reactive_dispatch)
    /// resumes where it stopped. Suspending a deactive dispatcher does
    /// nothing.
    pub fn suspend_dispatch(&mut self, id: DispatcherId) -> Result<(), DispatchError> {
        let dispatcher = self
            .dispatchers
            .get(&id)
            .ok_or(DispatchError::UnknownDispatcher(id))?;
        let name = dispatcher.debug_name();
        if dispatcher.is_sub_dispatcher() {
            return Err(DispatchError::SubDispatcher(name));
        }
        match dispatcher.state {
            DispatcherState::Deactive => return Ok(()),
            DispatcherState::Aborting => {
                return Err(DispatchError::UnexpectedState {
                    dispatcher: name,
                    state: DispatcherState::Aborting,
                    expected: DispatcherState::Active,
                });
            }
            DispatcherState::Active => {}
        }

        for action in dispatcher.current_actions.clone() {
            let Some(slot) = self.actions.get_mut(&action) else {
                continue;
            };
            if slot.state == ActionState::Active {
                slot.state = ActionState::Deactive;
                self.run_action_hook(action, ActionHook::Deactived);
            }
        }
        let Some(dispatcher) = self.dispatchers.get_mut(&id) else {
            return Ok(());
        };
        dispatcher.state = DispatcherState::Deactive;
        let leader = dispatcher.leader;
        self.claims.release_all(id);
        if let Some(leader) = leader {
            self.leaders.unwatch(leader, id);
        }
        info!("dispatcher {} suspended", name);
        self.notify(id, |m, id| m.on_dispatcher_deactivated(id));
        Ok(())
    }
}

/// Callbacks taken from a dispatcher record while it deactivates.
struct DeactivationCallbacks {
    on_aborted: Vec<AbortCallback>,
    on_deactivated: Option<DeactivatedCallback>,
}
