//! Save and restore of dispatcher trees.

use tracing::{debug, info};

use super::{ActionDispatchSystem, DispatchError};
use crate::action::{ActionSlot, ActionState};
use crate::dispatcher::{Barrier, Dispatcher, DispatcherScript};
use crate::persist::{
    ActionSnapshot, BarrierSnapshot, Catalog, DispatcherSnapshot, PersistenceError,
};
use crate::types::{ActionId, DispatcherId, EntityId, NodeId};

/// Decoded dispatcher tree, built completely before anything is inserted so
/// a failing payload leaves the system untouched.
struct DecodedTree {
    name: String,
    leader: Option<EntityId>,
    managed: bool,
    script: Box<dyn DispatcherScript>,
    barriers: Vec<BarrierSnapshot>,
    subs: Vec<(NodeId, DecodedTree)>,
}

impl DecodedTree {
    fn decode(snapshot: &DispatcherSnapshot, catalog: &Catalog) -> Result<Self, PersistenceError> {
        let subs = snapshot
            .sub_dispatchers
            .iter()
            .map(|(node, sub)| -> Result<_, PersistenceError> {
                Ok((*node, Self::decode(sub, catalog)?))
            })
            .collect::<Result<Vec<_>, PersistenceError>>()?;
        Ok(Self {
            name: snapshot.name.clone(),
            leader: snapshot.leader,
            managed: snapshot.managed,
            script: catalog.load_script(&snapshot.kind, &snapshot.script)?,
            barriers: snapshot.barriers.clone(),
            subs,
        })
    }
}

impl ActionDispatchSystem {
    /// Captures a top-level dispatcher, its sub-dispatchers and owned
    /// actions. Callbacks and listeners are not captured.
    pub fn save_dispatcher(&self, id: DispatcherId) -> Result<DispatcherSnapshot, DispatchError> {
        let dispatcher = self
            .dispatchers
            .get(&id)
            .ok_or(DispatchError::UnknownDispatcher(id))?;
        if dispatcher.is_sub_dispatcher() {
            return Err(DispatchError::SubDispatcher(dispatcher.debug_name()));
        }
        let mut snapshot = self.snapshot_record(dispatcher)?;
        snapshot.actions = dispatcher
            .current_actions
            .iter()
            .map(|&action| self.snapshot_action(id, action))
            .collect::<Result<_, _>>()?;
        debug!(
            "saved {} ({} dispatchers, {} actions)",
            dispatcher.debug_name(),
            snapshot.tree_size(),
            snapshot.actions.len()
        );
        Ok(snapshot)
    }

    fn snapshot_record(&self, dispatcher: &Dispatcher) -> Result<DispatcherSnapshot, PersistenceError> {
        let script = dispatcher
            .script
            .as_ref()
            .ok_or_else(|| PersistenceError::Busy(dispatcher.debug_name()))?;
        let sub_dispatchers = dispatcher
            .sub_dispatchers
            .iter()
            .filter_map(|(&node, sub)| self.dispatchers.get(sub).map(|sub| (node, sub)))
            .map(|(node, sub)| -> Result<_, PersistenceError> {
                Ok((node, self.snapshot_record(sub)?))
            })
            .collect::<Result<Vec<_>, PersistenceError>>()?;
        Ok(DispatcherSnapshot {
            kind: script.kind().to_owned(),
            name: dispatcher.name.clone(),
            state: dispatcher.state,
            leader: dispatcher.leader,
            managed: dispatcher.managed,
            script: script.save_state()?,
            actions: Vec::new(),
            barriers: dispatcher
                .barriers
                .iter()
                .map(|(&node, barrier)| BarrierSnapshot {
                    node,
                    checklist: barrier.checklist().to_vec(),
                })
                .collect(),
            sub_dispatchers,
        })
    }

    fn snapshot_action(
        &self,
        main: DispatcherId,
        action: ActionId,
    ) -> Result<ActionSnapshot, DispatchError> {
        let slot = self
            .actions
            .get(&action)
            .ok_or(DispatchError::UnknownAction(action))?;
        let behavior = slot
            .behavior
            .as_ref()
            .ok_or_else(|| PersistenceError::Busy(format!("{}{}", slot.name, action)))?;
        Ok(ActionSnapshot {
            kind: behavior.kind().to_owned(),
            name: slot.name.clone(),
            state: slot.state,
            payload: behavior.save_state()?,
            listener: slot
                .listener
                .map(|listener| self.node_path(main, listener))
                .unwrap_or_default(),
        })
    }

    /// Node path from `main` down to `target`.
    fn node_path(&self, main: DispatcherId, target: DispatcherId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = target;
        while current != main {
            let Some(parent) = self.dispatchers.get(&current).and_then(|d| d.parent) else {
                return Vec::new();
            };
            let Some(node) = self.dispatchers.get(&parent).and_then(|p| {
                p.sub_dispatchers
                    .iter()
                    .find_map(|(&node, &sub)| (sub == current).then_some(node))
            }) else {
                return Vec::new();
            };
            path.push(node);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Dispatcher reached from `main` by following `path`, or `main` if the
    /// path no longer resolves.
    fn resolve_path(&self, main: DispatcherId, path: &[NodeId]) -> DispatcherId {
        let mut current = main;
        for node in path {
            match self.dispatchers.get(&current).and_then(|d| d.sub_dispatcher(*node)) {
                Some(sub) => current = sub,
                None => return main,
            }
        }
        current
    }

    /// Recreates a saved dispatcher tree in the `Deactive` state. Owned
    /// actions are restored `Deactive` and stay in the current actions, ready
    /// for [`reactive_dispatch`](Self::reactive_dispatch).
    pub fn restore_dispatcher(
        &mut self,
        snapshot: &DispatcherSnapshot,
        catalog: &Catalog,
    ) -> Result<DispatcherId, DispatchError> {
        let tree = DecodedTree::decode(snapshot, catalog)?;
        let actions = snapshot
            .actions
            .iter()
            .map(|saved| -> Result<_, PersistenceError> {
                Ok((saved, catalog.load_action(&saved.kind, &saved.payload)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let id = self.insert_tree(tree, None);
        for (saved, behavior) in actions {
            let listener = self.resolve_path(id, &saved.listener);
            let mut slot = ActionSlot::new(saved.name.clone(), behavior);
            slot.state = ActionState::Deactive;
            slot.owner = Some(id);
            slot.listener = Some(listener);
            let action = self.insert_action(slot);
            if let Some(dispatcher) = self.dispatchers.get_mut(&id) {
                dispatcher.current_actions.push(action);
            }
        }
        info!(
            "restored {} ({} dispatchers, {} actions)",
            self.debug_name(id),
            snapshot.tree_size(),
            snapshot.actions.len()
        );
        Ok(id)
    }

    fn insert_tree(&mut self, tree: DecodedTree, parent: Option<DispatcherId>) -> DispatcherId {
        let DecodedTree {
            name,
            leader,
            managed,
            script,
            barriers,
            subs,
        } = tree;
        let id = self.insert_dispatcher(name, parent, script);
        if let Some(dispatcher) = self.dispatchers.get_mut(&id) {
            dispatcher.leader = leader;
            dispatcher.managed = managed;
            dispatcher.barriers = barriers
                .into_iter()
                .map(|saved| (saved.node, Barrier::from_checklist(saved.checklist)))
                .collect();
        }
        for (node, sub) in subs {
            let sub = self.insert_tree(sub, Some(id));
            if let Some(dispatcher) = self.dispatchers.get_mut(&id) {
                dispatcher.sub_dispatchers.insert(node, sub);
            }
        }
        id
    }

    /// Restores a snapshot and reactivates it if it was running when saved.
    ///
    /// If reactivation is refused the restored tree is removed again and the
    /// refusal is returned, leaving the system as it was.
    pub fn restore_and_reactivate(
        &mut self,
        snapshot: &DispatcherSnapshot,
        catalog: &Catalog,
    ) -> Result<DispatcherId, DispatchError> {
        let id = self.restore_dispatcher(snapshot, catalog)?;
        if snapshot.was_running()
            && let Err(refusal) = self.reactive_dispatch(id)
        {
            debug!("dropping restored dispatcher {} after refused reactivation", id);
            self.destroy_tree(id);
            return Err(refusal);
        }
        Ok(id)
    }
}
