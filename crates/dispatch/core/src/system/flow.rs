//! Together flow control (barriers) and sub-dispatcher nesting.

use tracing::{debug, error, info, trace, warn};

use super::{AbortRequest, ActionDispatchSystem};
use crate::dispatcher::{Barrier, BarrierCallback, DispatcherState, ScriptHook};
use crate::types::{DispatcherId, NodeId};

impl ActionDispatchSystem {
    /// Marks participant `index` of the barrier `node` as arrived.
    ///
    /// Returns `true` exactly once, for the call that completes the barrier;
    /// the barrier is then removed so the node can be reused. A participant
    /// count differing from the stored one resizes the barrier with a
    /// warning.
    ///
    /// # Panics
    ///
    /// If `participants` is zero or `index` is out of range.
    pub fn enter_together_flow_control(
        &mut self,
        dispatcher: DispatcherId,
        node: NodeId,
        index: usize,
        participants: usize,
    ) -> bool {
        self.enter_barrier(dispatcher, node, index, participants, None)
    }

    /// Like [`enter_together_flow_control`](Self::enter_together_flow_control),
    /// registering `on_complete` if the barrier has no completion callback yet.
    pub fn enter_together_flow_control_with(
        &mut self,
        dispatcher: DispatcherId,
        node: NodeId,
        index: usize,
        participants: usize,
        on_complete: BarrierCallback,
    ) -> bool {
        self.enter_barrier(dispatcher, node, index, participants, Some(on_complete))
    }

    fn enter_barrier(
        &mut self,
        id: DispatcherId,
        node: NodeId,
        index: usize,
        participants: usize,
        on_complete: Option<BarrierCallback>,
    ) -> bool {
        assert!(
            participants > 0 && index < participants,
            "barrier {node} entered as participant {index} of {participants}"
        );
        let Some(dispatcher) = self.dispatchers.get_mut(&id) else {
            error!("barrier {} entered on unknown dispatcher {}", node, id);
            return false;
        };
        let name = dispatcher.debug_name();

        let complete = {
            let barrier = dispatcher
                .barriers
                .entry(node)
                .or_insert_with(|| Barrier::new(participants));
            if barrier.resize(participants) {
                warn!(
                    "barrier {} of {} resized to {} participants",
                    node, name, participants
                );
            }
            if barrier.on_complete.is_none() {
                barrier.on_complete = on_complete;
            }
            barrier.check(index)
        };
        if !complete {
            trace!("{} entered barrier {} as {}", name, node, index);
            return false;
        }

        let callback = dispatcher
            .barriers
            .remove(&node)
            .and_then(|barrier| barrier.on_complete);
        debug!("barrier {} of {} complete", node, name);
        if let Some(callback) = callback {
            callback(self, id);
        }
        true
    }

    /// Registers `sub` under `node` of `parent` and runs its start hook.
    ///
    /// A sub-dispatcher already registered under `node` is replaced and
    /// dropped. While the main dispatcher is active the sub's references are
    /// validated and claimed for it; a refusal aborts the main dispatcher.
    ///
    /// # Panics
    ///
    /// If `sub` was not created under `parent`.
    pub fn active_sub_dispatcher(&mut self, parent: DispatcherId, node: NodeId, sub: DispatcherId) {
        let Some(record) = self.dispatchers.get(&sub) else {
            error!("unknown sub-dispatcher {} for node {}", sub, node);
            return;
        };
        let sub_name = record.debug_name();
        assert_eq!(
            record.parent,
            Some(parent),
            "{sub_name} is not a sub-dispatcher of {parent}"
        );
        let parent_name = self.debug_name(parent);
        let Some(parent_record) = self.dispatchers.get_mut(&parent) else {
            return;
        };
        if let Some(previous) = parent_record.sub_dispatchers.insert(node, sub)
            && previous != sub
        {
            warn!(
                "{} replaces {} at node {} of {}",
                sub_name,
                self.debug_name(previous),
                node,
                parent_name
            );
            self.destroy_tree(previous);
        }

        let main = self.main_dispatcher(parent);
        if self.state(main) == Some(DispatcherState::Active) {
            if let Err(refusal) = self.tree_references(sub, main) {
                warn!(
                    "{} cannot run under {}: {}; aborting",
                    sub_name,
                    self.debug_name(main),
                    refusal
                );
                self.abort_dispatch(main, AbortRequest::new());
                return;
            }
            self.claim_tree(sub, main);
        }
        info!("{} started {} at node {}", parent_name, sub_name, node);
        self.run_script_hook(sub, ScriptHook::DispatchStart);
    }

    /// Re-runs the start hook of the sub-dispatcher registered under `node`.
    /// Returns `false` if none is registered.
    pub fn try_active_sub_dispatcher(&mut self, parent: DispatcherId, node: NodeId) -> bool {
        let Some(sub) = self
            .dispatchers
            .get(&parent)
            .and_then(|p| p.sub_dispatcher(node))
        else {
            return false;
        };
        debug!(
            "{} re-enters {} at node {}",
            self.debug_name(parent),
            self.debug_name(sub),
            node
        );
        self.run_script_hook(sub, ScriptHook::DispatchStart);
        true
    }
}
