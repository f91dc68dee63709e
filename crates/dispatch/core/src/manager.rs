//! Manager notification contract.
//!
//! Managers track dispatchers globally (e.g. to reactivate them after a load
//! or to show which scripted sequences are running). Dispatchers owned
//! directly by a gameplay mechanism can opt out with
//! [`ActionDispatchSystem::set_managed`](crate::ActionDispatchSystem::set_managed).

use std::collections::BTreeSet;

use crate::types::DispatcherId;

/// Observer of dispatcher lifecycle transitions.
pub trait DispatcherManager: Send {
    /// The dispatcher became active through start or reactivation.
    fn on_dispatcher_started(&mut self, _dispatcher: DispatcherId) {}

    /// An abort began. Deactivation follows once every action stopped.
    fn on_dispatcher_aborted(&mut self, dispatcher: DispatcherId);

    /// The dispatcher reached `Deactive` after an abort or a finish.
    fn on_dispatcher_deactivated(&mut self, dispatcher: DispatcherId);

    /// The dispatcher finished through `finish_dispatch`.
    fn on_dispatcher_finished(&mut self, dispatcher: DispatcherId);
}

/// Built-in manager tracking active managed dispatchers.
#[derive(Debug, Default)]
pub struct DispatcherRegistry {
    active: BTreeSet<DispatcherId>,
    aborting: BTreeSet<DispatcherId>,
    finished: u64,
    aborted: u64,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatchers that are active or still aborting, in id order.
    pub fn active(&self) -> impl Iterator<Item = DispatcherId> + '_ {
        self.active.iter().copied()
    }

    pub fn is_active(&self, dispatcher: DispatcherId) -> bool {
        self.active.contains(&dispatcher)
    }

    pub fn is_aborting(&self, dispatcher: DispatcherId) -> bool {
        self.aborting.contains(&dispatcher)
    }

    /// Number of dispatchers that finished cleanly since creation.
    pub fn finished_count(&self) -> u64 {
        self.finished
    }

    /// Number of aborts started since creation.
    pub fn aborted_count(&self) -> u64 {
        self.aborted
    }

    pub(crate) fn forget(&mut self, dispatcher: DispatcherId) {
        self.active.remove(&dispatcher);
        self.aborting.remove(&dispatcher);
    }
}

impl DispatcherManager for DispatcherRegistry {
    fn on_dispatcher_started(&mut self, dispatcher: DispatcherId) {
        self.active.insert(dispatcher);
    }

    fn on_dispatcher_aborted(&mut self, dispatcher: DispatcherId) {
        self.aborting.insert(dispatcher);
        self.aborted += 1;
    }

    fn on_dispatcher_deactivated(&mut self, dispatcher: DispatcherId) {
        self.forget(dispatcher);
    }

    fn on_dispatcher_finished(&mut self, _dispatcher: DispatcherId) {
        self.finished += 1;
    }
}
