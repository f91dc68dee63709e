//! Dispatcher records and the script contract of concrete dispatcher types.
//!
//! A [`Dispatcher`] is the bookkeeping half: state, leader, owned actions,
//! barriers and registered sub-dispatchers. The behavior half is a boxed
//! [`DispatcherScript`] provided by game code. All transitions are performed
//! by [`ActionDispatchSystem`](crate::ActionDispatchSystem).

mod barrier;
mod context;

pub use barrier::Barrier;
pub use context::ScriptContext;

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::entity::EntityRegistry;
use crate::persist::SaveState;
use crate::reference::{DeclaredReference, ReferenceSource};
use crate::system::ActionDispatchSystem;
use crate::types::{ActionEvent, ActionId, DispatcherId, EntityId, FinishTag, NodeId};

/// Dispatcher state machine.
///
/// ```text
///             start / reactive
///   Deactive ─────────────────▶ Active
///      ▲  ▲                      │  │
///      │  └────── finish ────────┘  │ abort
///      │                            ▼
///      └──── all actions idle ── Aborting
/// ```
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
pub enum DispatcherState {
    #[default]
    Deactive,
    Active,
    /// Waiting for owned actions to report they stopped.
    Aborting,
}

/// One-shot callback fired when an abort completes.
pub type AbortCallback = Box<dyn FnOnce(&mut ActionDispatchSystem, DispatcherId) + Send>;

/// One-shot callback fired on the next deactivation; the flag tells whether
/// the dispatcher finished cleanly (true) or was aborted (false).
pub type DeactivatedCallback =
    Box<dyn FnOnce(&mut ActionDispatchSystem, DispatcherId, bool) + Send>;

/// Listener of the tagged finish broadcast.
pub type FinishListener = Box<dyn FnMut(DispatcherId, &FinishTag) + Send>;

/// One-shot callback fired when a barrier completes.
pub type BarrierCallback = Box<dyn FnOnce(&mut ActionDispatchSystem, DispatcherId) + Send>;

/// Script-defined behavior of a concrete dispatcher type.
///
/// Entity references are declared through
/// [`DeclareReferences`](crate::DeclareReferences); persistence comes from
/// [`Persistent`](crate::Persistent).
pub trait DispatcherScript: ReferenceSource + SaveState + Send {
    /// Script-level start predicate, checked in addition to validity.
    fn can_start_dispatcher(&self, _entities: &EntityRegistry) -> bool {
        true
    }

    /// Script-level validity predicate, also re-checked while active.
    fn is_dispatcher_valid(&self, _entities: &EntityRegistry) -> bool {
        true
    }

    /// Entry point of the scripted flow. Activates the first actions.
    fn when_dispatch_start(&mut self, ctx: &mut ScriptContext<'_>);

    fn when_actived(&mut self, _ctx: &mut ScriptContext<'_>) {}

    fn when_deactived(&mut self, _ctx: &mut ScriptContext<'_>, _finished_cleanly: bool) {}

    /// An action launched by this script finished with `event`.
    fn when_action_finished(
        &mut self,
        _ctx: &mut ScriptContext<'_>,
        _action: ActionId,
        _event: &ActionEvent,
    ) {
    }

    /// A sub-dispatcher registered under `node` finished with `tag`.
    fn when_sub_dispatch_finished(
        &mut self,
        _ctx: &mut ScriptContext<'_>,
        _node: NodeId,
        _tag: &FinishTag,
    ) {
    }

    /// Finish tags this script is expected to use. Empty means unchecked.
    fn finish_tags(&self) -> &[&'static str] {
        &[]
    }
}

/// Hook invocation addressed to a dispatcher script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ScriptHook {
    DispatchStart,
    Actived,
    Deactived(bool),
    ActionFinished(ActionId, ActionEvent),
    SubFinished(NodeId, FinishTag),
}

/// Bookkeeping record of one dispatcher.
pub struct Dispatcher {
    pub(crate) id: DispatcherId,
    pub(crate) name: String,
    pub(crate) kind: &'static str,
    pub(crate) parent: Option<DispatcherId>,
    pub(crate) state: DispatcherState,
    pub(crate) leader: Option<EntityId>,
    pub(crate) managed: bool,
    pub(crate) current_actions: Vec<ActionId>,
    pub(crate) barriers: BTreeMap<NodeId, Barrier>,
    pub(crate) sub_dispatchers: BTreeMap<NodeId, DispatcherId>,
    pub(crate) script: Option<Box<dyn DispatcherScript>>,
    /// Copied from the script when it is inserted.
    pub(crate) finish_tags: Vec<&'static str>,
    /// References as they were when the script was last checked out for a
    /// hook. Read in place of the script until it is checked back in.
    pub(crate) checked_out_references: Vec<DeclaredReference>,
    pub(crate) deferred: VecDeque<ScriptHook>,
    pub(crate) abort_callbacks: Vec<AbortCallback>,
    pub(crate) on_deactivated: Option<DeactivatedCallback>,
    pub(crate) finish_listeners: Vec<FinishListener>,
    pub(crate) aborting_since: Option<u64>,
    /// Set while an abort walks the owned actions, so completions reported
    /// mid-walk do not finish the abort early.
    pub(crate) sweeping: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        id: DispatcherId,
        name: String,
        parent: Option<DispatcherId>,
        script: Box<dyn DispatcherScript>,
    ) -> Self {
        Self {
            id,
            name,
            kind: script.kind(),
            finish_tags: script.finish_tags().to_vec(),
            checked_out_references: Vec::new(),
            parent,
            state: DispatcherState::Deactive,
            leader: None,
            managed: true,
            current_actions: Vec::new(),
            barriers: BTreeMap::new(),
            sub_dispatchers: BTreeMap::new(),
            script: Some(script),
            deferred: VecDeque::new(),
            abort_callbacks: Vec::new(),
            on_deactivated: None,
            finish_listeners: Vec::new(),
            aborting_since: None,
            sweeping: false,
        }
    }

    pub fn id(&self) -> DispatcherId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Persistence kind of the script.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// `name#id`, used in every diagnostic about this dispatcher.
    pub fn debug_name(&self) -> String {
        format!("{}{}", self.name, self.id)
    }

    pub fn parent(&self) -> Option<DispatcherId> {
        self.parent
    }

    pub fn is_sub_dispatcher(&self) -> bool {
        self.parent.is_some()
    }

    /// State of this record. Sub-dispatchers never change their own state;
    /// use [`ActionDispatchSystem::state`] to read the effective state.
    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn leader(&self) -> Option<EntityId> {
        self.leader
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    /// Owned actions in activation order.
    pub fn current_actions(&self) -> &[ActionId] {
        &self.current_actions
    }

    /// Finish tags the script declared. Empty means unchecked.
    pub fn finish_tags(&self) -> &[&'static str] {
        &self.finish_tags
    }

    /// References of this record's own script, also while one of its hooks
    /// runs.
    pub fn declared_references(&self) -> Vec<DeclaredReference> {
        match &self.script {
            Some(script) => script.declared_references(),
            None => self.checked_out_references.clone(),
        }
    }

    pub fn barrier(&self, node: NodeId) -> Option<&Barrier> {
        self.barriers.get(&node)
    }

    pub fn sub_dispatcher(&self, node: NodeId) -> Option<DispatcherId> {
        self.sub_dispatchers.get(&node).copied()
    }

    pub fn sub_dispatchers(&self) -> impl Iterator<Item = (NodeId, DispatcherId)> + '_ {
        self.sub_dispatchers.iter().map(|(&node, &id)| (node, id))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("state", &self.state)
            .field("leader", &self.leader)
            .field("current_actions", &self.current_actions)
            .field("barriers", &self.barriers)
            .field("sub_dispatchers", &self.sub_dispatchers)
            .finish_non_exhaustive()
    }
}
