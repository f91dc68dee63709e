use serde::{Deserialize, Serialize};

use super::{PersistenceError, decode, encode};
use crate::action::ActionState;
use crate::dispatcher::DispatcherState;
use crate::types::{EntityId, NodeId};

/// Saved action owned by a dispatcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSnapshot {
    pub kind: String,
    pub name: String,
    /// State at save time. Restored actions always start `Deactive`.
    pub state: ActionState,
    pub payload: Vec<u8>,
    /// Node path from the main dispatcher to the dispatcher whose script
    /// launched the action. Empty for the main dispatcher itself.
    pub listener: Vec<NodeId>,
}

/// Saved barrier progress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierSnapshot {
    pub node: NodeId,
    pub checklist: Vec<bool>,
}

/// Saved dispatcher tree.
///
/// Only the main dispatcher carries actions; sub-dispatchers carry their own
/// script payload, barriers and nested sub-dispatchers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherSnapshot {
    pub kind: String,
    pub name: String,
    pub state: DispatcherState,
    pub leader: Option<EntityId>,
    pub managed: bool,
    pub script: Vec<u8>,
    pub actions: Vec<ActionSnapshot>,
    pub barriers: Vec<BarrierSnapshot>,
    pub sub_dispatchers: Vec<(NodeId, DispatcherSnapshot)>,
}

impl DispatcherSnapshot {
    const KIND: &'static str = "dispatcher_snapshot";

    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        encode(Self::KIND, self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistenceError> {
        decode(Self::KIND, bytes)
    }

    /// Whether the dispatcher was running when saved. An abort in progress
    /// does not count; it is not resumed.
    pub fn was_running(&self) -> bool {
        self.state == DispatcherState::Active
    }

    /// Number of dispatchers in the tree, this one included.
    pub fn tree_size(&self) -> usize {
        1 + self
            .sub_dispatchers
            .iter()
            .map(|(_, sub)| sub.tree_size())
            .sum::<usize>()
    }
}
