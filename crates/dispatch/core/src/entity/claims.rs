//! Exclusive claims placed by dispatchers on referenced entities.

use std::collections::BTreeMap;

use crate::types::{DispatcherId, EntityId};

/// An entity is already claimed by another dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("entity {entity} is claimed by dispatcher {holder}")]
pub struct ClaimConflict {
    pub entity: EntityId,
    pub holder: DispatcherId,
}

/// Mapping from entity to the dispatcher currently claiming it.
///
/// Claim and release are the only mutation points; both happen synchronously
/// during dispatcher state transitions.
#[derive(Debug, Default)]
pub struct ClaimTable {
    holders: BTreeMap<EntityId, DispatcherId>,
}

impl ClaimTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current claimant of `entity`.
    pub fn holder(&self, entity: EntityId) -> Option<DispatcherId> {
        self.holders.get(&entity).copied()
    }

    /// Claims `entity` for `by`. Re-claiming by the same holder is a no-op.
    pub fn claim(&mut self, entity: EntityId, by: DispatcherId) -> Result<(), ClaimConflict> {
        match self.holders.get(&entity) {
            Some(&holder) if holder != by => Err(ClaimConflict { entity, holder }),
            _ => {
                self.holders.insert(entity, by);
                Ok(())
            }
        }
    }

    /// Releases every claim held by `by`, returning the released entities.
    pub fn release_all(&mut self, by: DispatcherId) -> Vec<EntityId> {
        let released: Vec<EntityId> = self
            .holders
            .iter()
            .filter(|&(_, &holder)| holder == by)
            .map(|(&entity, _)| entity)
            .collect();
        for entity in &released {
            self.holders.remove(entity);
        }
        released
    }

    /// Entities claimed by `by`, in id order.
    pub fn claimed_by(&self, by: DispatcherId) -> impl Iterator<Item = EntityId> + '_ {
        self.holders
            .iter()
            .filter(move |&(_, &holder)| holder == by)
            .map(|(&entity, _)| entity)
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}
