//! Leader-loss observation.
//!
//! An active dispatcher led by a player watches that player's end of play; one
//! led by a level watches the level's unload. The system aborts every watcher
//! when the corresponding notification arrives.

use std::collections::BTreeMap;

use crate::entity::{EndPlayReason, EntityKind};
use crate::types::{DispatcherId, EntityId};

/// Which notification a dispatcher subscribed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LeaderWatch {
    EndPlay,
    Unload,
}

impl LeaderWatch {
    /// Watch kind for a leader of `kind`; other actors are not observed.
    pub fn for_kind(kind: EntityKind) -> Option<Self> {
        match kind {
            EntityKind::Player => Some(Self::EndPlay),
            EntityKind::Level => Some(Self::Unload),
            EntityKind::Actor => None,
        }
    }
}

/// A leader left the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaderLoss {
    EndPlay(EndPlayReason),
    Unloaded,
}

impl LeaderLoss {
    fn watch(self) -> LeaderWatch {
        match self {
            Self::EndPlay(_) => LeaderWatch::EndPlay,
            Self::Unloaded => LeaderWatch::Unload,
        }
    }
}

/// Subscriptions of dispatchers to their leaders.
#[derive(Debug, Default)]
pub(crate) struct LeaderMonitor {
    watches: BTreeMap<EntityId, BTreeMap<DispatcherId, LeaderWatch>>,
}

impl LeaderMonitor {
    pub(crate) fn watch(
        &mut self,
        leader: EntityId,
        kind: EntityKind,
        dispatcher: DispatcherId,
    ) -> Option<LeaderWatch> {
        let watch = LeaderWatch::for_kind(kind)?;
        self.watches
            .entry(leader)
            .or_default()
            .insert(dispatcher, watch);
        Some(watch)
    }

    pub(crate) fn unwatch(&mut self, leader: EntityId, dispatcher: DispatcherId) -> bool {
        let Some(watchers) = self.watches.get_mut(&leader) else {
            return false;
        };
        let removed = watchers.remove(&dispatcher).is_some();
        if watchers.is_empty() {
            self.watches.remove(&leader);
        }
        removed
    }

    /// Dispatchers subscribed to `loss` of `leader`, in id order.
    pub(crate) fn watchers(&self, leader: EntityId, loss: LeaderLoss) -> Vec<DispatcherId> {
        let wanted = loss.watch();
        self.watches
            .get(&leader)
            .map(|watchers| {
                watchers
                    .iter()
                    .filter(|&(_, &watch)| watch == wanted)
                    .map(|(&id, _)| id)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn is_watching(&self, dispatcher: DispatcherId) -> bool {
        self.watches
            .values()
            .any(|watchers| watchers.contains_key(&dispatcher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_matching_loss_reaches_watchers() {
        let mut monitor = LeaderMonitor::default();
        let player = EntityId(0);
        let d = DispatcherId(1);

        assert_eq!(
            monitor.watch(player, EntityKind::Player, d),
            Some(LeaderWatch::EndPlay)
        );
        assert!(monitor.watchers(player, LeaderLoss::Unloaded).is_empty());
        assert_eq!(
            monitor.watchers(player, LeaderLoss::EndPlay(EndPlayReason::Quit)),
            vec![d]
        );

        assert!(monitor.unwatch(player, d));
        assert!(!monitor.is_watching(d));
    }

    #[test]
    fn actors_are_not_watched() {
        let mut monitor = LeaderMonitor::default();
        assert_eq!(
            monitor.watch(EntityId(5), EntityKind::Actor, DispatcherId(1)),
            None
        );
        assert!(!monitor.is_watching(DispatcherId(1)));
    }
}
