//! World notifications and the periodic tick.

use tracing::{debug, warn};

use super::{AbortRequest, ActionDispatchSystem};
use crate::action::ActionState;
use crate::dispatcher::DispatcherState;
use crate::entity::{EndPlayReason, EntityKind};
use crate::leader::LeaderLoss;
use crate::types::{DispatcherId, EntityId};

impl ActionDispatchSystem {
    /// Removes an entity from the world. Active dispatchers led by it abort.
    pub fn destroy_entity(&mut self, entity: EntityId, reason: EndPlayReason) {
        let name = self.entities.debug_name(entity);
        let Some(kind) = self.entities.despawn(entity) else {
            debug!("destroy of unknown entity {}", entity);
            return;
        };
        let loss = match kind {
            EntityKind::Level => LeaderLoss::Unloaded,
            EntityKind::Player | EntityKind::Actor => LeaderLoss::EndPlay(reason),
        };
        debug!("{} left the world ({:?})", name, loss);
        self.leader_lost(entity, loss);
    }

    /// Unloads a level entity. Active dispatchers led by it abort.
    pub fn unload_level(&mut self, level: EntityId) {
        match self.entities.kind(level) {
            Some(EntityKind::Level) => {
                self.entities.despawn(level);
                self.leader_lost(level, LeaderLoss::Unloaded);
            }
            Some(kind) => warn!("unload_level on {} which is a {}", level, kind),
            None => debug!("unload of unknown level {}", level),
        }
    }

    /// Aborts every active dispatcher observing `loss` of `leader`.
    ///
    /// For hosts that own entity lifetimes themselves; does not touch the
    /// entity registry.
    pub fn leader_lost(&mut self, leader: EntityId, loss: LeaderLoss) {
        for dispatcher in self.leaders.watchers(leader, loss) {
            match self.state(dispatcher) {
                Some(DispatcherState::Active) => {
                    warn!(
                        "leader {} of {} lost ({:?}); aborting",
                        leader,
                        self.debug_name(dispatcher),
                        loss
                    );
                    self.abort_dispatch(dispatcher, AbortRequest::new());
                }
                state => debug!(
                    "leader {} of {} lost while {:?}",
                    leader,
                    self.debug_name(dispatcher),
                    state
                ),
            }
        }
    }

    /// Advances the logical clock, enforces abort deadlines and aborts
    /// active dispatchers that became invalid.
    pub fn tick(&mut self) {
        self.clock += 1;
        self.enforce_abort_deadlines();
        if self.config.abort_invalid_dispatchers {
            self.abort_invalid_dispatchers();
        }
    }

    fn enforce_abort_deadlines(&mut self) {
        let Some(timeout) = self.config.abort_timeout_ticks else {
            return;
        };
        let now = self.clock;
        let overdue: Vec<DispatcherId> = self
            .dispatchers
            .values()
            .filter(|d| d.state == DispatcherState::Aborting)
            .filter(|d| d.aborting_since.is_some_and(|since| now.saturating_sub(since) >= timeout))
            .map(|d| d.id)
            .collect();

        for id in overdue {
            let actions = self
                .dispatchers
                .get(&id)
                .map(|d| d.current_actions.clone())
                .unwrap_or_default();
            let mut forced = 0;
            for action in actions {
                if let Some(slot) = self.actions.get_mut(&action)
                    && slot.state.is_active()
                {
                    slot.state = ActionState::Deactive;
                    forced += 1;
                }
            }
            warn!(
                "{} exceeded its abort deadline of {} ticks; forced {} actions to stop",
                self.debug_name(id),
                timeout,
                forced
            );
            self.try_complete_abort(id);
        }
    }

    fn abort_invalid_dispatchers(&mut self) {
        let invalid: Vec<_> = self
            .dispatchers
            .values()
            .filter(|d| !d.is_sub_dispatcher() && d.state == DispatcherState::Active)
            .filter_map(|d| self.validity(d).err().map(|refusal| (d.id, refusal)))
            .collect();

        for (id, refusal) in invalid {
            if self.state(id) != Some(DispatcherState::Active) {
                continue;
            }
            warn!("{} became invalid: {}; aborting", self.debug_name(id), refusal);
            self.abort_dispatch(id, AbortRequest::new());
        }
    }
}
