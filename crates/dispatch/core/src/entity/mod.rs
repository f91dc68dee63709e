//! External entities referenced by dispatchers.
//!
//! The entity runtime itself (spawning, physics, replication) lives outside
//! this crate. [`EntityRegistry`] is the slice of it the dispatch system
//! needs: whether a reference still resolves, what kind of entity it is, and
//! whether the entity can currently take part in a dispatched action.
//! Exclusive ownership markers are kept separately in [`ClaimTable`].

mod claims;

pub use claims::{ClaimConflict, ClaimTable};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::types::EntityId;

/// Kind of an external entity, which decides how leader loss is observed.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    /// Player-controlled character; its end of play ends a session it leads.
    Player,
    /// Level or streamed region; unloading it ends a session it leads.
    Level,
    /// Any other placed actor (doors, NPCs, props).
    Actor,
}

/// Why an entity left play.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum EndPlayReason {
    Destroyed,
    LevelTransition,
    RemovedFromWorld,
    /// Player disconnected or the session quit.
    Quit,
}

/// Capability exposed by entities that participate in dispatched actions.
pub trait DispatchableEntity: Send {
    /// Whether the entity can currently be driven by a dispatcher
    /// (e.g. false while ragdolled or in another interaction).
    fn can_execute_dispatchable_action(&self) -> bool;
}

/// Cloneable availability flag usable as a [`DispatchableEntity`].
///
/// The host keeps one clone and toggles it; the registry holds the other.
#[derive(Clone, Debug)]
pub struct SharedAvailability(Arc<AtomicBool>);

impl SharedAvailability {
    pub fn new(available: bool) -> Self {
        Self(Arc::new(AtomicBool::new(available)))
    }

    pub fn set(&self, available: bool) {
        self.0.store(available, Ordering::Relaxed);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for SharedAvailability {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DispatchableEntity for SharedAvailability {
    fn can_execute_dispatchable_action(&self) -> bool {
        self.get()
    }
}

struct EntityRecord {
    kind: EntityKind,
    name: String,
    capability: Option<Box<dyn DispatchableEntity>>,
}

/// Directory of resolvable entities.
#[derive(Default)]
pub struct EntityRegistry {
    entities: BTreeMap<EntityId, EntityRecord>,
    next_id: u32,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity without dispatch capability.
    pub fn spawn(&mut self, kind: EntityKind, name: impl Into<String>) -> EntityId {
        self.insert(kind, name.into(), None)
    }

    /// Registers an entity that exposes [`DispatchableEntity`].
    pub fn spawn_dispatchable(
        &mut self,
        kind: EntityKind,
        name: impl Into<String>,
        capability: impl DispatchableEntity + 'static,
    ) -> EntityId {
        self.insert(kind, name.into(), Some(Box::new(capability)))
    }

    fn insert(
        &mut self,
        kind: EntityKind,
        name: String,
        capability: Option<Box<dyn DispatchableEntity>>,
    ) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.insert(
            id,
            EntityRecord {
                kind,
                name,
                capability,
            },
        );
        id
    }

    /// Removes an entity; every reference to it stops resolving.
    pub fn despawn(&mut self, id: EntityId) -> Option<EntityKind> {
        self.entities.remove(&id).map(|record| record.kind)
    }

    pub fn is_resolvable(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn kind(&self, id: EntityId) -> Option<EntityKind> {
        self.entities.get(&id).map(|record| record.kind)
    }

    /// Dispatch capability of the entity, if it resolves and exposes one.
    pub fn capability(&self, id: EntityId) -> Option<&dyn DispatchableEntity> {
        self.entities
            .get(&id)
            .and_then(|record| record.capability.as_deref())
    }

    /// `name#id` for diagnostics; unresolvable ids render as `<gone>#id`.
    pub fn debug_name(&self, id: EntityId) -> String {
        match self.entities.get(&id) {
            Some(record) => format!("{}{}", record.name, id),
            None => format!("<gone>{}", id),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
