//! Concrete dispatchable actions.
//!
//! Actions talk to host services through narrow collaborator traits
//! ([`Navigator`], [`SequencePlayer`]) injected at construction and re-bound
//! by catalog loaders after a restore.

pub mod move_to;
pub mod sequence;

pub use move_to::{Location, MoveGoal, MoveTo, Navigator};
pub use sequence::{PlaySequence, SequenceBinding, SequencePlayer};

use std::sync::Arc;

use dispatch_core::Catalog;

/// Catalog with loaders for every action of this crate.
pub fn action_catalog(navigator: Arc<dyn Navigator>, player: Arc<dyn SequencePlayer>) -> Catalog {
    let mut catalog = Catalog::new();
    MoveTo::register(&mut catalog, navigator);
    PlaySequence::register(&mut catalog, player);
    catalog
}
