//! Concrete dispatch content and data loaders.
//!
//! This crate houses the actions scripted flows use most (moving a pawn,
//! playing a level sequence) and loaders for dispatch data files:
//! - Actions over host collaborators ([`Navigator`], [`SequencePlayer`])
//! - Dispatch configuration (data-driven via TOML)
//!
//! Everything here builds on `dispatch-core` types only.

pub mod actions;

#[cfg(feature = "loaders")]
pub mod loaders;

pub use actions::{
    Location, MoveGoal, MoveTo, Navigator, PlaySequence, SequenceBinding, SequencePlayer,
    action_catalog,
};

#[cfg(feature = "loaders")]
pub use loaders::{ConfigLoader, LoadResult};
