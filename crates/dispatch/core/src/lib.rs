//! Action dispatch: scripted orchestration of gameplay actions.
//!
//! `dispatch-core` drives dispatchers (scripted flows owned by a leader) and
//! the actions they activate through their lifecycles, validates and claims
//! the entities they reference, synchronizes parallel branches with barriers
//! and nests sub-dispatchers under a main dispatcher. All state mutation
//! flows through [`system::ActionDispatchSystem`]; concrete dispatcher and
//! action types plug in through [`DispatcherScript`] and
//! [`DispatchableAction`].
pub mod action;
pub mod config;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod leader;
pub mod manager;
pub mod persist;
pub mod reference;
pub mod system;
pub mod types;

pub use action::{AbortProgress, ActionContext, ActionSignal, ActionState, DispatchableAction};
pub use config::{DispatchConfig, NetRole};
pub use dispatcher::{
    AbortCallback, Barrier, BarrierCallback, DeactivatedCallback, Dispatcher, DispatcherScript,
    DispatcherState, FinishListener, ScriptContext,
};
pub use entity::{
    ClaimConflict, ClaimTable, DispatchableEntity, EndPlayReason, EntityKind, EntityRegistry,
    SharedAvailability,
};
pub use error::{DispatchFailure, ErrorSeverity};
pub use leader::{LeaderLoss, LeaderWatch};
pub use manager::{DispatcherManager, DispatcherRegistry};
pub use persist::{
    ActionSnapshot, BarrierSnapshot, Catalog, DispatcherSnapshot, PersistenceError, Persistent,
    SaveState,
};
pub use reference::{
    DeclareReferences, DeclaredReference, ReferenceField, ReferenceRefusal, ReferenceSource,
    validate_references,
};
pub use system::{AbortRequest, ActionDispatchSystem, DispatchError, StartRefusal};
pub use types::{ActionEvent, ActionId, DispatcherId, EntityId, FinishTag, NodeId};
