//! Async runtime for the action dispatch system.
//!
//! The dispatch system is single-threaded; this crate confines it to one
//! worker task and exposes it through [`RuntimeHandle`]. Hosts embed
//! [`DispatchRuntime`] to create and drive dispatchers, report entity
//! lifetimes, and subscribe to lifecycle events.
//!
//! Modules are organized by responsibility:
//! - [`runtime`] hosts the orchestrator and builder
//! - [`api`] exposes the types downstream clients interact with
//! - [`events`] provides topic-based event bus for flexible event routing
//! - [`manager`] republishes manager notifications on the bus
//! - `workers` keeps background tasks internal to the crate
pub mod api;
pub mod events;
pub mod manager;
pub mod runtime;

mod workers;

pub use api::{Result, RuntimeError, RuntimeHandle};
pub use events::{DispatcherEvent, Event, EventBus, Topic, WorldEvent};
pub use manager::BusManager;
pub use runtime::{DispatchRuntime, RuntimeBuilder, RuntimeConfig};
