//! High-level runtime orchestrator.
//!
//! The runtime owns the dispatch worker, wires up command and event channels,
//! and exposes a builder-based API for hosts to drive dispatchers.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use dispatch_core::{
    ActionDispatchSystem, Catalog, DispatchConfig, DispatcherManager, EntityRegistry,
};

use crate::api::{Result, RuntimeError, RuntimeHandle};
use crate::events::EventBus;
use crate::manager::BusManager;
use crate::workers::{Command, DispatchWorker};

/// Runtime configuration shared across the orchestrator and workers.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub dispatch: DispatchConfig,
    pub event_buffer_size: usize,
    pub command_buffer_size: usize,
    /// Period of automatic `tick`s; `None` ticks only on request.
    pub tick_interval: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            event_buffer_size: 100,
            command_buffer_size: 32,
            tick_interval: None,
        }
    }
}

/// Runtime that confines an [`ActionDispatchSystem`] to one worker task.
///
/// [`RuntimeHandle`] provides a cloneable façade for clients.
pub struct DispatchRuntime {
    handle: RuntimeHandle,
    worker_handle: JoinHandle<()>,
}

impl DispatchRuntime {
    /// Create a new runtime builder
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Get a cloneable handle to this runtime
    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Stop the worker and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await;
        drop(self.handle);

        self.worker_handle.await.map_err(RuntimeError::WorkerJoin)
    }
}

/// Builder for [`DispatchRuntime`].
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    entities: Option<EntityRegistry>,
    catalog: Option<Catalog>,
    managers: Vec<Box<dyn DispatcherManager>>,
}

impl RuntimeBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            entities: None,
            catalog: None,
            managers: Vec::new(),
        }
    }

    /// Override runtime configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Provide the initial world; defaults to an empty registry.
    pub fn entities(mut self, entities: EntityRegistry) -> Self {
        self.entities = Some(entities);
        self
    }

    /// Catalog used by [`RuntimeHandle::restore`].
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Add an observer next to the built-in event bus manager.
    pub fn manager(mut self, manager: impl DispatcherManager + 'static) -> Self {
        self.managers.push(Box::new(manager));
        self
    }

    /// Build the runtime and spawn its worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> DispatchRuntime {
        let (command_tx, command_rx) = mpsc::channel::<Command>(self.config.command_buffer_size);
        let event_bus = EventBus::with_capacity(self.config.event_buffer_size);

        let mut system = ActionDispatchSystem::with_entities(
            self.config.dispatch,
            self.entities.unwrap_or_else(EntityRegistry::new),
        );
        system.add_manager(BusManager::new(event_bus.clone()));
        for manager in self.managers {
            system.add_boxed_manager(manager);
        }

        let handle = RuntimeHandle::new(command_tx, event_bus.clone());
        let worker = DispatchWorker::new(
            system,
            self.catalog.unwrap_or_default(),
            command_rx,
            event_bus,
            self.config.tick_interval,
        );

        let worker_handle = tokio::spawn(async move {
            worker.run().await;
        });

        DispatchRuntime {
            handle,
            worker_handle,
        }
    }
}
