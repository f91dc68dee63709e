//! Dispatch worker that owns the authoritative [`ActionDispatchSystem`].
//!
//! Receives commands from [`RuntimeHandle`](crate::RuntimeHandle), drives the
//! system, and publishes world events to the [`EventBus`]. Lifecycle events
//! reach the bus through the [`BusManager`](crate::BusManager) registered on
//! the system.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, trace};

use dispatch_core::{
    AbortRequest, ActionDispatchSystem, ActionId, ActionSignal, Catalog, DispatchError,
    DispatcherId, DispatcherScript, DispatcherSnapshot, DispatcherState, EndPlayReason, EntityId,
    EntityKind, FinishTag, SharedAvailability,
};

use crate::events::{Event, EventBus, WorldEvent};

type Reply<T> = oneshot::Sender<Result<T, DispatchError>>;

/// Commands that can be sent to the dispatch worker
pub enum Command {
    SpawnEntity {
        kind: EntityKind,
        name: String,
        /// Dispatch capability; `None` spawns a plain entity.
        availability: Option<SharedAvailability>,
        reply: oneshot::Sender<EntityId>,
    },
    DestroyEntity {
        entity: EntityId,
        reason: EndPlayReason,
        reply: oneshot::Sender<()>,
    },
    UnloadLevel {
        level: EntityId,
        reply: oneshot::Sender<()>,
    },
    CreateDispatcher {
        name: String,
        script: Box<dyn DispatcherScript>,
        managed: bool,
        reply: oneshot::Sender<DispatcherId>,
    },
    SetLeader {
        dispatcher: DispatcherId,
        leader: Option<EntityId>,
        reply: Reply<()>,
    },
    Start {
        dispatcher: DispatcherId,
        reply: Reply<()>,
    },
    Abort {
        dispatcher: DispatcherId,
        reply: Reply<()>,
    },
    Finish {
        dispatcher: DispatcherId,
        tag: FinishTag,
        reply: Reply<()>,
    },
    Suspend {
        dispatcher: DispatcherId,
        reply: Reply<()>,
    },
    Reactivate {
        dispatcher: DispatcherId,
        reply: Reply<()>,
    },
    SignalAction {
        action: ActionId,
        signal: ActionSignal,
        reply: Reply<()>,
    },
    /// Advance the logical clock once. Replies with the new clock.
    Tick { reply: oneshot::Sender<u64> },
    Save {
        dispatcher: DispatcherId,
        reply: Reply<DispatcherSnapshot>,
    },
    Restore {
        snapshot: Box<DispatcherSnapshot>,
        reply: Reply<DispatcherId>,
    },
    QueryState {
        dispatcher: DispatcherId,
        reply: oneshot::Sender<Option<DispatcherState>>,
    },
    CurrentActions {
        dispatcher: DispatcherId,
        reply: Reply<Vec<ActionId>>,
    },
    ActiveDispatchers {
        reply: oneshot::Sender<Vec<DispatcherId>>,
    },
    Shutdown,
}

/// Background task that processes dispatch commands.
pub struct DispatchWorker {
    system: ActionDispatchSystem,
    catalog: Catalog,
    command_rx: mpsc::Receiver<Command>,
    event_bus: EventBus,
    tick_interval: Option<Duration>,
}

impl DispatchWorker {
    pub fn new(
        system: ActionDispatchSystem,
        catalog: Catalog,
        command_rx: mpsc::Receiver<Command>,
        event_bus: EventBus,
        tick_interval: Option<Duration>,
    ) -> Self {
        info!(
            "DispatchWorker initialized with {} entities, {} dispatchers, tick {:?}",
            system.entities().len(),
            system.dispatchers().count(),
            tick_interval
        );

        Self {
            system,
            catalog,
            command_rx,
            event_bus,
            tick_interval,
        }
    }

    /// Main worker loop. Ends on [`Command::Shutdown`] or once every handle
    /// is dropped.
    pub async fn run(mut self) {
        let mut ticker = self.tick_interval.map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                _ = next_tick(&mut ticker) => {
                    self.system.tick();
                    trace!("tick {}", self.system.clock());
                }
            }
        }
        info!("DispatchWorker stopped at clock {}", self.system.clock());
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SpawnEntity {
                kind,
                name,
                availability,
                reply,
            } => {
                let entities = self.system.entities_mut();
                let entity = match availability {
                    Some(availability) => entities.spawn_dispatchable(kind, name, availability),
                    None => entities.spawn(kind, name),
                };
                respond(reply, entity, "SpawnEntity");
            }
            Command::DestroyEntity {
                entity,
                reason,
                reply,
            } => {
                self.destroy_entity(entity, reason);
                respond(reply, (), "DestroyEntity");
            }
            Command::UnloadLevel { level, reply } => {
                self.unload_level(level);
                respond(reply, (), "UnloadLevel");
            }
            Command::CreateDispatcher {
                name,
                script,
                managed,
                reply,
            } => {
                let id = self.system.create_boxed_dispatcher(name, script);
                if !managed {
                    self.system.set_managed(id, false);
                }
                respond(reply, id, "CreateDispatcher");
            }
            Command::SetLeader {
                dispatcher,
                leader,
                reply,
            } => {
                let result = self
                    .require_main(dispatcher, DispatcherState::Deactive)
                    .map(|()| self.system.set_leader(dispatcher, leader));
                respond(reply, result, "SetLeader");
            }
            Command::Start { dispatcher, reply } => {
                let result = self
                    .require_main(dispatcher, DispatcherState::Deactive)
                    .and_then(|()| self.system.start_dispatch(dispatcher));
                respond(reply, result, "Start");
            }
            Command::Abort { dispatcher, reply } => {
                let result = self.abort(dispatcher);
                respond(reply, result, "Abort");
            }
            Command::Finish {
                dispatcher,
                tag,
                reply,
            } => {
                let result = self
                    .require(dispatcher, DispatcherState::Active)
                    .map(|()| self.system.finish_dispatch(dispatcher, tag));
                respond(reply, result, "Finish");
            }
            Command::Suspend { dispatcher, reply } => {
                respond(reply, self.system.suspend_dispatch(dispatcher), "Suspend");
            }
            Command::Reactivate { dispatcher, reply } => {
                let result = self
                    .require_main(dispatcher, DispatcherState::Deactive)
                    .and_then(|()| self.system.reactive_dispatch(dispatcher));
                respond(reply, result, "Reactivate");
            }
            Command::SignalAction {
                action,
                signal,
                reply,
            } => {
                let result = match self.system.action_state(action) {
                    Some(_) => {
                        self.system.signal_action(action, signal);
                        Ok(())
                    }
                    None => Err(DispatchError::UnknownAction(action)),
                };
                respond(reply, result, "SignalAction");
            }
            Command::Tick { reply } => {
                self.system.tick();
                respond(reply, self.system.clock(), "Tick");
            }
            Command::Save { dispatcher, reply } => {
                respond(reply, self.system.save_dispatcher(dispatcher), "Save");
            }
            Command::Restore { snapshot, reply } => {
                let result = self.system.restore_and_reactivate(&snapshot, &self.catalog);
                respond(reply, result, "Restore");
            }
            Command::QueryState { dispatcher, reply } => {
                respond(reply, self.system.state(dispatcher), "QueryState");
            }
            Command::CurrentActions { dispatcher, reply } => {
                let result = self
                    .system
                    .dispatcher(dispatcher)
                    .map(|d| d.current_actions().to_vec())
                    .ok_or(DispatchError::UnknownDispatcher(dispatcher));
                respond(reply, result, "CurrentActions");
            }
            Command::ActiveDispatchers { reply } => {
                let active = self.system.registry().active().collect();
                respond(reply, active, "ActiveDispatchers");
            }
            Command::Shutdown => {}
        }
    }

    /// Rejects operations the core treats as programmer error: unknown ids
    /// and dispatchers not in the `expected` state.
    fn require(&self, id: DispatcherId, expected: DispatcherState) -> Result<(), DispatchError> {
        let dispatcher = self
            .system
            .dispatcher(id)
            .ok_or(DispatchError::UnknownDispatcher(id))?;
        match self.system.state(id) {
            Some(state) if state == expected => Ok(()),
            Some(state) => Err(DispatchError::UnexpectedState {
                dispatcher: dispatcher.debug_name(),
                state,
                expected,
            }),
            None => Err(DispatchError::UnknownDispatcher(id)),
        }
    }

    fn require_main(
        &self,
        id: DispatcherId,
        expected: DispatcherState,
    ) -> Result<(), DispatchError> {
        if let Some(dispatcher) = self.system.dispatcher(id)
            && dispatcher.is_sub_dispatcher()
        {
            return Err(DispatchError::SubDispatcher(dispatcher.debug_name()));
        }
        self.require(id, expected)
    }

    fn abort(&mut self, id: DispatcherId) -> Result<(), DispatchError> {
        match self.require(id, DispatcherState::Active) {
            Ok(()) => {}
            // Already winding down; nothing to add.
            Err(DispatchError::UnexpectedState {
                state: DispatcherState::Aborting,
                ..
            }) => return Ok(()),
            Err(e) => return Err(e),
        }
        self.system.abort_dispatch(id, AbortRequest::new());
        Ok(())
    }

    /// Active dispatchers currently observing `leader`.
    fn watchers(&self, leader: EntityId) -> Vec<DispatcherId> {
        self.system
            .dispatchers()
            .filter(|d| d.leader() == Some(leader) && self.system.is_watching_leader(d.id()))
            .map(|d| d.id())
            .collect()
    }

    fn destroy_entity(&mut self, entity: EntityId, reason: EndPlayReason) {
        if self.system.entities().kind(entity).is_none() {
            debug!("DestroyEntity for unknown entity {}", entity);
            return;
        }
        let watchers = self.watchers(entity);
        self.system.destroy_entity(entity, reason);
        self.publish_leader_loss(entity, watchers);
        self.event_bus
            .publish(Event::World(WorldEvent::EntityDestroyed { entity, reason }));
    }

    fn unload_level(&mut self, level: EntityId) {
        if self.system.entities().kind(level) != Some(EntityKind::Level) {
            debug!("UnloadLevel for {} which is not a loaded level", level);
            return;
        }
        let watchers = self.watchers(level);
        self.system.unload_level(level);
        self.publish_leader_loss(level, watchers);
        self.event_bus
            .publish(Event::World(WorldEvent::LevelUnloaded { level }));
    }

    fn publish_leader_loss(&self, leader: EntityId, watchers: Vec<DispatcherId>) {
        for dispatcher in watchers {
            self.event_bus
                .publish(Event::World(WorldEvent::LeaderLost { leader, dispatcher }));
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn respond<T>(reply: oneshot::Sender<T>, value: T, command: &str) {
    if reply.send(value).is_err() {
        debug!("{} reply channel closed (caller dropped)", command);
    }
}
