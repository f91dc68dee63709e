//! Cloneable façade for issuing commands to the runtime.
//!
//! [`RuntimeHandle`] hides channel plumbing and offers async helpers for
//! driving dispatchers or streaming events from specific topics.

use std::collections::HashMap;

use tokio::sync::{broadcast, mpsc, oneshot};

use dispatch_core::{
    ActionId, ActionSignal, DispatcherId, DispatcherScript, DispatcherSnapshot, DispatcherState,
    EndPlayReason, EntityId, EntityKind, FinishTag, SharedAvailability,
};

use super::errors::{Result, RuntimeError};
use crate::events::{Event, EventBus, Topic};
use crate::workers::Command;

/// Client-facing handle to interact with the runtime
#[derive(Clone)]
pub struct RuntimeHandle {
    command_tx: mpsc::Sender<Command>,
    event_bus: EventBus,
}

impl RuntimeHandle {
    pub(crate) fn new(command_tx: mpsc::Sender<Command>, event_bus: EventBus) -> Self {
        Self {
            command_tx,
            event_bus,
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Spawn an entity. Entities given an `availability` can be claimed by
    /// dispatchers; the host toggles it to veto new claims.
    pub async fn spawn_entity(
        &self,
        kind: EntityKind,
        name: impl Into<String>,
        availability: Option<SharedAvailability>,
    ) -> Result<EntityId> {
        let name = name.into();
        self.request(|reply| Command::SpawnEntity {
            kind,
            name,
            availability,
            reply,
        })
        .await
    }

    /// Remove an entity from the world; dispatchers it leads abort.
    pub async fn destroy_entity(&self, entity: EntityId, reason: EndPlayReason) -> Result<()> {
        self.request(|reply| Command::DestroyEntity {
            entity,
            reason,
            reply,
        })
        .await
    }

    pub async fn unload_level(&self, level: EntityId) -> Result<()> {
        self.request(|reply| Command::UnloadLevel { level, reply })
            .await
    }

    /// Create a managed dispatcher in the `Deactive` state.
    pub async fn create_dispatcher(
        &self,
        name: impl Into<String>,
        script: impl DispatcherScript + 'static,
    ) -> Result<DispatcherId> {
        self.create(name.into(), Box::new(script), true).await
    }

    /// Create a dispatcher that does not publish lifecycle events.
    pub async fn create_unmanaged_dispatcher(
        &self,
        name: impl Into<String>,
        script: impl DispatcherScript + 'static,
    ) -> Result<DispatcherId> {
        self.create(name.into(), Box::new(script), false).await
    }

    async fn create(
        &self,
        name: String,
        script: Box<dyn DispatcherScript>,
        managed: bool,
    ) -> Result<DispatcherId> {
        self.request(|reply| Command::CreateDispatcher {
            name,
            script,
            managed,
            reply,
        })
        .await
    }

    pub async fn set_leader(&self, dispatcher: DispatcherId, leader: Option<EntityId>) -> Result<()> {
        Ok(self
            .request(|reply| Command::SetLeader {
                dispatcher,
                leader,
                reply,
            })
            .await??)
    }

    /// Validate and start a deactive main dispatcher.
    pub async fn start(&self, dispatcher: DispatcherId) -> Result<()> {
        Ok(self
            .request(|reply| Command::Start { dispatcher, reply })
            .await??)
    }

    /// Begin aborting an active dispatcher. Aborting one that is already
    /// aborting succeeds without effect.
    pub async fn abort(&self, dispatcher: DispatcherId) -> Result<()> {
        Ok(self
            .request(|reply| Command::Abort { dispatcher, reply })
            .await??)
    }

    pub async fn finish(&self, dispatcher: DispatcherId, tag: impl Into<FinishTag>) -> Result<()> {
        let tag = tag.into();
        Ok(self
            .request(|reply| Command::Finish {
                dispatcher,
                tag,
                reply,
            })
            .await??)
    }

    /// Deactivate a running dispatcher while keeping its actions, e.g.
    /// before saving.
    pub async fn suspend(&self, dispatcher: DispatcherId) -> Result<()> {
        Ok(self
            .request(|reply| Command::Suspend { dispatcher, reply })
            .await??)
    }

    pub async fn reactivate(&self, dispatcher: DispatcherId) -> Result<()> {
        Ok(self
            .request(|reply| Command::Reactivate { dispatcher, reply })
            .await??)
    }

    /// Deliver a host signal (request completed, custom script signal) to
    /// an action.
    pub async fn signal_action(&self, action: ActionId, signal: ActionSignal) -> Result<()> {
        Ok(self
            .request(|reply| Command::SignalAction {
                action,
                signal,
                reply,
            })
            .await??)
    }

    /// Advance the logical clock once and return it.
    pub async fn tick(&self) -> Result<u64> {
        self.request(|reply| Command::Tick { reply }).await
    }

    pub async fn save(&self, dispatcher: DispatcherId) -> Result<DispatcherSnapshot> {
        Ok(self
            .request(|reply| Command::Save { dispatcher, reply })
            .await??)
    }

    /// Restore a saved dispatcher tree through the runtime's catalog,
    /// resuming it if it was running when saved.
    pub async fn restore(&self, snapshot: DispatcherSnapshot) -> Result<DispatcherId> {
        let snapshot = Box::new(snapshot);
        Ok(self
            .request(|reply| Command::Restore { snapshot, reply })
            .await??)
    }

    /// State of a dispatcher; sub-dispatchers report their main's state.
    pub async fn query_state(&self, dispatcher: DispatcherId) -> Result<Option<DispatcherState>> {
        self.request(|reply| Command::QueryState { dispatcher, reply })
            .await
    }

    pub async fn current_actions(&self, dispatcher: DispatcherId) -> Result<Vec<ActionId>> {
        Ok(self
            .request(|reply| Command::CurrentActions { dispatcher, reply })
            .await??)
    }

    /// Managed dispatchers that are active or still aborting.
    pub async fn active_dispatchers(&self) -> Result<Vec<DispatcherId>> {
        self.request(|reply| Command::ActiveDispatchers { reply })
            .await
    }

    /// Subscribe to events from a specific topic
    ///
    /// # Topics
    ///
    /// - `Topic::Lifecycle` - Dispatcher started, aborted, deactivated, finished
    /// - `Topic::World` - Entity destruction, level unloads, leader loss
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe(topic)
    }

    /// Subscribe to multiple topics at once
    pub fn subscribe_multiple(&self, topics: &[Topic]) -> HashMap<Topic, broadcast::Receiver<Event>> {
        self.event_bus.subscribe_multiple(topics)
    }

    pub(crate) async fn shutdown(&self) {
        // A closed channel means the worker already stopped.
        let _ = self.command_tx.send(Command::Shutdown).await;
    }
}
