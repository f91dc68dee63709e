//! Topic-based event bus implementation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::types::{DispatcherEvent, WorldEvent};

/// Topics for event routing
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Topic {
    /// Dispatcher lifecycle transitions
    Lifecycle,
    /// Entity destruction, level unloads and leader loss
    World,
}

/// Event wrapper that carries the topic and typed event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Lifecycle(DispatcherEvent),
    World(WorldEvent),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Lifecycle(_) => Topic::Lifecycle,
            Event::World(_) => Topic::World,
        }
    }
}

/// Topic-based event bus
///
/// Every topic owns a broadcast channel created up front, so subscribing
/// never fails. Publishing without subscribers drops the event.
#[derive(Clone)]
pub struct EventBus {
    lifecycle: broadcast::Sender<Event>,
    world: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a new event bus with default capacity for each topic
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Creates a new event bus with specified capacity per topic
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lifecycle: broadcast::channel(capacity).0,
            world: broadcast::channel(capacity).0,
        }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Lifecycle => &self.lifecycle,
            Topic::World => &self.world,
        }
    }

    /// Publish an event to its corresponding topic
    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        if self.sender(topic).send(event).is_err() {
            tracing::trace!("No subscribers for topic {:?}", topic);
        }
    }

    /// Subscribe to a specific topic
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.sender(topic).subscribe()
    }

    /// Subscribe to multiple topics
    pub fn subscribe_multiple(
        &self,
        topics: &[Topic],
    ) -> HashMap<Topic, broadcast::Receiver<Event>> {
        topics
            .iter()
            .map(|&topic| (topic, self.subscribe(topic)))
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::{DispatcherId, EntityId};

    #[tokio::test]
    async fn events_reach_only_their_topic() {
        let bus = EventBus::with_capacity(4);
        let mut lifecycle = bus.subscribe(Topic::Lifecycle);
        let mut world = bus.subscribe(Topic::World);

        bus.publish(Event::World(WorldEvent::LevelUnloaded {
            level: EntityId(3),
        }));
        bus.publish(Event::Lifecycle(DispatcherEvent::Started {
            dispatcher: DispatcherId(1),
        }));

        assert_eq!(
            lifecycle.recv().await.unwrap(),
            Event::Lifecycle(DispatcherEvent::Started {
                dispatcher: DispatcherId(1)
            })
        );
        assert!(lifecycle.try_recv().is_err());
        assert_eq!(world.recv().await.unwrap().topic(), Topic::World);
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(Event::Lifecycle(DispatcherEvent::Finished {
            dispatcher: DispatcherId(2),
        }));
        let map = bus.subscribe_multiple(&[Topic::Lifecycle, Topic::World]);
        assert_eq!(map.len(), 2);
    }
}
