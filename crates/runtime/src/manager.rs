//! Bridges the core manager contract onto the event bus.

use dispatch_core::{DispatcherId, DispatcherManager};

use crate::events::{DispatcherEvent, Event, EventBus};

/// [`DispatcherManager`] that republishes every notification on
/// [`Topic::Lifecycle`](crate::Topic::Lifecycle).
pub struct BusManager {
    bus: EventBus,
}

impl BusManager {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    fn publish(&self, event: DispatcherEvent) {
        self.bus.publish(Event::Lifecycle(event));
    }
}

impl DispatcherManager for BusManager {
    fn on_dispatcher_started(&mut self, dispatcher: DispatcherId) {
        self.publish(DispatcherEvent::Started { dispatcher });
    }

    fn on_dispatcher_aborted(&mut self, dispatcher: DispatcherId) {
        self.publish(DispatcherEvent::Aborted { dispatcher });
    }

    fn on_dispatcher_deactivated(&mut self, dispatcher: DispatcherId) {
        self.publish(DispatcherEvent::Deactivated { dispatcher });
    }

    fn on_dispatcher_finished(&mut self, dispatcher: DispatcherId) {
        self.publish(DispatcherEvent::Finished { dispatcher });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Topic;

    #[test]
    fn notifications_become_lifecycle_events() {
        let bus = EventBus::with_capacity(8);
        let mut rx = bus.subscribe(Topic::Lifecycle);
        let mut manager = BusManager::new(bus);
        let id = DispatcherId(5);

        manager.on_dispatcher_aborted(id);
        manager.on_dispatcher_deactivated(id);

        assert_eq!(
            rx.try_recv().unwrap(),
            Event::Lifecycle(DispatcherEvent::Aborted { dispatcher: id })
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::Lifecycle(DispatcherEvent::Deactivated { dispatcher: id })
        );
    }
}
