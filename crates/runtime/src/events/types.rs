//! Event payloads published by the dispatch worker.

use serde::{Deserialize, Serialize};

use dispatch_core::{DispatcherId, EndPlayReason, EntityId};

/// Lifecycle transition of a managed dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatcherEvent {
    /// Became active through start or reactivation.
    Started { dispatcher: DispatcherId },
    /// An abort began; `Deactivated` follows once every action stopped.
    Aborted { dispatcher: DispatcherId },
    Deactivated { dispatcher: DispatcherId },
    Finished { dispatcher: DispatcherId },
}

impl DispatcherEvent {
    pub fn dispatcher(&self) -> DispatcherId {
        match *self {
            Self::Started { dispatcher }
            | Self::Aborted { dispatcher }
            | Self::Deactivated { dispatcher }
            | Self::Finished { dispatcher } => dispatcher,
        }
    }
}

/// Entity lifetime changes observed by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldEvent {
    EntityDestroyed {
        entity: EntityId,
        reason: EndPlayReason,
    },
    LevelUnloaded {
        level: EntityId,
    },
    /// An active dispatcher lost its leader and is aborting.
    LeaderLost {
        leader: EntityId,
        dispatcher: DispatcherId,
    },
}
