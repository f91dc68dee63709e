//! Save/load support for dispatchers and their actions.
//!
//! Scripts and actions are trait objects, so their fields are persisted as
//! opaque bincode payloads tagged with a stable kind string. A [`Catalog`]
//! maps kinds back to loader closures when a snapshot is restored.
//!
//! Closures (abort callbacks, finish listeners, barrier completions) are not
//! persisted; scripted flows that need them after a load re-register them
//! from their activation hooks.

mod catalog;
mod snapshot;

pub use catalog::{ActionLoader, Catalog, ScriptLoader};
pub use snapshot::{ActionSnapshot, BarrierSnapshot, DispatcherSnapshot};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{DispatchFailure, ErrorSeverity};

/// Errors raised while saving or restoring dispatch state.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to encode {kind}: {message}")]
    Encode { kind: String, message: String },

    #[error("failed to decode {kind}: {message}")]
    Decode { kind: String, message: String },

    #[error("no loader registered for kind `{0}`")]
    UnknownKind(String),

    #[error("{0} is running a hook and cannot be saved")]
    Busy(String),
}

impl DispatchFailure for PersistenceError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Encode { .. } | Self::Busy(_) => ErrorSeverity::Internal,
            Self::Decode { .. } => ErrorSeverity::Fatal,
            Self::UnknownKind(_) => ErrorSeverity::Validation,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Encode { .. } => "persist_encode",
            Self::Decode { .. } => "persist_decode",
            Self::UnknownKind(_) => "persist_unknown_kind",
            Self::Busy(_) => "persist_busy",
        }
    }
}

/// Serializable script or action type with a stable kind tag.
pub trait Persistent: Serialize + DeserializeOwned + 'static {
    /// Kind tag written into snapshots; must stay stable across releases.
    const KIND: &'static str;
}

/// Object-safe save hook, implemented for every [`Persistent`] type.
pub trait SaveState {
    fn kind(&self) -> &'static str;

    fn save_state(&self) -> Result<Vec<u8>, PersistenceError>;
}

impl<T: Persistent> SaveState for T {
    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn save_state(&self) -> Result<Vec<u8>, PersistenceError> {
        encode(T::KIND, self)
    }
}

pub(crate) fn encode<T: Serialize + ?Sized>(
    kind: &str,
    value: &T,
) -> Result<Vec<u8>, PersistenceError> {
    bincode::serialize(value).map_err(|e| PersistenceError::Encode {
        kind: kind.to_owned(),
        message: e.to_string(),
    })
}

/// Decodes a payload produced by [`SaveState::save_state`].
pub fn decode<T: DeserializeOwned>(kind: &str, bytes: &[u8]) -> Result<T, PersistenceError> {
    bincode::deserialize(bytes).map_err(|e| PersistenceError::Decode {
        kind: kind.to_owned(),
        message: e.to_string(),
    })
}
