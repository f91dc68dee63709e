//! Unified error types surfaced by the runtime API.
//!
//! Wraps worker coordination failures and dispatch operation failures so
//! clients can bubble them up with consistent context.

use thiserror::Error;
use tokio::sync::oneshot;

use dispatch_core::DispatchError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("dispatch worker command channel closed")]
    CommandChannelClosed,

    #[error("dispatch worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("dispatch worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
