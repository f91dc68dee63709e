//! Worker tasks that back the runtime orchestration.

mod dispatch;

pub use dispatch::{Command, DispatchWorker};
