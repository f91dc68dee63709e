use serde::{Deserialize, Serialize};

/// Which side of the network this dispatch system runs on.
///
/// Dispatch logic is server-authoritative; a client-side system keeps its
/// records (for inspection) but refuses to start anything.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum NetRole {
    #[default]
    Authority,
    Client,
}

/// Dispatch configuration constants and tunable parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub net_role: NetRole,

    /// Ticks an aborting dispatcher waits for pending actions before they are
    /// force-deactivated. `None` waits for an explicit `abort_finished`.
    pub abort_timeout_ticks: Option<u64>,

    /// Abort active dispatchers whose validity check fails during `tick`.
    pub abort_invalid_dispatchers: bool,

    /// Log declared references that are unset while validating.
    pub warn_unset_references: bool,
}

impl DispatchConfig {
    // ===== runtime-tunable defaults =====
    pub const DEFAULT_ABORT_TIMEOUT_TICKS: u64 = 300;

    pub fn new() -> Self {
        Self {
            net_role: NetRole::Authority,
            abort_timeout_ticks: Some(Self::DEFAULT_ABORT_TIMEOUT_TICKS),
            abort_invalid_dispatchers: true,
            warn_unset_references: true,
        }
    }

    pub fn client() -> Self {
        Self {
            net_role: NetRole::Client,
            ..Self::new()
        }
    }

    pub fn with_abort_timeout(mut self, ticks: Option<u64>) -> Self {
        self.abort_timeout_ticks = ticks;
        self
    }

    pub fn is_authority(&self) -> bool {
        self.net_role == NetRole::Authority
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new()
    }
}
