//! Common error infrastructure for dispatch-core.
//!
//! Domain-specific errors (e.g. `ReferenceRefusal`, `PersistenceError`) are
//! defined in their respective modules next to the operations that produce
//! them. This module only carries the shared classification.
//!
//! # Taxonomy
//!
//! - **Precondition violations** (starting an active dispatcher, activating
//!   the same action twice) are programmer errors and panic. They never show
//!   up as values of these types.
//! - **Validation failures** (missing, claimed or incapable references, lost
//!   leader) are expected at runtime and are returned as errors.
//! - **Activation failures** of a single action abort the whole dispatcher and
//!   are reported through callbacks and manager notifications instead.

/// Severity level of an error, used for categorization and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorSeverity {
    /// Temporary condition; the same call may succeed later
    /// (an entity is claimed by another dispatcher, a level is not loaded yet).
    Recoverable,

    /// The request itself is not acceptable in the current configuration
    /// (start attempted on a client, script predicate rejected).
    Validation,

    /// Unexpected inconsistency, e.g. an unknown handle or a checked-out hook.
    Internal,

    /// Corrupted input that cannot be used at all (undecodable snapshot).
    Fatal,
}

impl ErrorSeverity {
    /// Returns true if this error is potentially recoverable.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable)
    }

    /// Returns true if this error indicates a bug or corrupted data.
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal | Self::Fatal)
    }
}

/// Common trait for all dispatch-core errors.
pub trait DispatchFailure: std::fmt::Display + std::fmt::Debug {
    /// Returns the severity level of this error.
    fn severity(&self) -> ErrorSeverity;

    /// Returns a static identifier for this error variant, used by hosts for
    /// metrics and by tests for matching.
    fn error_code(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_classification() {
        assert!(ErrorSeverity::Recoverable.is_recoverable());
        assert!(!ErrorSeverity::Validation.is_recoverable());
        assert!(ErrorSeverity::Internal.is_internal());
        assert!(ErrorSeverity::Fatal.is_internal());
        assert_eq!(ErrorSeverity::Validation.as_ref(), "validation");
    }
}
