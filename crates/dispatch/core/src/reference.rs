//! Declared entity references and their validation.
//!
//! Each concrete dispatcher type declares its optional entity references
//! statically through [`DeclareReferences`]. The declaration is a `const`
//! table, so discovery happens once per type at compile time; only the
//! resolution of each field runs per instance.
//!
//! ```
//! use dispatch_core::{DeclareReferences, EntityId, ReferenceField};
//!
//! struct OpenGate {
//!     gate: Option<EntityId>,
//!     guard: Option<EntityId>,
//! }
//!
//! impl DeclareReferences for OpenGate {
//!     const REFERENCES: &'static [ReferenceField<Self>] = &[
//!         ReferenceField::new("gate", |s| s.gate),
//!         ReferenceField::new("guard", |s| s.guard),
//!     ];
//! }
//! ```

use tracing::warn;

use crate::entity::{ClaimTable, EntityRegistry};
use crate::error::{DispatchFailure, ErrorSeverity};
use crate::types::{DispatcherId, EntityId};

/// One optional entity reference field of a dispatcher type.
pub struct ReferenceField<S> {
    pub name: &'static str,
    pub resolve: fn(&S) -> Option<EntityId>,
}

impl<S> ReferenceField<S> {
    pub const fn new(name: &'static str, resolve: fn(&S) -> Option<EntityId>) -> Self {
        Self { name, resolve }
    }
}

/// Static declaration of the entity references of a dispatcher type.
pub trait DeclareReferences: Sized + 'static {
    const REFERENCES: &'static [ReferenceField<Self>] = &[];
}

/// A reference field resolved against one instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeclaredReference {
    pub field: &'static str,
    pub entity: Option<EntityId>,
}

/// Object-safe view of [`DeclareReferences`], used through `dyn` scripts.
pub trait ReferenceSource {
    fn declared_references(&self) -> Vec<DeclaredReference>;
}

impl<T: DeclareReferences> ReferenceSource for T {
    fn declared_references(&self) -> Vec<DeclaredReference> {
        T::REFERENCES
            .iter()
            .map(|field| DeclaredReference {
                field: field.name,
                entity: (field.resolve)(self),
            })
            .collect()
    }
}

/// Why a declared reference failed validation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceRefusal {
    #[error("reference `{field}` is unset")]
    Unset { field: &'static str },

    #[error("reference `{field}` ({entity}) does not resolve")]
    Unresolvable {
        field: &'static str,
        entity: EntityId,
    },

    #[error("reference `{field}` ({entity}) is claimed by dispatcher {holder}")]
    ClaimedByOther {
        field: &'static str,
        entity: EntityId,
        holder: DispatcherId,
    },

    #[error("reference `{field}` ({entity}) cannot execute dispatched actions right now")]
    Incapable {
        field: &'static str,
        entity: EntityId,
    },
}

impl DispatchFailure for ReferenceRefusal {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Unset { .. } => ErrorSeverity::Validation,
            Self::Unresolvable { .. } | Self::ClaimedByOther { .. } | Self::Incapable { .. } => {
                ErrorSeverity::Recoverable
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Unset { .. } => "reference_unset",
            Self::Unresolvable { .. } => "reference_unresolvable",
            Self::ClaimedByOther { .. } => "reference_claimed",
            Self::Incapable { .. } => "reference_incapable",
        }
    }
}

/// Validates every declared reference for `owner`.
///
/// Fails on the first reference that is unset, does not resolve, is claimed
/// by a dispatcher other than `owner`, or whose entity reports it cannot take
/// part right now. Nothing is cached: availability changes between calls.
pub fn validate_references(
    owner: DispatcherId,
    references: &[DeclaredReference],
    entities: &EntityRegistry,
    claims: &ClaimTable,
) -> Result<(), ReferenceRefusal> {
    for reference in references {
        let field = reference.field;
        let Some(entity) = reference.entity else {
            return Err(ReferenceRefusal::Unset { field });
        };
        if !entities.is_resolvable(entity) {
            return Err(ReferenceRefusal::Unresolvable { field, entity });
        }
        let Some(capability) = entities.capability(entity) else {
            continue;
        };
        if let Some(holder) = claims.holder(entity)
            && holder != owner
        {
            return Err(ReferenceRefusal::ClaimedByOther {
                field,
                entity,
                holder,
            });
        }
        if !capability.can_execute_dispatchable_action() {
            return Err(ReferenceRefusal::Incapable { field, entity });
        }
    }
    Ok(())
}

/// Logs every unset reference by field name.
///
/// An unset reference means the dispatcher can never start, which is almost
/// always an authoring mistake.
pub(crate) fn warn_unset(debug_name: &str, references: &[DeclaredReference]) {
    for reference in references.iter().filter(|r| r.entity.is_none()) {
        warn!(
            "dispatcher {} has unset reference `{}`; it will never start",
            debug_name, reference.field
        );
    }
}
