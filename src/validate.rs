//! Plan validation against a schema catalog.
//!
//! Validation is pure: it reads the plan and the catalog and never touches
//! the host. Each entry is either accepted as a [`ValidatedChange`] (possibly
//! clamped into range) or rejected with a [`RejectReason`]. Both outputs keep
//! plan order, and every entry carries its plan position so later stages can
//! merge their own rejections back into that order.

use serde::Serialize;

use crate::param::{ParameterType, ParameterValue};
use crate::plan::ChangePlan;
use crate::schema::SchemaCatalog;

/// Why a plan entry was not applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// The name is not in the catalog.
    UnknownParameter,
    /// The declared type cannot be written to the catalog type.
    TypeMismatch {
        declared: ParameterType,
        expected: ParameterType,
    },
    /// The host refused the write, or an earlier write in the same cycle
    /// failed and the cycle was rolled back.
    ApplyFailed { message: String },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::UnknownParameter => write!(f, "unknown parameter"),
            RejectReason::TypeMismatch { declared, expected } => {
                write!(f, "type mismatch: declared {declared}, parameter is {expected}")
            }
            RejectReason::ApplyFailed { message } => write!(f, "apply failed: {message}"),
        }
    }
}

/// A plan entry that was not applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    /// Position in the originating plan.
    pub index: usize,
    pub name: String,
    pub reason: RejectReason,
}

/// A plan entry that passed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedChange {
    /// Position in the originating plan.
    pub index: usize,
    pub name: String,
    /// The catalog type, not the declared one.
    pub ty: ParameterType,
    /// The value to write: converted to `ty` and inside the range.
    pub value: ParameterValue,
    /// The proposed value before clamping, if clamping changed it.
    pub clamped_from: Option<ParameterValue>,
}

impl ValidatedChange {
    pub fn was_clamped(&self) -> bool {
        self.clamped_from.is_some()
    }
}

/// Outcome of validating one plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Validation {
    pub accepted: Vec<ValidatedChange>,
    pub rejected: Vec<Rejection>,
}

impl Validation {
    /// Number of accepted entries that were clamped.
    pub fn clamped_count(&self) -> usize {
        self.accepted.iter().filter(|c| c.was_clamped()).count()
    }
}

/// Check every plan entry against the catalog, in plan order.
pub fn validate(plan: &ChangePlan, catalog: &SchemaCatalog) -> Validation {
    let mut out = Validation::default();

    for (index, entry) in plan.entries().iter().enumerate() {
        let Some(descriptor) = catalog.get(&entry.name) else {
            out.rejected.push(Rejection {
                index,
                name: entry.name.clone(),
                reason: RejectReason::UnknownParameter,
            });
            continue;
        };

        let converted = entry
            .declared
            .is_assignable_to(descriptor.ty)
            .then(|| entry.value.coerce_to(descriptor.ty))
            .flatten();
        let Some(value) = converted else {
            out.rejected.push(Rejection {
                index,
                name: entry.name.clone(),
                reason: RejectReason::TypeMismatch {
                    declared: entry.declared,
                    expected: descriptor.ty,
                },
            });
            continue;
        };

        let (value, clamped_from) = match descriptor.range {
            Some(range) if !value.within(&range) => (value.clamped(&range), Some(value)),
            _ => (value, None),
        };
        if let Some(original) = clamped_from {
            tracing::debug!(
                name = %entry.name,
                proposed = %original,
                clamped = %value,
                "clamped proposed value into range"
            );
        }

        out.accepted.push(ValidatedChange {
            index,
            name: entry.name.clone(),
            ty: descriptor.ty,
            value,
            clamped_from,
        });
    }

    out
}
