//! Rich diagnostic error types for the effect tuner.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.
//!
//! Per-entry problems in a change plan (unknown names, type mismatches, failed
//! writes) are not errors here: they are reported as data in
//! [`ApplyResult`](crate::execute::ApplyResult). Only failures that abort a
//! whole adjustment cycle surface as [`AdjustError`].

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::host::scene::SceneError;
use crate::param::ParameterType;
use crate::paths::PathError;
use crate::store::EffectHandle;
use crate::translate::service::ServiceError;

/// Top-level error type for the effect tuner.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum TunerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Adjust(#[from] AdjustError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Paths(#[from] PathError),
}

// ---------------------------------------------------------------------------
// Parameter store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum StoreError {
    #[error("effect instance not found: {handle}")]
    #[diagnostic(
        code(tuner::store::effect_not_found),
        help(
            "The effect instance was destroyed or never existed. \
             Re-list effects and resolve a fresh handle."
        )
    )]
    EffectNotFound { handle: EffectHandle },

    #[error("parameter \"{name}\" not found on {handle}")]
    #[diagnostic(
        code(tuner::store::parameter_not_found),
        help("Parameter names are case-sensitive. List the effect's parameters to see what exists.")
    )]
    ParameterNotFound { handle: EffectHandle, name: String },

    #[error("type mismatch for \"{name}\": expected {expected}, got {actual}")]
    #[diagnostic(
        code(tuner::store::type_mismatch),
        help("The value must have the parameter's declared type. Only Int widens to Float.")
    )]
    TypeMismatch {
        name: String,
        expected: ParameterType,
        actual: ParameterType,
    },

    #[error("value {value} for \"{name}\" is outside [{min}, {max}]")]
    #[diagnostic(
        code(tuner::store::out_of_range),
        help("Clamp the value into the parameter's declared range before writing it.")
    )]
    OutOfRange {
        name: String,
        value: String,
        min: f64,
        max: f64,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("effect index {index} out of range: {len} effect(s) available")]
    #[diagnostic(
        code(tuner::registry::index_out_of_range),
        help("Indices are zero-based and follow creation order. Run `effect-tuner effects` to list them.")
    )]
    IndexOutOfRange { index: usize, len: usize },
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

// ---------------------------------------------------------------------------
// Adjustment cycle errors
// ---------------------------------------------------------------------------

/// Failures that abort a whole adjustment cycle. No partial result is produced.
#[derive(Debug, Error, Diagnostic)]
pub enum AdjustError {
    #[error("effect instance not found: {handle}")]
    #[diagnostic(
        code(tuner::adjust::not_found),
        help("The effect was destroyed. Re-list effects and resolve a fresh handle before retrying.")
    )]
    NotFound { handle: EffectHandle },

    #[error("reasoning service unavailable")]
    #[diagnostic(
        code(tuner::adjust::service_unavailable),
        help("The store was not modified. Retry after a short backoff.")
    )]
    ServiceUnavailable {
        #[source]
        #[diagnostic_source]
        source: ServiceError,
    },

    #[error("translation failed: no usable parameter changes in the response ({dropped} line(s) dropped)")]
    #[diagnostic(
        code(tuner::adjust::translation_failed),
        help("The store was not modified. Try rephrasing the instruction more concretely.")
    )]
    TranslationFailed { dropped: usize },

    #[error("an adjustment is already in progress on {handle}")]
    #[diagnostic(
        code(tuner::adjust::busy),
        help("Wait for the running adjustment on this effect to finish, then retry.")
    )]
    Busy { handle: EffectHandle },

    #[error("failed to read effect state: {source}")]
    #[diagnostic(
        code(tuner::adjust::snapshot),
        help("The host reported inconsistent parameter metadata. The store was not modified.")
    )]
    Snapshot {
        #[source]
        source: StoreError,
    },
}

impl AdjustError {
    /// Whether re-invoking the same `adjust` call may succeed without
    /// re-resolving the handle.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdjustError::ServiceUnavailable { .. }
            | AdjustError::TranslationFailed { .. }
            | AdjustError::Busy { .. } => true,
            AdjustError::NotFound { .. } | AdjustError::Snapshot { .. } => false,
        }
    }
}

impl From<StoreError> for AdjustError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EffectNotFound { handle } => AdjustError::NotFound { handle },
            other => AdjustError::Snapshot { source: other },
        }
    }
}

impl From<ServiceError> for AdjustError {
    fn from(source: ServiceError) -> Self {
        AdjustError::ServiceUnavailable { source }
    }
}

pub type AdjustResult<T> = std::result::Result<T, AdjustError>;

/// Convenience alias for functions returning tuner results.
pub type TunerResult<T> = std::result::Result<T, TunerError>;
