//! The host engine boundary: typed access to an effect instance's parameters.
//!
//! The host engine owns effect instances and may destroy them at any time.
//! Every call here is therefore fallible, and a handle that outlived its
//! instance fails with [`StoreError::EffectNotFound`] rather than panicking.

use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::param::{ParameterDescriptor, ParameterType, ParameterValue};

/// Opaque, stable identifier for one live effect instance.
///
/// Equality is defined; ordering is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EffectHandle(NonZeroU64);

impl EffectHandle {
    /// Create a handle from a raw host identifier. Returns `None` for zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(EffectHandle)
    }

    /// The raw host identifier.
    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// The handle for the `n`-th instance (zero-based) a host hands out.
    pub(crate) fn from_sequence(n: u64) -> Self {
        EffectHandle(NonZeroU64::MIN.saturating_add(n))
    }
}

impl std::fmt::Display for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "effect:{}", self.0)
    }
}

/// Synchronous, fallible key/value access to live effect instances, keyed by
/// `(handle, name)`.
///
/// `set` must be idempotent and visible to the next `get` of the same name.
pub trait ParameterStore: Send + Sync {
    /// Live effect instances in creation order.
    fn effects(&self) -> Vec<EffectHandle>;

    /// Human-readable label for an instance, if the host has one.
    fn label(&self, handle: EffectHandle) -> Option<String>;

    /// Descriptors of every parameter on the instance.
    fn list(&self, handle: EffectHandle) -> StoreResult<Vec<ParameterDescriptor>>;

    /// Read one parameter, asserting its type.
    fn get(&self, handle: EffectHandle, name: &str, ty: ParameterType)
    -> StoreResult<ParameterValue>;

    /// Write one parameter.
    fn set(&self, handle: EffectHandle, name: &str, value: &ParameterValue) -> StoreResult<()>;
}

/// Check a value against a descriptor the way a host is expected to on `set`.
///
/// Shared by host implementations so they agree on what a valid write is.
pub fn check_write(descriptor: &ParameterDescriptor, value: &ParameterValue) -> StoreResult<()> {
    if value.ty() != descriptor.ty {
        return Err(StoreError::TypeMismatch {
            name: descriptor.name.clone(),
            expected: descriptor.ty,
            actual: value.ty(),
        });
    }
    if let Some(range) = descriptor.range {
        if !value.within(&range) {
            return Err(StoreError::OutOfRange {
                name: descriptor.name.clone(),
                value: value.to_string(),
                min: range.min,
                max: range.max,
            });
        }
    }
    Ok(())
}
