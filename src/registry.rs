//! Component registry: enumerates addressable effect instances.
//!
//! The [`ComponentRegistry`] presents the host's live instances as a
//! zero-based, creation-ordered list and resolves positions to
//! [`EffectHandle`]s. It holds no state of its own, so a resolved handle
//! reflects the host at the moment of the call and nothing is cached.

use std::sync::Arc;

use crate::error::{RegistryError, RegistryResult};
use crate::store::{EffectHandle, ParameterStore};

/// One listed instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectEntry {
    /// Zero-based position in creation order.
    pub index: usize,
    pub handle: EffectHandle,
    /// Host label, or the handle's display form if the host has none.
    pub label: String,
}

/// Enumerates effect instances of a host.
#[derive(Clone)]
pub struct ComponentRegistry {
    store: Arc<dyn ParameterStore>,
}

impl ComponentRegistry {
    /// Create a registry over a host.
    pub fn new(store: Arc<dyn ParameterStore>) -> Self {
        Self { store }
    }

    /// All live handles in creation order.
    pub fn list(&self) -> Vec<EffectHandle> {
        self.store.effects()
    }

    /// Resolve a zero-based position to a handle.
    pub fn resolve(&self, index: usize) -> RegistryResult<EffectHandle> {
        let handles = self.list();
        handles
            .get(index)
            .copied()
            .ok_or(RegistryError::IndexOutOfRange {
                index,
                len: handles.len(),
            })
    }

    /// All live instances with their positions and labels.
    pub fn entries(&self) -> Vec<EffectEntry> {
        self.list()
            .into_iter()
            .enumerate()
            .map(|(index, handle)| EffectEntry {
                index,
                handle,
                label: self
                    .store
                    .label(handle)
                    .unwrap_or_else(|| handle.to_string()),
            })
            .collect()
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.list().len()
    }

    /// Whether the host has no live instances.
    pub fn is_empty(&self) -> bool {
        self.list().is_empty()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("count", &self.len())
            .finish()
    }
}
