//! In-memory host engine.
//!
//! [`MemoryHost`] implements [`ParameterStore`] over effect instances kept in
//! a `DashMap`. It stands in for a real simulation engine in the CLI and in
//! tests, and enforces the same write contract a host is expected to: unknown
//! names, type mismatches and out-of-range values are refused.

pub mod presets;
pub mod scene;

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::error::{StoreError, StoreResult};
use crate::param::{ParameterDescriptor, ParameterType, ParameterValue};
use crate::store::{EffectHandle, ParameterStore, check_write};

/// One parameter slot on an instance.
#[derive(Debug, Clone)]
struct Slot {
    descriptor: ParameterDescriptor,
    value: ParameterValue,
}

#[derive(Debug, Clone)]
struct EffectInstance {
    label: String,
    slots: Vec<Slot>,
}

impl EffectInstance {
    fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.descriptor.name == name)
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.descriptor.name == name)
    }
}

/// Effect instances held in memory, addressable by stable handles.
pub struct MemoryHost {
    /// Sequence number of the next instance.
    next: AtomicU64,
    effects: DashMap<EffectHandle, EffectInstance>,
}

impl MemoryHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
            effects: DashMap::new(),
        }
    }

    /// Create a host populated with the built-in presets.
    pub fn with_presets() -> StoreResult<Self> {
        let host = Self::new();
        for (label, params) in presets::default_presets() {
            host.spawn(label, params)?;
        }
        Ok(host)
    }

    /// Create a new instance with the given parameters and initial values.
    ///
    /// Every initial value must satisfy its descriptor. If a name repeats,
    /// the later definition replaces the earlier one.
    pub fn spawn(
        &self,
        label: impl Into<String>,
        params: Vec<(ParameterDescriptor, ParameterValue)>,
    ) -> StoreResult<EffectHandle> {
        let mut slots: Vec<Slot> = Vec::with_capacity(params.len());
        for (descriptor, value) in params {
            check_write(&descriptor, &value)?;
            let slot = Slot { descriptor, value };
            match slots
                .iter_mut()
                .find(|s| s.descriptor.name == slot.descriptor.name)
            {
                Some(existing) => *existing = slot,
                None => slots.push(slot),
            }
        }

        let handle = EffectHandle::from_sequence(self.next.fetch_add(1, Ordering::Relaxed));
        let label = label.into();
        tracing::debug!(%handle, label = %label, params = slots.len(), "spawned effect instance");
        self.effects.insert(handle, EffectInstance { label, slots });
        Ok(handle)
    }

    /// Destroy an instance. Returns whether it existed.
    ///
    /// Handles to it stay valid values but every later call fails with
    /// [`StoreError::EffectNotFound`].
    pub fn destroy(&self, handle: EffectHandle) -> bool {
        let existed = self.effects.remove(&handle).is_some();
        if existed {
            tracing::debug!(%handle, "destroyed effect instance");
        }
        existed
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Whether there are no live instances.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHost")
            .field("effects", &self.len())
            .finish()
    }
}

impl ParameterStore for MemoryHost {
    fn effects(&self) -> Vec<EffectHandle> {
        let mut handles: Vec<EffectHandle> = self.effects.iter().map(|e| *e.key()).collect();
        // Handles are allocated from a monotonic sequence, so the raw value
        // is the creation order.
        handles.sort_by_key(|h| h.get());
        handles
    }

    fn label(&self, handle: EffectHandle) -> Option<String> {
        self.effects.get(&handle).map(|e| e.label.clone())
    }

    fn list(&self, handle: EffectHandle) -> StoreResult<Vec<ParameterDescriptor>> {
        let effect = self
            .effects
            .get(&handle)
            .ok_or(StoreError::EffectNotFound { handle })?;
        Ok(effect.slots.iter().map(|s| s.descriptor.clone()).collect())
    }

    fn get(
        &self,
        handle: EffectHandle,
        name: &str,
        ty: ParameterType,
    ) -> StoreResult<ParameterValue> {
        let effect = self
            .effects
            .get(&handle)
            .ok_or(StoreError::EffectNotFound { handle })?;
        let slot = effect.slot(name).ok_or_else(|| StoreError::ParameterNotFound {
            handle,
            name: name.to_string(),
        })?;
        if slot.descriptor.ty != ty {
            return Err(StoreError::TypeMismatch {
                name: name.to_string(),
                expected: slot.descriptor.ty,
                actual: ty,
            });
        }
        Ok(slot.value)
    }

    fn set(&self, handle: EffectHandle, name: &str, value: &ParameterValue) -> StoreResult<()> {
        let mut effect = self
            .effects
            .get_mut(&handle)
            .ok_or(StoreError::EffectNotFound { handle })?;
        let slot = effect
            .slot_mut(name)
            .ok_or_else(|| StoreError::ParameterNotFound {
                handle,
                name: name.to_string(),
            })?;
        check_write(&slot.descriptor, value)?;
        slot.value = *value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::ValueRange;

    fn spawn_rate() -> (ParameterDescriptor, ParameterValue) {
        (
            ParameterDescriptor::new("SpawnRate", ParameterType::Float)
                .with_range(ValueRange::new(0.0, 1000.0).unwrap()),
            ParameterValue::Float(80.0),
        )
    }

    #[test]
    fn handles_follow_creation_order() {
        let host = MemoryHost::new();
        let a = host.spawn("A", vec![]).unwrap();
        let b = host.spawn("B", vec![]).unwrap();
        let c = host.spawn("C", vec![]).unwrap();
        assert_eq!(host.effects(), vec![a, b, c]);

        host.destroy(b);
        assert_eq!(host.effects(), vec![a, c]);
    }

    #[test]
    fn set_then_get_round_trips() {
        let host = MemoryHost::new();
        let h = host.spawn("Fire", vec![spawn_rate()]).unwrap();

        host.set(h, "SpawnRate", &ParameterValue::Float(250.0)).unwrap();
        let v = host.get(h, "SpawnRate", ParameterType::Float).unwrap();
        assert_eq!(v, ParameterValue::Float(250.0));
    }

    #[test]
    fn set_is_idempotent() {
        let host = MemoryHost::new();
        let h = host.spawn("Fire", vec![spawn_rate()]).unwrap();
        for _ in 0..3 {
            host.set(h, "SpawnRate", &ParameterValue::Float(10.0)).unwrap();
        }
        assert_eq!(
            host.get(h, "SpawnRate", ParameterType::Float).unwrap(),
            ParameterValue::Float(10.0)
        );
    }

    #[test]
    fn set_refuses_bad_writes() {
        let host = MemoryHost::new();
        let h = host.spawn("Fire", vec![spawn_rate()]).unwrap();

        assert!(matches!(
            host.set(h, "spawnrate", &ParameterValue::Float(1.0)),
            Err(StoreError::ParameterNotFound { .. })
        ));
        assert!(matches!(
            host.set(h, "SpawnRate", &ParameterValue::Bool(true)),
            Err(StoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            host.set(h, "SpawnRate", &ParameterValue::Float(1e6)),
            Err(StoreError::OutOfRange { .. })
        ));
        // Refused writes leave the value alone.
        assert_eq!(
            host.get(h, "SpawnRate", ParameterType::Float).unwrap(),
            ParameterValue::Float(80.0)
        );
    }

    #[test]
    fn get_checks_type() {
        let host = MemoryHost::new();
        let h = host.spawn("Fire", vec![spawn_rate()]).unwrap();
        assert!(matches!(
            host.get(h, "SpawnRate", ParameterType::Int),
            Err(StoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn destroyed_handle_is_not_found() {
        let host = MemoryHost::new();
        let h = host.spawn("Fire", vec![spawn_rate()]).unwrap();
        assert!(host.destroy(h));
        assert!(!host.destroy(h));

        assert_eq!(host.list(h), Err(StoreError::EffectNotFound { handle: h }));
        assert!(matches!(
            host.set(h, "SpawnRate", &ParameterValue::Float(1.0)),
            Err(StoreError::EffectNotFound { .. })
        ));
        assert!(host.label(h).is_none());
    }

    #[test]
    fn spawn_rejects_invalid_initial_value() {
        let host = MemoryHost::new();
        let (d, _) = spawn_rate();
        let err = host.spawn("Fire", vec![(d, ParameterValue::Float(-1.0))]);
        assert!(matches!(err, Err(StoreError::OutOfRange { .. })));
        assert!(host.is_empty());
    }

    #[test]
    fn presets_load() {
        let host = MemoryHost::with_presets().unwrap();
        assert_eq!(host.len(), presets::default_presets().len());
        let first = host.effects()[0];
        assert_eq!(host.label(first).as_deref(), Some("Fire"));
    }
}
