//! Schema catalog and snapshots of an effect instance.
//!
//! A [`SchemaCatalog`] is what the validator checks plans against: names,
//! types and ranges introspected from the host. A [`Snapshot`] pairs every
//! catalog entry with its current value; it is both the translator's context
//! and the executor's rollback baseline. Both live for one adjustment cycle.

use std::collections::HashMap;

use crate::error::StoreResult;
use crate::param::{ParameterDescriptor, ParameterValue};
use crate::store::{EffectHandle, ParameterStore};

/// Parameter descriptors of one instance, in host order, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    descriptors: Vec<ParameterDescriptor>,
    index: HashMap<String, usize>,
}

impl SchemaCatalog {
    /// Build from descriptors. If a name repeats, the first one wins.
    pub fn from_descriptors(descriptors: Vec<ParameterDescriptor>) -> Self {
        let mut kept = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());
        for d in descriptors {
            if index.contains_key(&d.name) {
                tracing::warn!(name = %d.name, "host listed a parameter twice, keeping the first");
                continue;
            }
            index.insert(d.name.clone(), kept.len());
            kept.push(d);
        }
        Self {
            descriptors: kept,
            index,
        }
    }

    /// Introspect the instance behind `handle`.
    pub fn introspect(store: &dyn ParameterStore, handle: EffectHandle) -> StoreResult<Self> {
        Ok(Self::from_descriptors(store.list(handle)?))
    }

    /// Look up a descriptor by exact (case-sensitive) name.
    pub fn get(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors in host order.
    pub fn iter(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// One parameter's descriptor and value at snapshot time.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub descriptor: ParameterDescriptor,
    pub value: ParameterValue,
}

/// Current values of every catalog parameter, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    handle: Option<EffectHandle>,
    entries: Vec<SnapshotEntry>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    /// Read every parameter in `catalog` from the host.
    ///
    /// Fails on the first read error; a partially read snapshot is never
    /// returned.
    pub fn capture(
        store: &dyn ParameterStore,
        handle: EffectHandle,
        catalog: &SchemaCatalog,
    ) -> StoreResult<Self> {
        let mut entries = Vec::with_capacity(catalog.len());
        for descriptor in catalog.iter() {
            let value = store.get(handle, &descriptor.name, descriptor.ty)?;
            entries.push(SnapshotEntry {
                descriptor: descriptor.clone(),
                value,
            });
        }
        let mut snapshot = Self::from_entries(entries);
        snapshot.handle = Some(handle);
        Ok(snapshot)
    }

    /// Build a snapshot directly from entries.
    pub fn from_entries(entries: Vec<SnapshotEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.descriptor.name.clone(), i))
            .collect();
        Self {
            handle: None,
            entries,
            index,
        }
    }

    /// The instance this snapshot was captured from, if captured from a host.
    pub fn handle(&self) -> Option<EffectHandle> {
        self.handle
    }

    /// Value of `name` at snapshot time.
    pub fn value(&self, name: &str) -> Option<ParameterValue> {
        self.index.get(name).map(|&i| self.entries[i].value)
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
