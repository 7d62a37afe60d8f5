//! Change plans: proposed, not yet trusted, parameter changes.

use serde::{Deserialize, Serialize};

use crate::param::{ParameterType, ParameterValue};

/// One proposed change. `declared` is whatever the proposer asserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePlanEntry {
    pub name: String,
    pub declared: ParameterType,
    pub value: ParameterValue,
}

impl ChangePlanEntry {
    /// Create an entry whose declared type is the value's own type.
    pub fn new(name: impl Into<String>, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            declared: value.ty(),
            value,
        }
    }
}

/// An ordered, immutable sequence of proposed changes.
///
/// An empty plan is valid and applies as a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangePlan {
    entries: Vec<ChangePlanEntry>,
}

impl ChangePlan {
    pub fn new(entries: Vec<ChangePlanEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ChangePlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ChangePlanEntry> for ChangePlan {
    fn from_iter<I: IntoIterator<Item = ChangePlanEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ChangePlan {
    type Item = &'a ChangePlanEntry;
    type IntoIter = std::slice::Iter<'a, ChangePlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
