//! Change execution with rollback.
//!
//! The host has no transactions, so the executor provides its own: changes
//! are written one at a time, each write's previous value is recorded, and if
//! any write fails every earlier write of the cycle is reverted in reverse
//! order. The caller always gets an [`ApplyResult`] that is either a clean
//! sequential apply or a full revert to the pre-cycle values.

use std::collections::HashMap;

use serde::Serialize;

use crate::param::ParameterValue;
use crate::schema::Snapshot;
use crate::store::{EffectHandle, ParameterStore};
use crate::validate::{RejectReason, Rejection, ValidatedChange};

/// One write that took effect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedChange {
    pub name: String,
    pub old: ParameterValue,
    pub new: ParameterValue,
    /// The proposed value was clamped into range before writing.
    pub clamped: bool,
}

impl AppliedChange {
    /// Whether the write left the value as it was.
    pub fn is_unchanged(&self) -> bool {
        self.old == self.new
    }
}

/// Outcome of one adjustment cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyResult {
    /// Writes that remain in effect, in plan order.
    pub applied: Vec<AppliedChange>,
    /// Entries that were not applied, in plan order.
    pub rejected: Vec<Rejection>,
    /// Writes that were made and then reverted because a later write failed.
    pub rolled_back: Vec<AppliedChange>,
    /// Names whose revert itself failed. Non-empty only if the host lost the
    /// instance or refused the original value mid-rollback.
    pub unreverted: Vec<String>,
}

impl ApplyResult {
    /// Whether a failed write forced a rollback.
    pub fn is_rolled_back(&self) -> bool {
        !self.rolled_back.is_empty()
            || !self.unreverted.is_empty()
            || self
                .rejected
                .iter()
                .any(|r| matches!(r.reason, RejectReason::ApplyFailed { .. }))
    }

    /// Merge rejections from an earlier stage, keeping plan order.
    pub fn merge_rejections(&mut self, earlier: Vec<Rejection>) {
        self.rejected.extend(earlier);
        self.rejected.sort_by_key(|r| r.index);
    }
}

/// Applies validated changes to one host.
pub struct ChangeExecutor<'a> {
    store: &'a dyn ParameterStore,
}

impl<'a> ChangeExecutor<'a> {
    pub fn new(store: &'a dyn ParameterStore) -> Self {
        Self { store }
    }

    /// Apply `changes` in order against `handle`.
    ///
    /// `baseline` is the snapshot taken at the start of the cycle; it supplies
    /// the `old` side of each diff. Once started, this runs to completion or
    /// to a full rollback.
    pub fn apply(
        &self,
        handle: EffectHandle,
        baseline: &Snapshot,
        changes: &[ValidatedChange],
    ) -> ApplyResult {
        let mut result = ApplyResult::default();
        // Value each name holds right now, as far as this cycle knows.
        let mut current: HashMap<&str, ParameterValue> = HashMap::new();

        for (pos, change) in changes.iter().enumerate() {
            let old = match current.get(change.name.as_str()) {
                Some(v) => Some(*v),
                None => baseline.value(&change.name),
            };
            let write = match old {
                Some(old) => self
                    .store
                    .set(handle, &change.name, &change.value)
                    .map(|()| old),
                None => {
                    // Not in the baseline: read it now so the diff and any
                    // rollback have a true previous value.
                    self.store
                        .get(handle, &change.name, change.ty)
                        .and_then(|old| {
                            self.store
                                .set(handle, &change.name, &change.value)
                                .map(|()| old)
                        })
                }
            };

            match write {
                Ok(old) => {
                    tracing::debug!(
                        %handle,
                        name = %change.name,
                        old = %old,
                        new = %change.value,
                        "applied parameter change"
                    );
                    current.insert(change.name.as_str(), change.value);
                    result.applied.push(AppliedChange {
                        name: change.name.clone(),
                        old,
                        new: change.value,
                        clamped: change.was_clamped(),
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        %handle,
                        name = %change.name,
                        error = %err,
                        reverting = result.applied.len(),
                        "parameter write failed, rolling back cycle"
                    );
                    self.roll_back(handle, &mut result);
                    result.rejected.push(Rejection {
                        index: change.index,
                        name: change.name.clone(),
                        reason: RejectReason::ApplyFailed {
                            message: err.to_string(),
                        },
                    });
                    for skipped in &changes[pos + 1..] {
                        result.rejected.push(Rejection {
                            index: skipped.index,
                            name: skipped.name.clone(),
                            reason: RejectReason::ApplyFailed {
                                message: format!(
                                    "not applied: cycle rolled back after \"{}\" failed",
                                    change.name
                                ),
                            },
                        });
                    }
                    break;
                }
            }
        }

        result
    }

    /// Revert every applied write in reverse order, moving it to `rolled_back`.
    fn roll_back(&self, handle: EffectHandle, result: &mut ApplyResult) {
        let applied = std::mem::take(&mut result.applied);
        for change in applied.into_iter().rev() {
            match self.store.set(handle, &change.name, &change.old) {
                Ok(()) => result.rolled_back.push(change),
                Err(err) => {
                    tracing::error!(
                        %handle,
                        name = %change.name,
                        error = %err,
                        "failed to revert parameter during rollback"
                    );
                    result.unreverted.push(change.name);
                }
            }
        }
        // Report in plan order.
        result.rolled_back.reverse();
        result.unreverted.reverse();
    }
}
