//! The adjustment cycle: instruction in, applied diff out.
//!
//! One cycle runs catalog → snapshot → translate → validate → execute
//! against a single effect instance. At most one cycle may be in flight per
//! [`EffectHandle`]; a second request on the same handle fails fast with
//! [`AdjustError::Busy`]. Cycles on different handles are independent.
//!
//! [`AdjustWorker`] moves whole cycles onto a dedicated thread for hosts
//! that cannot block their UI loop.

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;

use crate::error::{AdjustError, AdjustResult};
use crate::execute::{ApplyResult, ChangeExecutor};
use crate::schema::{SchemaCatalog, Snapshot};
use crate::store::{EffectHandle, ParameterStore};
use crate::translate::grammar::ParseWarning;
use crate::translate::{Translation, Translator};
use crate::validate::{Rejection, ValidatedChange, Validation, validate};

/// Everything one completed cycle produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Adjustment {
    pub result: ApplyResult,
    /// Response lines the grammar dropped.
    pub warnings: Vec<ParseWarning>,
    pub explanation: Option<String>,
    pub truncated: bool,
}

/// A validated plan that was not applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanPreview {
    pub accepted: Vec<ValidatedChange>,
    pub rejected: Vec<Rejection>,
    pub warnings: Vec<ParseWarning>,
    pub explanation: Option<String>,
    pub truncated: bool,
}

/// Marks a handle as mid-cycle until dropped.
struct CycleGuard<'a> {
    in_flight: &'a DashMap<EffectHandle, ()>,
    handle: EffectHandle,
}

impl<'a> CycleGuard<'a> {
    fn acquire(
        in_flight: &'a DashMap<EffectHandle, ()>,
        handle: EffectHandle,
    ) -> AdjustResult<Self> {
        match in_flight.entry(handle) {
            Entry::Occupied(_) => {
                tracing::info!(%handle, "adjustment rejected: cycle already in flight");
                Err(AdjustError::Busy { handle })
            }
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(Self { in_flight, handle })
            }
        }
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.handle);
    }
}

/// Runs adjustment cycles against one host.
pub struct Adjuster {
    store: Arc<dyn ParameterStore>,
    translator: Translator,
    in_flight: DashMap<EffectHandle, ()>,
}

impl Adjuster {
    pub fn new(store: Arc<dyn ParameterStore>, translator: Translator) -> Self {
        Self {
            store,
            translator,
            in_flight: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ParameterStore> {
        &self.store
    }

    /// Translate `instruction` and apply it to `handle`.
    ///
    /// Per-entry failures are reported in the result; only cycle-level
    /// failures are errors, and none of them leave the store modified.
    pub fn adjust(
        &self,
        handle: EffectHandle,
        instruction: &str,
        timeout: Duration,
    ) -> AdjustResult<ApplyResult> {
        self.adjust_with_report(handle, instruction, timeout)
            .map(|adjustment| adjustment.result)
    }

    /// Like [`adjust`](Self::adjust), also returning parse warnings and the
    /// service's explanation.
    pub fn adjust_with_report(
        &self,
        handle: EffectHandle,
        instruction: &str,
        timeout: Duration,
    ) -> AdjustResult<Adjustment> {
        let _guard = CycleGuard::acquire(&self.in_flight, handle)?;
        tracing::info!(%handle, "adjustment cycle started");

        let (snapshot, translation, validation) = self.prepare(handle, instruction, timeout)?;

        let mut result =
            ChangeExecutor::new(self.store.as_ref()).apply(handle, &snapshot, &validation.accepted);
        result.merge_rejections(validation.rejected);

        if result.is_rolled_back() {
            tracing::warn!(
                %handle,
                rolled_back = result.rolled_back.len(),
                unreverted = result.unreverted.len(),
                "adjustment cycle rolled back"
            );
        } else {
            tracing::info!(
                %handle,
                applied = result.applied.len(),
                rejected = result.rejected.len(),
                "adjustment cycle finished"
            );
        }

        Ok(Adjustment {
            result,
            warnings: translation.warnings,
            explanation: translation.explanation,
            truncated: translation.truncated,
        })
    }

    /// Translate and validate without touching the store.
    pub fn plan(
        &self,
        handle: EffectHandle,
        instruction: &str,
        timeout: Duration,
    ) -> AdjustResult<PlanPreview> {
        let _guard = CycleGuard::acquire(&self.in_flight, handle)?;
        let (_, translation, validation) = self.prepare(handle, instruction, timeout)?;
        Ok(PlanPreview {
            accepted: validation.accepted,
            rejected: validation.rejected,
            warnings: translation.warnings,
            explanation: translation.explanation,
            truncated: translation.truncated,
        })
    }

    fn prepare(
        &self,
        handle: EffectHandle,
        instruction: &str,
        timeout: Duration,
    ) -> AdjustResult<(Snapshot, Translation, Validation)> {
        let catalog = SchemaCatalog::introspect(self.store.as_ref(), handle)?;
        let snapshot = Snapshot::capture(self.store.as_ref(), handle, &catalog)?;

        let translation = self.translator.translate(&snapshot, instruction, timeout)?;
        let validation = validate(&translation.plan, &catalog);
        tracing::info!(
            %handle,
            accepted = validation.accepted.len(),
            rejected = validation.rejected.len(),
            clamped = validation.clamped_count(),
            "validated change plan"
        );

        Ok((snapshot, translation, validation))
    }
}

impl std::fmt::Debug for Adjuster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adjuster")
            .field("translator", &self.translator)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Worker handoff
// ---------------------------------------------------------------------------

/// One queued adjustment.
#[derive(Debug, Clone)]
pub struct AdjustRequest {
    pub handle: EffectHandle,
    pub instruction: String,
    pub timeout: Duration,
    /// Validate only; do not apply.
    pub dry_run: bool,
}

/// What a queued request produced.
#[derive(Debug)]
pub enum AdjustOutcome {
    Applied(Adjustment),
    Previewed(PlanPreview),
}

/// A finished request, delivered back to the submitter.
#[derive(Debug)]
pub struct AdjustReply {
    pub request: AdjustRequest,
    pub outcome: AdjustResult<AdjustOutcome>,
}

/// Runs adjustment cycles on a dedicated thread.
///
/// Requests are processed one at a time in submission order. Dropping the
/// worker closes the queue and waits for the current cycle to finish.
pub struct AdjustWorker {
    tx: Option<mpsc::Sender<AdjustRequest>>,
    rx: mpsc::Receiver<AdjustReply>,
    thread: Option<thread::JoinHandle<()>>,
}

impl AdjustWorker {
    /// Start the worker thread.
    pub fn spawn(adjuster: Arc<Adjuster>) -> std::io::Result<Self> {
        let (req_tx, req_rx) = mpsc::channel::<AdjustRequest>();
        let (reply_tx, reply_rx) = mpsc::channel::<AdjustReply>();

        let thread = thread::Builder::new()
            .name("adjust-worker".into())
            .spawn(move || {
                for request in req_rx {
                    let outcome = if request.dry_run {
                        adjuster
                            .plan(request.handle, &request.instruction, request.timeout)
                            .map(AdjustOutcome::Previewed)
                    } else {
                        adjuster
                            .adjust_with_report(request.handle, &request.instruction, request.timeout)
                            .map(AdjustOutcome::Applied)
                    };
                    if reply_tx.send(AdjustReply { request, outcome }).is_err() {
                        break;
                    }
                }
                tracing::debug!("adjust worker stopped");
            })?;

        Ok(Self {
            tx: Some(req_tx),
            rx: reply_rx,
            thread: Some(thread),
        })
    }

    /// Queue a request. Gives the request back if the worker has stopped.
    pub fn submit(&self, request: AdjustRequest) -> Result<(), AdjustRequest> {
        match &self.tx {
            Some(tx) => tx.send(request).map_err(|e| e.0),
            None => Err(request),
        }
    }

    /// Poll for a finished request without blocking.
    pub fn try_recv(&self) -> Option<AdjustReply> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next finished request. `None` once the worker has stopped.
    pub fn recv(&self) -> Option<AdjustReply> {
        self.rx.recv().ok()
    }
}

impl Drop for AdjustWorker {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
