//! Natural-language translation: instruction + snapshot → candidate plan.
//!
//! The translator is the only trust boundary in the engine. It builds a
//! request from the current state, sends it to a [`ReasoningService`] with a
//! hard deadline, bounds the response size, and runs the result through the
//! line grammar. Whatever comes back is a [`ChangePlan`]: proposed, typed by
//! the service's own claims, and not yet checked against the catalog.

pub mod grammar;
pub mod prompt;
pub mod service;

use std::sync::{Arc, mpsc};
use std::time::Duration;

use crate::error::{AdjustError, AdjustResult};
use crate::plan::ChangePlan;
use crate::schema::Snapshot;

use grammar::ParseWarning;
use service::{ReasoningRequest, ReasoningService, ServiceError, ServiceResult};

/// A parsed response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    pub plan: ChangePlan,
    /// Lines that were dropped, in response order.
    pub warnings: Vec<ParseWarning>,
    pub explanation: Option<String>,
    /// The response was longer than the configured bound and was cut.
    pub truncated: bool,
}

/// Turns instructions into change plans via a reasoning service.
#[derive(Clone)]
pub struct Translator {
    service: Arc<dyn ReasoningService>,
    max_response_bytes: usize,
}

impl Translator {
    pub fn new(service: Arc<dyn ReasoningService>, max_response_bytes: usize) -> Self {
        Self {
            service,
            max_response_bytes,
        }
    }

    /// Translate one instruction against `snapshot`.
    ///
    /// Fails with `ServiceUnavailable` if the service errors or does not
    /// answer within `timeout`, and with `TranslationFailed` if no line of
    /// the response parses.
    pub fn translate(
        &self,
        snapshot: &Snapshot,
        instruction: &str,
        timeout: Duration,
    ) -> AdjustResult<Translation> {
        let request = prompt::build_request(snapshot, instruction);
        let raw = self.call_with_deadline(request, timeout)?;

        let (text, truncated) = truncate_response(&raw, self.max_response_bytes);
        if truncated {
            tracing::warn!(
                bytes = raw.len(),
                limit = self.max_response_bytes,
                "reasoning service response truncated"
            );
        }

        let parsed = grammar::parse_response(text);
        tracing::info!(
            entries = parsed.entries.len(),
            warnings = parsed.warnings.len(),
            truncated,
            "translated instruction"
        );

        if parsed.entries.is_empty() {
            return Err(AdjustError::TranslationFailed {
                dropped: parsed.warnings.len(),
            });
        }

        Ok(Translation {
            plan: ChangePlan::new(parsed.entries),
            warnings: parsed.warnings,
            explanation: parsed.explanation,
            truncated,
        })
    }

    /// Run the service call on a helper thread and wait at most `timeout`.
    ///
    /// A late answer is dropped with the receiver.
    fn call_with_deadline(
        &self,
        request: ReasoningRequest,
        timeout: Duration,
    ) -> ServiceResult<String> {
        let (tx, rx) = mpsc::channel();
        let service = Arc::clone(&self.service);

        std::thread::Builder::new()
            .name("reasoning-call".into())
            .spawn(move || {
                let _ = tx.send(service.complete(&request, timeout));
            })
            .map_err(|e| ServiceError::Request {
                message: format!("failed to spawn service thread: {e}"),
            })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(timeout_ms = timeout.as_millis(), "reasoning service timed out");
                Err(ServiceError::Timeout {
                    timeout_ms: timeout.as_millis(),
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ServiceError::Request {
                message: "service call ended without a response".into(),
            }),
        }
    }
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("max_response_bytes", &self.max_response_bytes)
            .finish_non_exhaustive()
    }
}

/// Cut `raw` to at most `limit` bytes, at a char boundary and then at the
/// last complete line.
fn truncate_response(raw: &str, limit: usize) -> (&str, bool) {
    if raw.len() <= limit {
        return (raw, false);
    }
    let mut end = limit;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    let head = &raw[..end];
    let head = match head.rfind('\n') {
        Some(nl) => &head[..nl],
        None => "",
    };
    (head, true)
}
