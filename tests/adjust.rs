//! End-to-end tests for the adjustment cycle.
//!
//! These drive `Adjuster` against the in-memory host with scripted reasoning
//! services, covering clamping, rejection, rollback, timeouts and the
//! per-effect cycle guard.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use effect_tuner::adjust::Adjuster;
use effect_tuner::error::{AdjustError, StoreError, StoreResult};
use effect_tuner::host::MemoryHost;
use effect_tuner::param::{ParameterDescriptor, ParameterType, ParameterValue};
use effect_tuner::registry::ComponentRegistry;
use effect_tuner::store::{EffectHandle, ParameterStore};
use effect_tuner::translate::Translator;
use effect_tuner::translate::service::{
    ChatCompletionsService, ReasoningRequest, ReasoningService, ServiceConfig, ServiceError,
    ServiceResult,
};
use effect_tuner::validate::RejectReason;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Returns the same text every call and records each request.
struct Scripted {
    response: String,
    seen: Mutex<Vec<ReasoningRequest>>,
}

impl Scripted {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl ReasoningService for Scripted {
    fn complete(&self, request: &ReasoningRequest, _: Duration) -> ServiceResult<String> {
        self.seen.lock().unwrap().push(request.clone());
        Ok(self.response.clone())
    }
}

struct Slow(Duration);

impl ReasoningService for Slow {
    fn complete(&self, _: &ReasoningRequest, _: Duration) -> ServiceResult<String> {
        std::thread::sleep(self.0);
        Ok("SpawnRate,Float,999".into())
    }
}

/// Blocks calls whose instruction mentions "hold" until released.
struct Gate {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl ReasoningService for Gate {
    fn complete(&self, request: &ReasoningRequest, _: Duration) -> ServiceResult<String> {
        if request.user.contains("hold") {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
        }
        Ok("SpawnRate,Float,123".into())
    }
}

/// Wraps a host and fails exactly the n-th `set` call (1-based).
struct FailNthSet {
    inner: Arc<MemoryHost>,
    fail_on: usize,
    sets: AtomicUsize,
}

impl ParameterStore for FailNthSet {
    fn effects(&self) -> Vec<EffectHandle> {
        self.inner.effects()
    }

    fn label(&self, handle: EffectHandle) -> Option<String> {
        self.inner.label(handle)
    }

    fn list(&self, handle: EffectHandle) -> StoreResult<Vec<ParameterDescriptor>> {
        self.inner.list(handle)
    }

    fn get(
        &self,
        handle: EffectHandle,
        name: &str,
        ty: ParameterType,
    ) -> StoreResult<ParameterValue> {
        self.inner.get(handle, name, ty)
    }

    fn set(&self, handle: EffectHandle, name: &str, value: &ParameterValue) -> StoreResult<()> {
        let n = self.sets.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(StoreError::EffectNotFound { handle });
        }
        self.inner.set(handle, name, value)
    }
}

/// Serve one chat completion over local HTTP; returns the base URL.
fn serve_completion(content: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        {
            let mut reader = BufReader::new(&mut stream);
            let mut content_length = 0;
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap_or(0) > 0 && !line.trim_end().is_empty() {
                if let Some((key, value)) = line.trim_end().split_once(':') {
                    if key.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
                line.clear();
            }
            let mut body = vec![0; content_length];
            let _ = reader.read_exact(&mut body);
        }
        let body = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
        .to_string();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(body.as_bytes());
    });
    format!("http://{addr}/v1")
}

fn fire_host() -> (Arc<MemoryHost>, EffectHandle) {
    let host = Arc::new(MemoryHost::with_presets().unwrap());
    let handle = ComponentRegistry::new(host.clone()).resolve(0).unwrap();
    (host, handle)
}

fn adjuster(host: Arc<dyn ParameterStore>, service: Arc<dyn ReasoningService>) -> Adjuster {
    Adjuster::new(host, Translator::new(service, 64 * 1024))
}

fn values(host: &dyn ParameterStore, handle: EffectHandle) -> Vec<(String, ParameterValue)> {
    host.list(handle)
        .unwrap()
        .into_iter()
        .map(|d| {
            let v = host.get(handle, &d.name, d.ty).unwrap();
            (d.name, v)
        })
        .collect()
}

fn float(host: &MemoryHost, handle: EffectHandle, name: &str) -> ParameterValue {
    host.get(handle, name, ParameterType::Float).unwrap()
}

#[test]
fn out_of_range_value_is_clamped_and_applied() {
    let (host, handle) = fire_host();
    let adj = adjuster(host.clone(), Scripted::new("SpawnRate,Float,5000"));

    let result = adj.adjust(handle, "way more particles", TIMEOUT).unwrap();

    assert_eq!(result.applied.len(), 1);
    let change = &result.applied[0];
    assert_eq!(change.name, "SpawnRate");
    assert_eq!(change.old, ParameterValue::Float(80.0));
    assert_eq!(change.new, ParameterValue::Float(1000.0));
    assert!(change.clamped);
    assert!(result.rejected.is_empty());
    assert_eq!(float(&host, handle, "SpawnRate"), ParameterValue::Float(1000.0));
}

#[test]
fn unknown_names_are_rejected_and_store_untouched() {
    let (host, handle) = fire_host();
    let before = values(host.as_ref(), handle);
    let adj = adjuster(
        host.clone(),
        Scripted::new("TurbulenceStrength,Float,3\nspawnrate,Float,10"),
    );

    let result = adj.adjust(handle, "swirl it", TIMEOUT).unwrap();

    assert!(result.applied.is_empty());
    assert_eq!(result.rejected.len(), 2);
    assert!(
        result
            .rejected
            .iter()
            .all(|r| r.reason == RejectReason::UnknownParameter)
    );
    assert_eq!(values(host.as_ref(), handle), before);
}

#[test]
fn type_mismatch_is_rejected_and_rest_applies() {
    let (host, handle) = fire_host();
    let adj = adjuster(
        host.clone(),
        Scripted::new("Capacity,Float,3.5\nLifetime,Int,2\nLooping,Bool,false"),
    );

    let result = adj.adjust(handle, "shorter", TIMEOUT).unwrap();

    assert_eq!(result.rejected.len(), 1);
    assert_eq!(result.rejected[0].name, "Capacity");
    assert!(matches!(
        result.rejected[0].reason,
        RejectReason::TypeMismatch { .. }
    ));
    let applied: Vec<_> = result.applied.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(applied, vec!["Lifetime", "Looping"]);
    // Int widened to Float.
    assert_eq!(float(&host, handle, "Lifetime"), ParameterValue::Float(2.0));
    assert_eq!(
        host.get(handle, "Capacity", ParameterType::Int).unwrap(),
        ParameterValue::Int(512)
    );
}

#[test]
fn malformed_line_is_dropped_and_valid_line_applies() {
    let (host, handle) = fire_host();
    let adj = adjuster(
        host.clone(),
        Scripted::new("Sure! I'll make it bigger.\nSize,Vector3,2 2 2"),
    );

    let report = adj.adjust_with_report(handle, "bigger", TIMEOUT).unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].line, 1);
    assert_eq!(report.result.applied.len(), 1);
    assert_eq!(
        host.get(handle, "Size", ParameterType::Vector3).unwrap(),
        ParameterValue::Vector3([2.0, 2.0, 2.0])
    );
}

#[test]
fn reapplying_same_plan_reports_no_change() {
    let (host, handle) = fire_host();
    let script = "SpawnRate,Float,300\nColor,Color,1 0.2 0.1\nLooping,Bool,false";
    let adj = adjuster(host.clone(), Scripted::new(script));

    let first = adj.adjust(handle, "hotter", TIMEOUT).unwrap();
    assert!(first.applied.iter().any(|c| !c.is_unchanged()));

    let second = adj.adjust(handle, "hotter", TIMEOUT).unwrap();
    assert_eq!(second.applied.len(), 3);
    assert!(second.applied.iter().all(|c| c.is_unchanged()));
}

#[test]
fn applied_values_read_back() {
    let (host, handle) = fire_host();
    let adj = adjuster(
        host.clone(),
        Scripted::new("Velocity,Vector3,(0, 6.5, -1)\nCapacity,Int,2048"),
    );

    let result = adj.adjust(handle, "faster", TIMEOUT).unwrap();

    for change in &result.applied {
        let ty = change.new.ty();
        assert_eq!(host.get(handle, &change.name, ty).unwrap(), change.new);
    }
}

#[test]
fn failed_write_rolls_back_the_whole_cycle() {
    let (host, handle) = fire_host();
    let before = values(host.as_ref(), handle);
    let store = Arc::new(FailNthSet {
        inner: host.clone(),
        fail_on: 3,
        sets: AtomicUsize::new(0),
    });
    let adj = adjuster(
        store,
        Scripted::new("SpawnRate,Float,300\nLifetime,Float,4\nLooping,Bool,false\nCapacity,Int,64"),
    );

    let result = adj.adjust(handle, "change everything", TIMEOUT).unwrap();

    assert!(result.is_rolled_back());
    assert!(result.applied.is_empty());
    let rolled: Vec<_> = result.rolled_back.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(rolled, vec!["SpawnRate", "Lifetime"]);
    assert!(result.unreverted.is_empty());

    let rejected: Vec<_> = result.rejected.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(rejected, vec!["Looping", "Capacity"]);
    assert!(
        result
            .rejected
            .iter()
            .all(|r| matches!(r.reason, RejectReason::ApplyFailed { .. }))
    );

    assert_eq!(values(host.as_ref(), handle), before);
}

#[test]
fn rollback_keeps_validator_rejections_in_plan_order() {
    let (host, handle) = fire_host();
    let store = Arc::new(FailNthSet {
        inner: host.clone(),
        fail_on: 2,
        sets: AtomicUsize::new(0),
    });
    let adj = adjuster(
        store,
        Scripted::new("SpawnRate,Float,300\nGhost,Float,1\nLifetime,Float,4"),
    );

    let result = adj.adjust(handle, "x", TIMEOUT).unwrap();

    let order: Vec<_> = result.rejected.iter().map(|r| r.index).collect();
    assert_eq!(order, vec![1, 2]);
    assert_eq!(result.rejected[0].reason, RejectReason::UnknownParameter);
    assert_eq!(float(&host, handle, "SpawnRate"), ParameterValue::Float(80.0));
}

#[test]
fn slow_service_times_out_without_touching_store() {
    let (host, handle) = fire_host();
    let before = values(host.as_ref(), handle);
    let adj = adjuster(host.clone(), Arc::new(Slow(Duration::from_millis(500))));

    let err = adj
        .adjust(handle, "more", Duration::from_millis(50))
        .unwrap_err();

    assert!(matches!(
        err,
        AdjustError::ServiceUnavailable {
            source: ServiceError::Timeout { .. }
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(values(host.as_ref(), handle), before);
}

#[test]
fn missing_credential_is_service_unavailable() {
    let (host, handle) = fire_host();
    let before = values(host.as_ref(), handle);
    let service = ChatCompletionsService::with_key(ServiceConfig::default(), None);
    let adj = adjuster(host.clone(), Arc::new(service));

    let err = adj.adjust(handle, "more", TIMEOUT).unwrap_err();

    assert!(matches!(
        err,
        AdjustError::ServiceUnavailable {
            source: ServiceError::MissingCredential { .. }
        }
    ));
    assert_eq!(values(host.as_ref(), handle), before);
}

#[test]
fn unusable_response_is_translation_failure() {
    let (host, handle) = fire_host();
    let adj = adjuster(
        host.clone(),
        Scripted::new("```json\n{\"parameters\": {\"SpawnRate\": 300}}\n```"),
    );

    let err = adj.adjust(handle, "more", TIMEOUT).unwrap_err();

    assert!(matches!(err, AdjustError::TranslationFailed { dropped: 3 }));
    assert_eq!(float(&host, handle, "SpawnRate"), ParameterValue::Float(80.0));
}

#[test]
fn destroyed_effect_is_not_found() {
    let (host, handle) = fire_host();
    let script = Scripted::new("SpawnRate,Float,300");
    let adj = adjuster(host.clone(), script.clone());
    assert!(host.destroy(handle));

    let err = adj.adjust(handle, "more", TIMEOUT).unwrap_err();

    assert!(matches!(err, AdjustError::NotFound { handle: h } if h == handle));
    assert!(!err.is_retryable());
    // The service was never consulted.
    assert!(script.seen.lock().unwrap().is_empty());
}

#[test]
fn request_carries_snapshot_and_instruction() {
    let (host, handle) = fire_host();
    let script = Scripted::new("SpawnRate,Float,300");
    let adj = adjuster(host.clone(), script.clone());

    adj.adjust(handle, "make the flame bigger and redder", TIMEOUT)
        .unwrap();

    let seen = script.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let user = &seen[0].user;
    assert!(user.contains("- SpawnRate (Float, range [0, 1000]) = 80"));
    assert!(user.contains("- Looping (Bool) = true"));
    assert!(user.contains("make the flame bigger and redder"));
    assert!(seen[0].system.contains("<name>,<type>,<value>"));
}

#[test]
fn concurrent_cycle_on_same_effect_is_busy() {
    let (host, handle) = fire_host();
    let other = ComponentRegistry::new(host.clone()).resolve(1).unwrap();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let gate = Arc::new(Gate {
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    let adj = Arc::new(adjuster(host.clone(), gate));

    let first = {
        let adj = Arc::clone(&adj);
        std::thread::spawn(move || adj.adjust(handle, "hold on", TIMEOUT))
    };
    entered_rx.recv_timeout(TIMEOUT).unwrap();

    // Same handle while the first cycle is mid-translation.
    let err = adj.adjust(handle, "quick", TIMEOUT).unwrap_err();
    assert!(matches!(err, AdjustError::Busy { handle: h } if h == handle));
    assert!(err.is_retryable());

    // A different effect is independent.
    let result = adj.adjust(other, "quick", TIMEOUT).unwrap();
    assert_eq!(result.applied.len(), 1);

    release_tx.send(()).unwrap();
    let result = first.join().unwrap().unwrap();
    assert_eq!(result.applied[0].new, ParameterValue::Float(123.0));

    // The guard is released once the cycle ends.
    assert!(adj.adjust(handle, "quick", TIMEOUT).is_ok());
}

#[test]
fn dry_run_previews_without_applying() {
    let (host, handle) = fire_host();
    let before = values(host.as_ref(), handle);
    let adj = adjuster(
        host.clone(),
        Scripted::new("SpawnRate,Float,5000\nGhost,Int,1\nexplanation: lots more"),
    );

    let preview = adj.plan(handle, "lots more", TIMEOUT).unwrap();

    assert_eq!(preview.accepted.len(), 1);
    assert_eq!(preview.accepted[0].value, ParameterValue::Float(1000.0));
    assert_eq!(preview.rejected.len(), 1);
    assert_eq!(preview.explanation.as_deref(), Some("lots more"));
    assert_eq!(values(host.as_ref(), handle), before);
}

#[test]
fn extreme_value_is_clamped_not_dropped() {
    let (host, handle) = fire_host();
    let adj = adjuster(host.clone(), Scripted::new("SpawnRate,Float,1e39"));

    let result = adj.adjust(handle, "absurdly many particles", TIMEOUT).unwrap();

    assert_eq!(result.applied.len(), 1);
    assert!(result.applied[0].clamped);
    assert_eq!(float(&host, handle, "SpawnRate"), ParameterValue::Float(1000.0));
}

#[test]
fn oversized_http_response_is_truncated_and_applied() {
    let (host, handle) = fire_host();
    let mut content = String::from("SpawnRate,Float,300\n");
    while content.len() < 512 * 1024 {
        content.push_str("This line is filler the model kept generating.\n");
    }
    let config = ServiceConfig {
        base_url: serve_completion(content),
        ..Default::default()
    };
    let service = ChatCompletionsService::with_key(config, Some("test-key".into()));
    let adj = adjuster(host.clone(), Arc::new(service));

    let report = adj.adjust_with_report(handle, "more particles", TIMEOUT).unwrap();

    assert!(report.truncated);
    assert_eq!(report.result.applied.len(), 1);
    assert_eq!(report.result.applied[0].name, "SpawnRate");
    assert_eq!(float(&host, handle, "SpawnRate"), ParameterValue::Float(300.0));
}
