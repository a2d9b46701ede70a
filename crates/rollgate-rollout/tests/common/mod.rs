//! Shared fakes for controller scenarios.
//!
//! Every fake appends to one [`EventLog`] so tests can assert the order in
//! which validation, status queries, traffic calls, and health polls happen.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rollgate_core::{
    BoxFuture, FailureKind, RetryPolicy, RuntimePair, RuntimeRef, RuntimeStatus, epoch_millis,
};
use rollgate_health::{
    HealthMonitor, HealthSample, HealthThresholds, MetricError, MetricResult, MetricStore,
};
use rollgate_rollout::{ControlError, ControlPlane, RolloutController, RolloutPlan, RolloutRequest};
use rollgate_state::StateStore;
use rollgate_validate::{CaseOutcome, ValidationReport, Validator};

pub const HOLD: Duration = Duration::from_millis(60);
pub const INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Validate(String),
    Describe(String),
    SetWeight(u8),
    Sample(u8),
}

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn weights(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::SetWeight(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events().iter().position(pred)
    }
}

// ── Control plane ──────────────────────────────────────────────────────

pub struct FakeControlPlane {
    log: EventLog,
    weight: Arc<AtomicU8>,
    statuses: Mutex<HashMap<String, RuntimeStatus>>,
    rejected_weights: Mutex<HashSet<u8>>,
}

impl FakeControlPlane {
    pub fn new(log: EventLog, weight: Arc<AtomicU8>) -> Arc<Self> {
        Arc::new(Self {
            log,
            weight,
            statuses: Mutex::new(HashMap::new()),
            rejected_weights: Mutex::new(HashSet::new()),
        })
    }

    pub fn set_status(&self, runtime: &RuntimeRef, status: RuntimeStatus) {
        self.statuses.lock().unwrap().insert(runtime.label(), status);
    }

    /// Make every call that sets `weight` fail with a transport error.
    pub fn fail_weight(&self, weight: u8) {
        self.rejected_weights.lock().unwrap().insert(weight);
    }
}

impl ControlPlane for FakeControlPlane {
    fn describe<'a>(
        &'a self,
        runtime: &'a RuntimeRef,
    ) -> BoxFuture<'a, Result<RuntimeStatus, ControlError>> {
        Box::pin(async move {
            self.log.push(Event::Describe(runtime.label()));
            let status = self.statuses.lock().unwrap().get(&runtime.label()).copied();
            Ok(status.unwrap_or(RuntimeStatus::Active))
        })
    }

    fn set_traffic_weight<'a>(
        &'a self,
        _old: &'a RuntimeRef,
        _new: &'a RuntimeRef,
        new_weight: u8,
    ) -> BoxFuture<'a, Result<(), ControlError>> {
        Box::pin(async move {
            self.log.push(Event::SetWeight(new_weight));
            if self.rejected_weights.lock().unwrap().contains(&new_weight) {
                return Err(ControlError::Transport("connection reset".to_string()));
            }
            self.weight.store(new_weight, Ordering::SeqCst);
            Ok(())
        })
    }
}

// ── Validator ──────────────────────────────────────────────────────────

pub struct FakeValidator {
    log: EventLog,
    /// Failing case and its class.
    failing: Option<(&'static str, FailureKind)>,
    delay: Duration,
}

impl FakeValidator {
    pub fn passing(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            failing: None,
            delay: Duration::ZERO,
        })
    }

    /// The runtime answers an unknown method with success.
    pub fn failing(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            failing: Some(("unknown_method", FailureKind::Protocol)),
            delay: Duration::ZERO,
        })
    }

    /// The runtime cannot be reached at all.
    pub fn unreachable(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            failing: Some(("connectivity", FailureKind::Transport)),
            delay: Duration::ZERO,
        })
    }

    pub fn slow(log: EventLog, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            log,
            failing: None,
            delay,
        })
    }
}

impl Validator for FakeValidator {
    fn validate<'a>(&'a self, runtime: &'a RuntimeRef) -> BoxFuture<'a, ValidationReport> {
        Box::pin(async move {
            self.log.push(Event::Validate(runtime.label()));
            tokio::time::sleep(self.delay).await;
            let now = epoch_millis();
            let cases = ["connectivity", "unknown_method"]
                .into_iter()
                .map(|name| {
                    let failure = self
                        .failing
                        .filter(|(failing, _)| *failing == name)
                        .map(|(_, kind)| kind);
                    CaseOutcome {
                        name: name.to_string(),
                        passed: failure.is_none(),
                        gating: true,
                        duration_ms: 1,
                        reason: failure.map(|kind| format!("{name} failed ({kind})")),
                        failure,
                    }
                })
                .collect();
            ValidationReport::new(runtime.label(), "s".repeat(64), now, now, cases, None)
        })
    }
}

// ── Metrics ────────────────────────────────────────────────────────────

type SampleFn = dyn Fn(u8) -> MetricResult<(f64, f64)> + Send + Sync;

/// Answers each poll from the weight currently routed to the new runtime.
pub struct FakeMetrics {
    log: EventLog,
    weight: Arc<AtomicU8>,
    respond: Box<SampleFn>,
}

impl FakeMetrics {
    pub fn new(
        log: EventLog,
        weight: Arc<AtomicU8>,
        respond: impl Fn(u8) -> MetricResult<(f64, f64)> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            log,
            weight,
            respond: Box::new(respond),
        })
    }
}

impl MetricStore for FakeMetrics {
    fn sample<'a>(
        &'a self,
        _runtime: &'a RuntimeRef,
        _window: Duration,
    ) -> BoxFuture<'a, MetricResult<HealthSample>> {
        Box::pin(async move {
            let weight = self.weight.load(Ordering::SeqCst);
            self.log.push(Event::Sample(weight));
            let (error_rate, p99) = (self.respond)(weight)?;
            Ok(HealthSample::new(epoch_millis(), error_rate, p99, 100))
        })
    }
}

pub fn healthy(_weight: u8) -> MetricResult<(f64, f64)> {
    Ok((0.01, 120.0))
}

pub fn unavailable(_weight: u8) -> MetricResult<(f64, f64)> {
    Err(MetricError::Unavailable("metrics backend down".to_string()))
}

// ── Harness ────────────────────────────────────────────────────────────

pub struct Harness {
    pub log: EventLog,
    pub control: Arc<FakeControlPlane>,
    pub store: StateStore,
    pub pair: RuntimePair,
    validator: Arc<dyn Validator>,
    metrics: Arc<dyn MetricStore>,
    revert_retry: RetryPolicy,
    lease_ttl: Duration,
}

impl Harness {
    pub fn new(
        respond: impl Fn(u8) -> MetricResult<(f64, f64)> + Send + Sync + 'static,
    ) -> Self {
        let log = EventLog::default();
        let weight = Arc::new(AtomicU8::new(0));
        let control = FakeControlPlane::new(log.clone(), Arc::clone(&weight));
        let metrics = FakeMetrics::new(log.clone(), weight, respond);
        Self {
            validator: FakeValidator::passing(log.clone()),
            log,
            control,
            store: StateStore::open_in_memory().unwrap(),
            pair: RuntimePair::new(
                RuntimeRef::new("arn:aws:lambda:us-east-1:1:function:orders", "v6"),
                RuntimeRef::new("arn:aws:lambda:us-east-1:1:function:orders", "v7"),
            ),
            metrics,
            revert_retry: RetryPolicy::new(3, Duration::from_millis(1)),
            lease_ttl: Duration::from_secs(60),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_revert_retry(mut self, retry: RetryPolicy) -> Self {
        self.revert_retry = retry;
        self
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn controller(&self) -> RolloutController {
        let monitor = HealthMonitor::new(Arc::clone(&self.metrics), INTERVAL, Duration::from_secs(60))
            .with_retry(RetryPolicy::none())
            .with_poll_timeout(Duration::from_millis(200));
        RolloutController::new(
            self.control.clone(),
            Arc::clone(&self.validator),
            monitor,
            self.store.clone(),
        )
        .with_retry(RetryPolicy::new(1, Duration::from_millis(1)))
        .with_revert_retry(self.revert_retry)
        .with_call_timeout(Duration::from_millis(500))
        .with_lease_ttl(self.lease_ttl)
    }

    pub fn canary(&self, stages: &[u8], max_error_rate: f64, max_p99_ms: f64) -> RolloutRequest {
        RolloutRequest {
            pair: self.pair.clone(),
            plan: RolloutPlan::canary(
                stages.to_vec(),
                HOLD,
                HealthThresholds::new(max_error_rate, max_p99_ms),
            ),
            token: "op-1".to_string(),
        }
    }

    pub fn blue_green(&self) -> RolloutRequest {
        RolloutRequest {
            pair: self.pair.clone(),
            plan: RolloutPlan::blue_green(HOLD, HealthThresholds::new(0.02, 500.0)),
            token: "op-bg".to_string(),
        }
    }
}
