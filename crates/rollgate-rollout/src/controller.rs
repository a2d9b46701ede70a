//! Rollout controller — the staged traffic state machine.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use rollgate_core::retry::DEFAULT_REVERT_RETRIES;
use rollgate_core::{
    CancelSignal, FailureKind, RetryPolicy, RuntimePair, RuntimeRef, RuntimeStatus, StrategyKind,
    epoch_millis,
};
use rollgate_health::{HealthMonitor, StageVerdict};
use rollgate_state::{RolloutRecord, RolloutState, StateError, StateStore, Transition};
use rollgate_validate::{ValidationReport, Validator};

use crate::control::{ControlError, ControlPlane};
use crate::error::{RolloutError, RolloutResult};
use crate::plan::RolloutPlan;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct RolloutRequest {
    pub pair: RuntimePair,
    pub plan: RolloutPlan,
    /// Caller-supplied unique operation token.
    pub token: String,
}

/// One stage as it actually ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub index: usize,
    pub weight: u8,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub verdict: StageVerdict,
    pub samples: usize,
    pub failed_polls: u32,
}

/// Terminal result of one rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutOutcome {
    pub pair: RuntimePair,
    pub token: String,
    pub strategy: StrategyKind,
    pub final_state: RolloutState,
    /// Failure class of a `RolledBack`/`Failed` ending.
    pub failure: Option<FailureKind>,
    pub transitions: Vec<Transition>,
    pub validation: Option<ValidationReport>,
    pub stages: Vec<StageRecord>,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
}

impl RolloutOutcome {
    pub fn is_promoted(&self) -> bool {
        self.final_state == RolloutState::Promoted
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_at_ms.saturating_sub(self.started_at_ms)
    }
}

/// Mutable bookkeeping for one run.
struct Run {
    pair: RuntimePair,
    key: String,
    token: String,
    strategy: StrategyKind,
    state: RolloutState,
    failure: Option<FailureKind>,
    transitions: Vec<Transition>,
    validation: Option<ValidationReport>,
    stages: Vec<StageRecord>,
    /// Whether any traffic call may have reached the control plane.
    traffic_touched: bool,
    /// Another operation took the pair; nothing more is written for it.
    lease_lost: bool,
    started_at_ms: u64,
}

impl Run {
    fn record(&self) -> RolloutRecord {
        RolloutRecord {
            pair_key: self.key.clone(),
            token: self.token.clone(),
            strategy: self.strategy,
            state: self.state.clone(),
            transitions: self.transitions.clone(),
            started_at_ms: self.started_at_ms,
            updated_at_ms: epoch_millis(),
        }
    }
}

pub struct RolloutController {
    control: Arc<dyn ControlPlane>,
    validator: Arc<dyn Validator>,
    monitor: HealthMonitor,
    store: StateStore,
    retry: RetryPolicy,
    revert_retry: RetryPolicy,
    call_timeout: Duration,
    lease_ttl: Duration,
}

impl RolloutController {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        validator: Arc<dyn Validator>,
        monitor: HealthMonitor,
        store: StateStore,
    ) -> Self {
        Self {
            control,
            validator,
            monitor,
            store,
            retry: RetryPolicy::default(),
            revert_retry: RetryPolicy::new(DEFAULT_REVERT_RETRIES, RetryPolicy::default().backoff),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }

    /// Retry policy for ordinary control plane calls.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Retry policy for the revert-to-0 call.
    pub fn with_revert_retry(mut self, retry: RetryPolicy) -> Self {
        self.revert_retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run one rollout to a terminal state.
    ///
    /// Returns `Err` only for caller errors (bad plan, finished pair, pair
    /// leased to another token) and state store failures before the
    /// rollout starts. Everything else ends in `Ok` with a `RolledBack` or
    /// `Failed` final state carrying the reason.
    ///
    /// The lease is renewed before every traffic call and throughout each
    /// hold. If another token takes it, the run ends `Failed("lease lost
    /// ...")` without issuing another traffic call or writing the record.
    pub async fn run(
        &self,
        request: RolloutRequest,
        cancel: CancelSignal,
    ) -> RolloutResult<RolloutOutcome> {
        request.plan.validate()?;
        if request.token.trim().is_empty() {
            return Err(RolloutError::InvalidPlan(
                "operation token must not be empty".to_string(),
            ));
        }

        // Lease first: the terminal check only holds while no one else can write.
        let key = request.pair.key();
        self.store.acquire_lease(&key, &request.token, self.lease_ttl)?;
        let existing = match self.store.get_record(&key) {
            Ok(record) => record,
            Err(e) => {
                self.release(&key, &request.token);
                return Err(e.into());
            }
        };
        if let Some(record) = existing.filter(RolloutRecord::is_terminal) {
            warn!(pair = %key, state = %record.state, "rollout already finished");
            self.release(&key, &request.token);
            return Err(RolloutError::AlreadyTerminal {
                pair: key,
                state: record.state.to_string(),
            });
        }

        let mut run = Run {
            pair: request.pair.clone(),
            key: key.clone(),
            token: request.token.clone(),
            strategy: request.plan.strategy,
            state: RolloutState::Initializing,
            failure: None,
            transitions: Vec::new(),
            validation: None,
            stages: Vec::new(),
            traffic_touched: false,
            lease_lost: false,
            started_at_ms: epoch_millis(),
        };
        info!(
            pair = %key,
            token = %request.token,
            strategy = ?request.plan.strategy,
            stages = ?request.plan.stages,
            "rollout started"
        );
        self.persist(&run);

        self.drive(&mut run, &request.plan, &cancel).await;

        if !run.lease_lost {
            self.release(&key, &request.token);
        }

        let outcome = RolloutOutcome {
            pair: request.pair,
            token: request.token,
            strategy: run.strategy,
            final_state: run.state,
            failure: run.failure,
            transitions: run.transitions,
            validation: run.validation,
            stages: run.stages,
            started_at_ms: run.started_at_ms,
            finished_at_ms: epoch_millis(),
        };
        info!(
            pair = %key,
            state = %outcome.final_state,
            duration_ms = outcome.duration_ms(),
            "rollout finished"
        );
        Ok(outcome)
    }

    async fn drive(&self, run: &mut Run, plan: &RolloutPlan, cancel: &CancelSignal) {
        let pair = run.pair.clone();
        let (key, token) = (run.key.clone(), run.token.clone());

        // No traffic moves before validation passes.
        self.advance(run, RolloutState::Validating);
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            e = self.keep_lease(&key, &token) => return self.abandon(run, e),
            report = self.validator.validate(&pair.new) => Some(report),
        };
        let Some(report) = report else {
            return self.end(run, FailureKind::Cancelled, "cancelled".to_string()).await;
        };
        let failure = report.failure_kind();
        let summary = report.failure_summary();
        run.validation = Some(report);
        if let Some(kind) = failure {
            let reason = format!("validation failed: {summary}");
            return self.end(run, kind, reason).await;
        }

        for runtime in [&pair.old, &pair.new] {
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                status = self.describe(runtime) => Some(status),
            };
            match status {
                None => {
                    return self.end(run, FailureKind::Cancelled, "cancelled".to_string()).await;
                }
                Some(Ok(status)) if status.accepts_traffic() => {
                    debug!(runtime = %runtime, status = status.as_str(), "runtime active");
                }
                Some(Ok(status)) => {
                    let reason = format!("runtime {runtime} not active (status {})", status.as_str());
                    return self.end(run, FailureKind::Caller, reason).await;
                }
                Some(Err(e)) => {
                    let reason = format!("describe {runtime} failed: {e}");
                    return self.end(run, FailureKind::Transport, reason).await;
                }
            }
        }

        for (index, &weight) in plan.stages.iter().enumerate() {
            if let Err(e) = self.renew(run) {
                return self.abandon(run, e);
            }
            // The call may land even if we stop waiting for it.
            run.traffic_touched = true;
            let set = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                set = self.set_weight(&pair, weight) => Some(set),
            };
            match set {
                None => {
                    return self.end(run, FailureKind::Cancelled, "cancelled".to_string()).await;
                }
                Some(Err(e)) => {
                    let reason =
                        format!("traffic update failed at stage {index} (weight {weight}): {e}");
                    return self.end(run, FailureKind::Transport, reason).await;
                }
                Some(Ok(())) => info!(pair = %run.key, weight, "traffic weight set"),
            }

            self.advance(run, RolloutState::StageActive { index, weight });
            let started_at_ms = epoch_millis();
            let watched = tokio::select! {
                watched = self.monitor.watch_stage(&pair.new, plan.hold, &plan.thresholds, cancel) => watched,
                e = self.keep_lease(&key, &token) => return self.abandon(run, e),
            };
            run.stages.push(StageRecord {
                index,
                weight,
                started_at_ms,
                finished_at_ms: epoch_millis(),
                verdict: watched.verdict.clone(),
                samples: watched.samples.len(),
                failed_polls: watched.failed_polls,
            });

            let (kind, reason) = match watched.verdict {
                StageVerdict::Healthy => {
                    info!(pair = %run.key, stage = index, weight, "stage healthy");
                    continue;
                }
                StageVerdict::Violation { breach } => (
                    FailureKind::HealthViolation,
                    format!("health violation at stage {index} ({breach})"),
                ),
                StageVerdict::Unverifiable { failed_polls } => (
                    FailureKind::UnverifiableStage,
                    format!(
                        "unverifiable stage {index} (no successful health poll, {failed_polls} failed)"
                    ),
                ),
                StageVerdict::Cancelled => (FailureKind::Cancelled, "cancelled".to_string()),
            };
            return self.end(run, kind, reason).await;
        }

        // The old runtime stays deployed at 0%.
        if let Err(e) = self.renew(run) {
            return self.abandon(run, e);
        }
        self.advance(run, RolloutState::Promoted);
    }

    /// Ending for every non-promoted path. Reverts traffic to 0 if any
    /// traffic call was issued and records `RolledBack`. Records `Failed`
    /// when the rollout never shifted traffic, or when the revert could not
    /// be confirmed.
    async fn end(&self, run: &mut Run, kind: FailureKind, reason: String) {
        run.failure = Some(kind);
        if !run.traffic_touched {
            let state = match kind {
                FailureKind::Cancelled => RolloutState::RolledBack { reason },
                _ => RolloutState::Failed { reason },
            };
            self.advance(run, state);
            return;
        }

        if let Err(e) = self.renew(run) {
            return self.abandon(run, e);
        }
        warn!(pair = %run.key, %reason, "reverting traffic to 0");
        let pair = run.pair.clone();
        let reverted = self
            .revert_retry
            .run(
                "traffic revert",
                |_| self.timed_weight(&pair.old, &pair.new, 0),
                ControlError::is_retryable,
            )
            .await;
        match reverted {
            Ok(()) => {
                info!(pair = %run.key, "traffic reverted to 0");
                self.advance(run, RolloutState::RolledBack { reason });
            }
            Err(e) => {
                error!(pair = %run.key, error = %e, "traffic revert unconfirmed");
                let reason = format!("rollback unconfirmed after {reason}: {e}");
                self.advance(run, RolloutState::Failed { reason });
            }
        }
    }

    /// Another operation owns the pair now. Stop without touching traffic
    /// or the stored record.
    fn abandon(&self, run: &mut Run, e: StateError) {
        error!(pair = %run.key, token = %run.token, error = %e, "lease lost; abandoning rollout");
        run.lease_lost = true;
        run.failure = Some(FailureKind::Caller);
        self.advance(run, RolloutState::Failed {
            reason: format!("lease lost: {e}"),
        });
    }

    /// Extend the lease; fails once another token holds it.
    fn renew(&self, run: &Run) -> Result<(), StateError> {
        self.store
            .acquire_lease(&run.key, &run.token, self.lease_ttl)
            .map(|_| ())
    }

    /// Renew the lease every third of its TTL. Resolves only when renewal
    /// fails.
    async fn keep_lease(&self, key: &str, token: &str) -> StateError {
        let every = (self.lease_ttl / 3).max(Duration::from_millis(1));
        loop {
            tokio::time::sleep(every).await;
            match self.store.acquire_lease(key, token, self.lease_ttl) {
                Ok(lease) => debug!(pair = %key, expires_at_ms = lease.expires_at_ms, "lease renewed"),
                Err(e) => return e,
            }
        }
    }

    fn release(&self, key: &str, token: &str) {
        if let Err(e) = self.store.release_lease(key, token) {
            error!(pair = %key, error = %e, "failed to release lease");
        }
    }

    fn advance(&self, run: &mut Run, next: RolloutState) {
        if !run.state.can_transition_to(&next) {
            error!(pair = %run.key, from = %run.state, to = %next, "illegal transition");
            return;
        }
        info!(pair = %run.key, from = %run.state, to = %next, "rollout transition");
        run.transitions.push(Transition {
            from: run.state.clone(),
            to: next.clone(),
            at_ms: epoch_millis(),
            reason: next.reason().map(str::to_string),
        });
        run.state = next;
        self.persist(run);
    }

    fn persist(&self, run: &Run) {
        if run.lease_lost {
            return;
        }
        if let Err(e) = self.store.put_record(&run.record()) {
            error!(pair = %run.key, error = %e, "failed to persist rollout record");
        }
    }

    async fn describe(&self, runtime: &RuntimeRef) -> Result<RuntimeStatus, ControlError> {
        let timeout = self.call_timeout;
        self.retry
            .run(
                "describe",
                |_| async move {
                    tokio::time::timeout(timeout, self.control.describe(runtime))
                        .await
                        .map_err(|_| ControlError::Timeout(timeout))?
                },
                ControlError::is_retryable,
            )
            .await
    }

    async fn set_weight(&self, pair: &RuntimePair, weight: u8) -> Result<(), ControlError> {
        self.retry
            .run(
                "set traffic weight",
                |_| self.timed_weight(&pair.old, &pair.new, weight),
                ControlError::is_retryable,
            )
            .await
    }

    async fn timed_weight(
        &self,
        old: &RuntimeRef,
        new: &RuntimeRef,
        weight: u8,
    ) -> Result<(), ControlError> {
        let timeout = self.call_timeout;
        tokio::time::timeout(timeout, self.control.set_traffic_weight(old, new, weight))
            .await
            .map_err(|_| ControlError::Timeout(timeout))?
    }
}
