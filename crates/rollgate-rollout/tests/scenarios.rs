mod common;

use std::time::Duration;

use common::{Event, FakeValidator, Harness, healthy, unavailable};
use rollgate_core::{CancelSignal, FailureKind, RetryPolicy, RuntimeStatus, StrategyKind, cancellation};
use rollgate_health::StageVerdict;
use rollgate_rollout::{RolloutError, RolloutState};
use rollgate_state::StateError;

fn reason(state: &RolloutState) -> &str {
    state.reason().unwrap_or_default()
}

#[tokio::test]
async fn healthy_canary_promotes() {
    let h = Harness::new(healthy);
    let outcome = h
        .controller()
        .run(h.canary(&[10, 50, 100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.final_state, RolloutState::Promoted);
    assert!(outcome.is_promoted());
    assert_eq!(outcome.failure, None);
    assert_eq!(h.log.weights(), vec![10, 50, 100]);
    assert_eq!(outcome.stages.len(), 3);
    assert!(outcome.stages.iter().all(|s| s.verdict == StageVerdict::Healthy));
    assert!(outcome.stages.iter().all(|s| s.samples >= 1));

    let states: Vec<_> = outcome.transitions.iter().map(|t| t.to.clone()).collect();
    assert_eq!(
        states,
        vec![
            RolloutState::Validating,
            RolloutState::StageActive { index: 0, weight: 10 },
            RolloutState::StageActive { index: 1, weight: 50 },
            RolloutState::StageActive { index: 2, weight: 100 },
            RolloutState::Promoted,
        ]
    );
    for window in outcome.transitions.windows(2) {
        assert_eq!(window[0].to, window[1].from);
    }
}

#[tokio::test]
async fn error_spike_at_second_stage_rolls_back() {
    let h = Harness::new(|weight| Ok(if weight >= 50 { (0.12, 120.0) } else { (0.0, 120.0) }));
    let outcome = h
        .controller()
        .run(h.canary(&[10, 50, 100], 0.05, 500.0), CancelSignal::never())
        .await
        .unwrap();

    assert!(matches!(outcome.final_state, RolloutState::RolledBack { .. }));
    assert!(
        reason(&outcome.final_state).starts_with("health violation at stage 1"),
        "{}",
        outcome.final_state
    );
    assert_eq!(outcome.failure, Some(FailureKind::HealthViolation));
    // Revert to 0 directly after the failing stage; 100 is never set.
    assert_eq!(h.log.weights(), vec![10, 50, 0]);
    assert!(matches!(
        outcome.stages.last().map(|s| &s.verdict),
        Some(StageVerdict::Violation { .. })
    ));
}

#[tokio::test]
async fn latency_breach_rolls_back() {
    let h = Harness::new(|_| Ok((0.0, 900.0)));
    let outcome = h
        .controller()
        .run(h.canary(&[25, 100], 0.05, 500.0), CancelSignal::never())
        .await
        .unwrap();

    assert!(reason(&outcome.final_state).contains("p99 latency"));
    assert_eq!(h.log.weights(), vec![25, 0]);
}

#[tokio::test]
async fn failed_validation_moves_no_traffic() {
    let h = Harness::new(healthy);
    let log = h.log.clone();
    let h = h.with_validator(FakeValidator::failing(log));
    let outcome = h
        .controller()
        .run(h.canary(&[10, 50, 100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap();

    assert!(matches!(outcome.final_state, RolloutState::Failed { .. }));
    assert!(reason(&outcome.final_state).starts_with("validation failed"));
    assert!(reason(&outcome.final_state).contains("unknown_method"));
    assert!(h.log.weights().is_empty());
    assert!(outcome.stages.is_empty());
    assert!(!outcome.validation.unwrap().passed);
}

#[tokio::test]
async fn unreachable_runtime_fails_validation_as_transport() {
    let h = Harness::new(healthy);
    let log = h.log.clone();
    let h = h.with_validator(FakeValidator::unreachable(log));
    let outcome = h
        .controller()
        .run(h.canary(&[10, 100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap();

    assert!(reason(&outcome.final_state).contains("connectivity"));
    assert_eq!(outcome.failure, Some(FailureKind::Transport));
    assert!(h.log.weights().is_empty());
}

#[tokio::test]
async fn validation_precedes_every_control_call() {
    let h = Harness::new(healthy);
    h.controller()
        .run(h.canary(&[50, 100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap();

    let validate = h
        .log
        .position(|e| matches!(e, Event::Validate(_)))
        .unwrap();
    let first_control = h
        .log
        .position(|e| matches!(e, Event::Describe(_) | Event::SetWeight(_)))
        .unwrap();
    assert!(validate < first_control);
    assert_eq!(
        h.log.events()[0],
        Event::Validate(h.pair.new.label()),
        "validation targets the new runtime"
    );
}

#[tokio::test]
async fn second_run_against_finished_pair_is_rejected() {
    let h = Harness::new(healthy);
    let controller = h.controller();
    let first = controller
        .run(h.canary(&[100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap();
    assert!(first.is_promoted());
    let calls = h.log.events().len();

    let err = controller
        .run(h.canary(&[100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RolloutError::AlreadyTerminal { .. }), "{err}");
    assert_eq!(h.log.events().len(), calls, "no further calls issued");

    let record = h.store.get_record(&h.pair.key()).unwrap().unwrap();
    assert_eq!(record.state, RolloutState::Promoted);
    assert_eq!(record.token, "op-1");
    assert!(h.store.get_lease(&h.pair.key()).unwrap().is_none());
}

#[tokio::test]
async fn finished_pair_is_checked_under_the_lease() {
    let h = Harness::new(healthy);
    h.controller()
        .run(h.canary(&[100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap();
    h.store
        .acquire_lease(&h.pair.key(), "op-2", Duration::from_secs(60))
        .unwrap();

    // The record is only read once the lease is ours.
    let err = h
        .controller()
        .run(h.canary(&[100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RolloutError::State(StateError::LeaseHeld { .. })), "{err}");
    assert_eq!(h.store.get_lease(&h.pair.key()).unwrap().unwrap().token, "op-2");
}

#[tokio::test]
async fn pair_leased_to_another_token_is_rejected() {
    let h = Harness::new(healthy);
    h.store
        .acquire_lease(&h.pair.key(), "someone-else", Duration::from_secs(60))
        .unwrap();

    let err = h
        .controller()
        .run(h.canary(&[100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RolloutError::State(StateError::LeaseHeld { .. })));
    assert_eq!(err.kind(), FailureKind::Caller);
    assert!(h.log.events().is_empty());
}

#[tokio::test]
async fn lease_outlives_a_plan_longer_than_its_ttl() {
    let h = Harness::new(healthy).with_lease_ttl(Duration::from_millis(60));
    let first = h.controller();
    let request = h.canary(&[10, 50, 100], 0.02, 500.0);
    let run = tokio::spawn(async move { first.run(request, CancelSignal::never()).await });

    // Well past the TTL, mid-way through the second stage.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut intruder = h.canary(&[10, 50, 100], 0.02, 500.0);
    intruder.token = "op-2".to_string();
    let err = h
        .controller()
        .run(intruder, CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RolloutError::State(StateError::LeaseHeld { .. })), "{err}");

    let outcome = run.await.unwrap().unwrap();
    assert!(outcome.is_promoted());
    assert_eq!(h.log.weights(), vec![10, 50, 100]);
}

#[tokio::test]
async fn lost_lease_stops_traffic_calls() {
    let h = Harness::new(healthy).with_lease_ttl(Duration::from_millis(60));
    let controller = h.controller();
    let mut request = h.canary(&[10, 50, 100], 0.02, 500.0);
    request.plan.hold = Duration::from_secs(30);
    let run = tokio::spawn(async move { controller.run(request, CancelSignal::never()).await });

    while !h.log.weights().contains(&10) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let key = h.pair.key();
    h.store.clear_lease(&key).unwrap();
    h.store.acquire_lease(&key, "op-2", Duration::from_secs(60)).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("lease loss is noticed within the hold")
        .unwrap()
        .unwrap();
    assert!(reason(&outcome.final_state).starts_with("lease lost"), "{}", outcome.final_state);
    assert_eq!(outcome.failure, Some(FailureKind::Caller));
    // Neither the next stage nor a revert is issued.
    assert_eq!(h.log.weights(), vec![10]);
    assert_eq!(h.store.get_lease(&key).unwrap().unwrap().token, "op-2");
    let record = h.store.get_record(&key).unwrap().unwrap();
    assert_eq!(record.state, RolloutState::StageActive { index: 0, weight: 10 });
}

#[tokio::test]
async fn lease_released_after_run() {
    let h = Harness::new(healthy);
    h.controller()
        .run(h.canary(&[100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap();
    assert!(h.store.get_lease(&h.pair.key()).unwrap().is_none());
}

#[tokio::test]
async fn invalid_plan_is_a_caller_error() {
    let h = Harness::new(healthy);
    let err = h
        .controller()
        .run(h.canary(&[50, 10], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RolloutError::InvalidPlan(_)));

    let mut request = h.canary(&[100], 0.02, 500.0);
    request.token = "  ".to_string();
    let err = h.controller().run(request, CancelSignal::never()).await.unwrap_err();
    assert!(matches!(err, RolloutError::InvalidPlan(_)));
    assert!(h.log.events().is_empty());
}

#[tokio::test]
async fn cancel_during_hold_reverts() {
    let h = Harness::new(healthy);
    let controller = h.controller();
    let mut request = h.canary(&[10, 50, 100], 0.02, 500.0);
    request.plan.hold = Duration::from_secs(30);
    let (handle, signal) = cancellation();

    let log = h.log.clone();
    let run = tokio::spawn(async move { controller.run(request, signal).await });
    while !log.weights().contains(&10) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    handle.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("cancellation is prompt")
        .unwrap()
        .unwrap();
    assert_eq!(
        outcome.final_state,
        RolloutState::RolledBack {
            reason: "cancelled".to_string()
        }
    );
    assert_eq!(outcome.failure, Some(FailureKind::Cancelled));
    assert_eq!(h.log.weights(), vec![10, 0]);
}

#[tokio::test]
async fn cancel_during_validation_touches_nothing() {
    let h = Harness::new(healthy);
    let log = h.log.clone();
    let h = h.with_validator(FakeValidator::slow(log, Duration::from_secs(30)));
    let (handle, signal) = cancellation();
    handle.cancel();

    let outcome = h
        .controller()
        .run(h.canary(&[100], 0.02, 500.0), signal)
        .await
        .unwrap();
    assert!(matches!(outcome.final_state, RolloutState::RolledBack { .. }));
    assert!(h.log.weights().is_empty());
}

#[tokio::test]
async fn unconfirmed_revert_fails() {
    let h = Harness::new(|weight| Ok(if weight >= 50 { (0.5, 120.0) } else { (0.0, 120.0) }))
        .with_revert_retry(RetryPolicy::new(2, Duration::from_millis(1)));
    h.control.fail_weight(0);

    let outcome = h
        .controller()
        .run(h.canary(&[10, 50, 100], 0.05, 500.0), CancelSignal::never())
        .await
        .unwrap();

    assert!(matches!(outcome.final_state, RolloutState::Failed { .. }));
    assert!(reason(&outcome.final_state).starts_with("rollback unconfirmed"));
    // One attempt plus two retries at 0%.
    assert_eq!(h.log.weights(), vec![10, 50, 0, 0, 0]);
}

#[tokio::test]
async fn traffic_update_failure_reverts() {
    let h = Harness::new(healthy);
    h.control.fail_weight(50);

    let outcome = h
        .controller()
        .run(h.canary(&[10, 50, 100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap();

    assert!(reason(&outcome.final_state).starts_with("traffic update failed at stage 1"));
    assert_eq!(outcome.failure, Some(FailureKind::Transport));
    // 50 attempted twice (one retry), then the revert.
    assert_eq!(h.log.weights(), vec![10, 50, 50, 0]);
}

#[tokio::test]
async fn inactive_runtime_fails_before_traffic() {
    let h = Harness::new(healthy);
    h.control.set_status(&h.pair.new, RuntimeStatus::Updating);

    let outcome = h
        .controller()
        .run(h.canary(&[10, 100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap();

    assert!(matches!(outcome.final_state, RolloutState::Failed { .. }));
    assert!(reason(&outcome.final_state).contains("not active"));
    assert!(h.log.weights().is_empty());
}

#[tokio::test]
async fn unverifiable_stage_rolls_back() {
    let h = Harness::new(unavailable);
    let outcome = h
        .controller()
        .run(h.canary(&[10, 100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap();

    assert!(matches!(outcome.final_state, RolloutState::RolledBack { .. }));
    assert!(reason(&outcome.final_state).starts_with("unverifiable stage 0"));
    assert_eq!(outcome.failure, Some(FailureKind::UnverifiableStage));
    assert_eq!(h.log.weights(), vec![10, 0]);
}

#[tokio::test]
async fn blue_green_cuts_over_once() {
    let h = Harness::new(healthy);
    let outcome = h
        .controller()
        .run(h.blue_green(), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.strategy, StrategyKind::BlueGreen);
    assert_eq!(outcome.final_state, RolloutState::Promoted);
    assert_eq!(h.log.weights(), vec![100]);
}

#[tokio::test]
async fn blue_green_breach_reverts_in_one_call() {
    let h = Harness::new(|weight| Ok(if weight == 100 { (0.3, 120.0) } else { (0.0, 120.0) }));
    let outcome = h
        .controller()
        .run(h.blue_green(), CancelSignal::never())
        .await
        .unwrap();

    assert!(matches!(outcome.final_state, RolloutState::RolledBack { .. }));
    assert_eq!(h.log.weights(), vec![100, 0]);
}

#[tokio::test]
async fn record_persisted_with_transitions() {
    let h = Harness::new(healthy);
    let outcome = h
        .controller()
        .run(h.canary(&[10, 100], 0.02, 500.0), CancelSignal::never())
        .await
        .unwrap();

    let record = h.store.get_record(&h.pair.key()).unwrap().unwrap();
    assert_eq!(record.transitions, outcome.transitions);
    assert!(record.is_terminal());
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["final_state"]["state"], "promoted");
}
