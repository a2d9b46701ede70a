use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Args;
use tracing::{error, info, warn};

use rollgate_core::{RuntimePair, Settings, StrategyKind, cancellation, parse_duration};
use rollgate_health::HealthMonitor;
use rollgate_rollout::{RolloutController, RolloutPlan, RolloutRequest, RolloutState};
use rollgate_state::StateStore;
use rollgate_validate::ValidationSuite;

use crate::ReportArgs;
use crate::adapters::{HttpControlPlane, HttpMetricStore};

#[derive(Args, Debug, Default)]
pub struct RolloutArgs {
    /// Runtime currently serving traffic, `endpoint[@qualifier]`
    #[arg(long)]
    old: String,
    /// Runtime to roll out, `endpoint[@qualifier]`
    #[arg(long)]
    new: String,
    /// Unique operation token; reusing it after a crash renews the lease
    #[arg(long)]
    token: String,
    /// Stage weights, e.g. `10,50,100` (overrides [rollout].stages)
    #[arg(long, value_delimiter = ',')]
    stages: Option<Vec<u8>>,
    /// Per-stage hold, e.g. `5m` (overrides [rollout].hold)
    #[arg(long)]
    hold: Option<String>,
    /// Highest tolerated error rate, 0.0..=1.0
    #[arg(long)]
    max_error_rate: Option<f64>,
    /// Highest tolerated p99 latency in milliseconds
    #[arg(long)]
    max_p99_ms: Option<f64>,
    /// Single 0 → 100 cutover instead of canary stages
    #[arg(long, conflicts_with = "stages")]
    blue_green: bool,
}

/// Fold command-line overrides into the configured settings.
fn apply_overrides(settings: &mut Settings, args: &RolloutArgs) -> anyhow::Result<()> {
    if let Some(stages) = &args.stages {
        settings.rollout.stages = stages.clone();
        settings.rollout.strategy = StrategyKind::Canary;
    }
    if args.blue_green {
        settings.rollout.strategy = StrategyKind::BlueGreen;
    }
    if let Some(hold) = &args.hold {
        settings.rollout.hold =
            parse_duration(hold).ok_or_else(|| anyhow!("--hold: invalid duration '{hold}'"))?;
    }
    if let Some(rate) = args.max_error_rate {
        settings.health.max_error_rate = rate;
    }
    if let Some(p99) = args.max_p99_ms {
        settings.health.max_p99_latency_ms = p99;
    }
    Ok(())
}

pub async fn rollout(
    mut settings: Settings,
    args: RolloutArgs,
    output: &ReportArgs,
) -> anyhow::Result<ExitCode> {
    apply_overrides(&mut settings, &args)?;
    let pair = RuntimePair::new(
        super::parse_runtime(&args.old, None)?,
        super::parse_runtime(&args.new, None)?,
    );
    let plan = RolloutPlan::from_settings(&settings.rollout, &settings.health);

    let control_url = settings
        .control_plane
        .url
        .clone()
        .ok_or_else(|| anyhow!("[control_plane].url is not configured"))?;
    let metrics_url = settings
        .metrics
        .url
        .clone()
        .ok_or_else(|| anyhow!("[metrics].url is not configured"))?;

    let transport = super::transport()?;
    let control = HttpControlPlane::new(
        transport.clone(),
        &control_url,
        settings.control_plane.bearer_token.clone(),
    );
    let metrics = HttpMetricStore::new(
        transport.clone(),
        &metrics_url,
        settings.metrics.bearer_token.clone(),
    );
    let suite = ValidationSuite::standard(
        super::protocol_client(&settings, transport.clone()),
        &settings.endpoint,
        &settings.validation,
    );
    let monitor =
        HealthMonitor::from_settings(Arc::new(metrics), &settings.health).with_retry(settings.retry);
    let store = StateStore::open_dir(&settings.rollout.data_dir).with_context(|| {
        format!("opening state in {}", settings.rollout.data_dir.display())
    })?;

    let controller = RolloutController::new(Arc::new(control), Arc::new(suite), monitor, store)
        .with_retry(settings.retry)
        .with_revert_retry(settings.revert_retry)
        .with_lease_ttl(settings.rollout.lease_ttl);

    let (cancel, signal) = cancellation();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received; cancelling rollout");
                cancel.cancel();
            }
            Err(e) => error!(error = %e, "failed to install Ctrl-C handler"),
        }
    });

    let request = RolloutRequest {
        pair,
        plan,
        token: args.token,
    };
    let outcome = controller.run(request, signal).await.inspect_err(|e| {
        error!(kind = %e.kind(), error = %e, "rollout refused");
    })?;

    let doc = super::emitter(&settings, transport).emit(&outcome).await?;
    super::output(&doc, output)?;

    info!(state = %outcome.final_state, "done");
    Ok(exit_code(&outcome.final_state))
}

/// Non-zero iff the rollout ended in `RolledBack` or `Failed`.
fn exit_code(state: &RolloutState) -> ExitCode {
    match state {
        RolloutState::RolledBack { .. } | RolloutState::Failed { .. } => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}
