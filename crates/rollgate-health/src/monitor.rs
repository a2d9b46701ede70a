//! Health monitor — per-stage background polling.
//!
//! `watch_stage` spawns one poll task for the stage. The task polls at
//! `interval`, `2 * interval`, ... up to the hold deadline, the last poll
//! landing on the deadline itself. Results flow back over a channel and
//! are evaluated as they arrive. The task is stopped the moment the stage
//! is decided, so no stale poll is ever acted on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use rollgate_core::config::HealthSettings;
use rollgate_core::{CancelSignal, RetryPolicy, RuntimeRef};

use crate::sample::{Breach, HealthSample, HealthThresholds, StageVerdict};
use crate::store::{MetricError, MetricStore};

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of watching one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub verdict: StageVerdict,
    /// Successful samples received before the stage was decided.
    pub samples: Vec<HealthSample>,
    pub failed_polls: u32,
}

enum PollEvent {
    Sample(HealthSample),
    Failed(MetricError),
}

/// Poll task handle plus its shutdown signal.
struct PollSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

// A watch dropped mid-stage must not leave its poll task running.
impl Drop for PollSlot {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

#[derive(Clone)]
pub struct HealthMonitor {
    store: Arc<dyn MetricStore>,
    interval: Duration,
    window: Duration,
    retry: RetryPolicy,
    poll_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn MetricStore>, interval: Duration, window: Duration) -> Self {
        Self {
            store,
            interval,
            window,
            retry: RetryPolicy::default(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn from_settings(store: Arc<dyn MetricStore>, settings: &HealthSettings) -> Self {
        Self::new(store, settings.interval, settings.window)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One sample, with the per-call timeout and retry policy applied.
    pub async fn sample(&self, runtime: &RuntimeRef) -> Result<HealthSample, MetricError> {
        poll_once(self.store.as_ref(), runtime, self.window, &self.retry, self.poll_timeout).await
    }

    /// Watch `runtime` for `hold`. Returns on the first breach, on
    /// cancellation, or once the last scheduled poll has been evaluated.
    pub async fn watch_stage(
        &self,
        runtime: &RuntimeRef,
        hold: Duration,
        thresholds: &HealthThresholds,
        cancel: &CancelSignal,
    ) -> StageOutcome {
        let polls = poll_count(hold, self.interval);
        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = PollTask {
            store: Arc::clone(&self.store),
            runtime: runtime.clone(),
            window: self.window,
            interval: self.interval,
            hold,
            polls,
            retry: self.retry,
            poll_timeout: self.poll_timeout,
        };
        let slot = PollSlot {
            handle: tokio::spawn(task.run(tx, shutdown_rx)),
            shutdown_tx,
        };
        debug!(runtime = %runtime, hold_ms = hold.as_millis() as u64, polls, "stage watch started");

        let mut samples = Vec::new();
        let mut failed_polls = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    drop(slot);
                    info!(runtime = %runtime, samples = samples.len(), "stage watch cancelled");
                    return StageOutcome { verdict: StageVerdict::Cancelled, samples, failed_polls };
                }
                event = rx.recv() => match event {
                    Some(PollEvent::Sample(sample)) if !sample.has_traffic() => {
                        // Nothing was served in the window, so nothing was measured.
                        failed_polls += 1;
                        warn!(runtime = %runtime, failed_polls, "health poll saw no requests; skipping");
                    }
                    Some(PollEvent::Sample(sample)) => {
                        if let Some((metric, observed, limit)) = thresholds.check(&sample) {
                            drop(slot);
                            let breach = Breach { sample_index: samples.len(), metric, observed, limit };
                            warn!(runtime = %runtime, %breach, "health threshold breached");
                            samples.push(sample);
                            return StageOutcome {
                                verdict: StageVerdict::Violation { breach },
                                samples,
                                failed_polls,
                            };
                        }
                        samples.push(sample);
                    }
                    Some(PollEvent::Failed(e)) => {
                        failed_polls += 1;
                        warn!(runtime = %runtime, error = %e, failed_polls, "health poll failed; skipping");
                    }
                    None => break,
                },
            }
        }
        drop(slot);

        let verdict = if samples.is_empty() {
            warn!(runtime = %runtime, failed_polls, "no successful health poll during hold");
            StageVerdict::Unverifiable { failed_polls }
        } else {
            StageVerdict::Healthy
        };
        info!(
            runtime = %runtime,
            verdict = verdict.as_str(),
            samples = samples.len(),
            failed_polls,
            "stage watch finished"
        );
        StageOutcome {
            verdict,
            samples,
            failed_polls,
        }
    }
}

/// `ceil(hold / interval)`, at least one.
fn poll_count(hold: Duration, interval: Duration) -> u32 {
    if interval.is_zero() {
        return 1;
    }
    let hold = hold.as_nanos();
    let interval = interval.as_nanos();
    (hold.div_ceil(interval)).clamp(1, u32::MAX as u128) as u32
}

struct PollTask {
    store: Arc<dyn MetricStore>,
    runtime: RuntimeRef,
    window: Duration,
    interval: Duration,
    hold: Duration,
    polls: u32,
    retry: RetryPolicy,
    poll_timeout: Duration,
}

impl PollTask {
    async fn run(self, tx: mpsc::Sender<PollEvent>, mut shutdown: watch::Receiver<bool>) {
        let start = Instant::now();
        for n in 1..=self.polls {
            let offset = self.interval.saturating_mul(n).min(self.hold);
            tokio::select! {
                _ = tokio::time::sleep_until(start + offset) => {}
                _ = shutdown.changed() => {
                    debug!(runtime = %self.runtime, "poll task shutting down");
                    return;
                }
            }

            let event = match poll_once(
                self.store.as_ref(),
                &self.runtime,
                self.window,
                &self.retry,
                self.poll_timeout,
            )
            .await
            {
                Ok(sample) => PollEvent::Sample(sample),
                Err(e) => PollEvent::Failed(e),
            };
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

async fn poll_once(
    store: &dyn MetricStore,
    runtime: &RuntimeRef,
    window: Duration,
    retry: &RetryPolicy,
    timeout: Duration,
) -> Result<HealthSample, MetricError> {
    retry
        .run(
            "metric poll",
            |_| async move {
                let sample = tokio::time::timeout(timeout, store.sample(runtime, window))
                    .await
                    .map_err(|_| MetricError::Timeout(timeout))??;
                sample.check_sane()?;
                Ok(sample)
            },
            MetricError::is_retryable,
        )
        .await
}
