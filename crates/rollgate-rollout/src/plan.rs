//! Rollout plans.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use rollgate_core::StrategyKind;
use rollgate_core::config::{HealthSettings, RolloutSettings};
use rollgate_health::HealthThresholds;

use crate::error::{RolloutError, RolloutResult};

/// Stage weights for the new runtime, the per-stage hold, and the health
/// thresholds every sample during that hold must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutPlan {
    pub strategy: StrategyKind,
    pub stages: Vec<u8>,
    pub hold: Duration,
    pub thresholds: HealthThresholds,
}

impl RolloutPlan {
    pub fn canary(stages: Vec<u8>, hold: Duration, thresholds: HealthThresholds) -> Self {
        Self {
            strategy: StrategyKind::Canary,
            stages,
            hold,
            thresholds,
        }
    }

    /// Single 0 → 100 cutover.
    pub fn blue_green(hold: Duration, thresholds: HealthThresholds) -> Self {
        Self {
            strategy: StrategyKind::BlueGreen,
            stages: vec![100],
            hold,
            thresholds,
        }
    }

    pub fn from_settings(rollout: &RolloutSettings, health: &HealthSettings) -> Self {
        let thresholds = HealthThresholds::from(health);
        match rollout.strategy {
            StrategyKind::Canary => Self::canary(rollout.stages.clone(), rollout.hold, thresholds),
            StrategyKind::BlueGreen => Self::blue_green(rollout.hold, thresholds),
        }
    }

    pub fn validate(&self) -> RolloutResult<()> {
        let invalid = |msg: String| Err(RolloutError::InvalidPlan(msg));

        if self.stages.is_empty() {
            return invalid("no stages".to_string());
        }
        if let Some(w) = self.stages.iter().find(|w| !(1..=100).contains(*w)) {
            return invalid(format!("stage weight {w} outside 1..=100"));
        }
        if let Some(pair) = self.stages.windows(2).find(|p| p[0] >= p[1]) {
            return invalid(format!(
                "stage weights must strictly increase ({} then {})",
                pair[0], pair[1]
            ));
        }
        if self.stages.last() != Some(&100) {
            return invalid("last stage must be 100".to_string());
        }
        if self.strategy == StrategyKind::BlueGreen && self.stages != [100] {
            return invalid("blue/green has exactly one stage of 100".to_string());
        }
        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.max_error_rate) {
            return invalid(format!("max error rate {} outside 0.0..=1.0", t.max_error_rate));
        }
        if !t.max_p99_latency_ms.is_finite() || t.max_p99_latency_ms <= 0.0 {
            return invalid(format!(
                "max p99 latency {} must be a positive number",
                t.max_p99_latency_ms
            ));
        }
        Ok(())
    }
}
