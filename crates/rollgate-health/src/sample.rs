//! Samples, thresholds, and the stage evaluation rule.

use serde::{Deserialize, Serialize};

use rollgate_core::config::HealthSettings;

use crate::store::MetricError;

/// One poll result for a runtime over a fixed window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub timestamp_ms: u64,
    /// 0.0..=1.0
    pub error_rate: f64,
    pub p99_latency_ms: f64,
    pub request_count: u64,
}

impl HealthSample {
    pub fn new(timestamp_ms: u64, error_rate: f64, p99_latency_ms: f64, request_count: u64) -> Self {
        Self {
            timestamp_ms,
            error_rate,
            p99_latency_ms,
            request_count,
        }
    }

    /// Whether the window saw any requests. An idle window measured nothing.
    pub fn has_traffic(&self) -> bool {
        self.request_count > 0
    }

    /// Reject values no real store would report.
    pub fn check_sane(&self) -> Result<(), MetricError> {
        if !self.error_rate.is_finite() || !(0.0..=1.0).contains(&self.error_rate) {
            return Err(MetricError::Invalid(format!(
                "error rate {} outside 0.0..=1.0",
                self.error_rate
            )));
        }
        if !self.p99_latency_ms.is_finite() || self.p99_latency_ms < 0.0 {
            return Err(MetricError::Invalid(format!(
                "p99 latency {} is not a non-negative number",
                self.p99_latency_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    pub max_error_rate: f64,
    pub max_p99_latency_ms: f64,
}

impl HealthThresholds {
    pub fn new(max_error_rate: f64, max_p99_latency_ms: f64) -> Self {
        Self {
            max_error_rate,
            max_p99_latency_ms,
        }
    }

    /// First threshold `sample` breaches, error rate checked first.
    pub fn check(&self, sample: &HealthSample) -> Option<(Metric, f64, f64)> {
        if sample.error_rate > self.max_error_rate {
            return Some((Metric::ErrorRate, sample.error_rate, self.max_error_rate));
        }
        if sample.p99_latency_ms > self.max_p99_latency_ms {
            return Some((
                Metric::P99Latency,
                sample.p99_latency_ms,
                self.max_p99_latency_ms,
            ));
        }
        None
    }
}

impl From<&HealthSettings> for HealthThresholds {
    fn from(settings: &HealthSettings) -> Self {
        Self::new(settings.max_error_rate, settings.max_p99_latency_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    ErrorRate,
    P99Latency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breach {
    /// Position among the stage's successful samples.
    pub sample_index: usize,
    pub metric: Metric,
    pub observed: f64,
    pub limit: f64,
}

impl std::fmt::Display for Breach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.metric {
            Metric::ErrorRate => write!(f, "error rate {} exceeds {}", self.observed, self.limit),
            Metric::P99Latency => {
                write!(f, "p99 latency {}ms exceeds {}ms", self.observed, self.limit)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum StageVerdict {
    Healthy,
    Violation { breach: Breach },
    /// No successful poll that saw traffic during the whole hold period.
    Unverifiable { failed_polls: u32 },
    Cancelled,
}

impl StageVerdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Violation { .. } => "violation",
            Self::Unverifiable { .. } => "unverifiable",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Every sample must satisfy every threshold; no averaging. Idle samples
/// are ignored, and a set with no sample that saw traffic is unverifiable.
pub fn evaluate(samples: &[HealthSample], thresholds: &HealthThresholds) -> StageVerdict {
    if !samples.iter().any(HealthSample::has_traffic) {
        return StageVerdict::Unverifiable { failed_polls: 0 };
    }
    for (sample_index, sample) in samples.iter().enumerate().filter(|(_, s)| s.has_traffic()) {
        if let Some((metric, observed, limit)) = thresholds.check(sample) {
            return StageVerdict::Violation {
                breach: Breach {
                    sample_index,
                    metric,
                    observed,
                    limit,
                },
            };
        }
    }
    StageVerdict::Healthy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(error_rate: f64, p99: f64) -> HealthSample {
        HealthSample::new(0, error_rate, p99, 100)
    }

    #[test]
    fn all_within_thresholds_is_healthy() {
        let thresholds = HealthThresholds::new(0.02, 500.0);
        let samples = vec![sample(0.0, 120.0), sample(0.02, 500.0)];
        assert_eq!(evaluate(&samples, &thresholds), StageVerdict::Healthy);
    }

    #[test]
    fn single_breach_fails_without_averaging() {
        let thresholds = HealthThresholds::new(0.05, 1000.0);
        let mut samples = vec![sample(0.0, 10.0); 9];
        samples.insert(4, sample(0.09, 10.0));
        match evaluate(&samples, &thresholds) {
            StageVerdict::Violation { breach } => {
                assert_eq!(breach.sample_index, 4);
                assert_eq!(breach.metric, Metric::ErrorRate);
                assert_eq!(breach.to_string(), "error rate 0.09 exceeds 0.05");
            }
            other => panic!("expected violation, got {other:?}"),
        }
    }

    #[test]
    fn latency_breach() {
        let thresholds = HealthThresholds::new(0.05, 500.0);
        let verdict = evaluate(&[sample(0.0, 750.0)], &thresholds);
        match verdict {
            StageVerdict::Violation { breach } => assert_eq!(breach.metric, Metric::P99Latency),
            other => panic!("expected violation, got {other:?}"),
        }
    }

    #[test]
    fn no_samples_is_unverifiable() {
        let verdict = evaluate(&[], &HealthThresholds::new(0.05, 500.0));
        assert!(matches!(verdict, StageVerdict::Unverifiable { .. }));
        assert!(!verdict.is_healthy());
    }

    #[test]
    fn idle_samples_prove_nothing() {
        let thresholds = HealthThresholds::new(0.05, 500.0);
        let idle = HealthSample::new(0, 0.0, 0.0, 0);
        assert!(matches!(
            evaluate(&[idle.clone(), idle.clone()], &thresholds),
            StageVerdict::Unverifiable { .. }
        ));
        assert_eq!(evaluate(&[idle, sample(0.01, 90.0)], &thresholds), StageVerdict::Healthy);
    }

    #[test]
    fn sanity_check() {
        assert!(sample(0.5, 1.0).check_sane().is_ok());
        assert!(sample(1.5, 1.0).check_sane().is_err());
        assert!(sample(f64::NAN, 1.0).check_sane().is_err());
        assert!(sample(0.0, -1.0).check_sane().is_err());
    }
}
