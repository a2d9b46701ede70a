//! Validation report types.

use serde::{Deserialize, Serialize};

use rollgate_core::FailureKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub name: String,
    pub passed: bool,
    /// Whether this case counts toward the overall verdict.
    pub gating: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Class of the failure; `None` when the case passed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

/// Advisory latency statistics, milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub successes: usize,
    pub min_ms: f64,
    pub median_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    /// Summarise raw durations. `None` when nothing was measured.
    pub fn from_samples(latencies_us: &[u64], attempted: usize) -> Option<Self> {
        if latencies_us.is_empty() {
            return None;
        }
        let mut sorted = latencies_us.to_vec();
        sorted.sort_unstable();

        let p50_idx = (sorted.len() as f64 * 0.50) as usize;
        let p99_idx = (sorted.len() as f64 * 0.99) as usize;
        let at = |idx: usize| sorted[idx.min(sorted.len() - 1)] as f64 / 1000.0;

        Some(Self {
            samples: attempted,
            successes: sorted.len(),
            min_ms: at(0),
            median_ms: at(p50_idx),
            p99_ms: at(p99_idx),
        })
    }
}

/// Outcome of one validation run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub runtime: String,
    pub session_id: String,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub cases: Vec<CaseOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencySummary>,
    pub passed: bool,
}

impl ValidationReport {
    pub fn new(
        runtime: String,
        session_id: String,
        started_at_ms: u64,
        finished_at_ms: u64,
        cases: Vec<CaseOutcome>,
        latency: Option<LatencySummary>,
    ) -> Self {
        let passed = cases.iter().filter(|c| c.gating).all(|c| c.passed);
        Self {
            runtime,
            session_id,
            started_at_ms,
            finished_at_ms,
            cases,
            latency,
            passed,
        }
    }

    /// Gating cases that failed, in run order.
    pub fn failures(&self) -> impl Iterator<Item = &CaseOutcome> {
        self.cases.iter().filter(|c| c.gating && !c.passed)
    }

    /// `"case: reason; case: reason"` for the failed gating cases.
    pub fn failure_summary(&self) -> String {
        self.failures()
            .map(|c| match &c.reason {
                Some(reason) => format!("{}: {reason}", c.name),
                None => c.name.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Class of the first failed gating case; `None` if the report passed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.passed {
            return None;
        }
        let first = self.failures().next();
        Some(first.and_then(|c| c.failure).unwrap_or(FailureKind::Protocol))
    }

    pub fn case(&self, name: &str) -> Option<&CaseOutcome> {
        self.cases.iter().find(|c| c.name == name)
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_at_ms.saturating_sub(self.started_at_ms)
    }
}
