//! The report document and its notification summary.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use rollgate_core::{FailureKind, RuntimeRef, StrategyKind};
use rollgate_rollout::{RolloutOutcome, RolloutState, StageRecord, Transition};
use rollgate_validate::ValidationReport;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Standalone validation run.
    Validation,
    Rollout,
}

/// Everything CI needs to gate on one run.
///
/// `digest` is the sha256 of the document's compact JSON with the digest
/// field itself omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub kind: ReportKind,
    pub generated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<RuntimeRef>,
    pub new: RuntimeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub stages: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<RolloutState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub passed: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
}

impl ReportDocument {
    pub fn from_outcome(outcome: &RolloutOutcome, generated_at_ms: u64) -> ReportResult<Self> {
        Self {
            kind: ReportKind::Rollout,
            generated_at_ms,
            old: Some(outcome.pair.old.clone()),
            new: outcome.pair.new.clone(),
            token: Some(outcome.token.clone()),
            strategy: Some(outcome.strategy),
            validation: outcome.validation.clone(),
            transitions: outcome.transitions.clone(),
            stages: outcome.stages.clone(),
            final_state: Some(outcome.final_state.clone()),
            failure: outcome.failure,
            passed: outcome.is_promoted(),
            duration_ms: outcome.duration_ms(),
            digest: String::new(),
        }
        .sealed()
    }

    pub fn from_validation(
        runtime: &RuntimeRef,
        report: &ValidationReport,
        generated_at_ms: u64,
    ) -> ReportResult<Self> {
        Self {
            kind: ReportKind::Validation,
            generated_at_ms,
            old: None,
            new: runtime.clone(),
            token: None,
            strategy: None,
            validation: Some(report.clone()),
            transitions: Vec::new(),
            stages: Vec::new(),
            final_state: None,
            failure: report.failure_kind(),
            passed: report.passed,
            duration_ms: report.duration_ms(),
            digest: String::new(),
        }
        .sealed()
    }

    fn sealed(mut self) -> ReportResult<Self> {
        self.digest = self.compute_digest()?;
        Ok(self)
    }

    /// sha256 hex over the document without its digest.
    pub fn compute_digest(&self) -> ReportResult<String> {
        let mut unsealed = self.clone();
        unsealed.digest.clear();
        let bytes = serde_json::to_vec(&unsealed)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Whether `digest` still matches the content.
    pub fn verify_digest(&self) -> ReportResult<bool> {
        Ok(!self.digest.is_empty() && self.compute_digest()? == self.digest)
    }

    pub fn to_pretty_json(&self) -> ReportResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable headline plus the attributed failure, if any.
    pub fn summary(&self) -> Summary {
        let subject = match &self.old {
            Some(old) => format!("{old} -> {}", self.new),
            None => self.new.to_string(),
        };
        let outcome = match &self.final_state {
            Some(state) => state.name().to_string(),
            None if self.passed => "passed".to_string(),
            None => "failed".to_string(),
        };
        let detail = match &self.final_state {
            Some(state) => state.reason().map(str::to_string),
            None => self
                .validation
                .as_ref()
                .filter(|v| !v.passed)
                .map(ValidationReport::failure_summary),
        };
        Summary {
            kind: self.kind,
            subject,
            passed: self.passed,
            outcome,
            failure: self.failure,
            detail,
            duration_ms: self.duration_ms,
        }
    }
}

/// Short notification payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub kind: ReportKind,
    pub subject: String,
    pub passed: bool,
    /// Final state name, or `passed`/`failed` for a validation run.
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub duration_ms: u64,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let what = match self.kind {
            ReportKind::Validation => "validation",
            ReportKind::Rollout => "rollout",
        };
        write!(
            f,
            "{what} {}: {} in {:.1}s",
            self.subject,
            self.outcome,
            self.duration_ms as f64 / 1000.0
        )?;
        match (&self.failure, &self.detail) {
            (Some(kind), Some(detail)) => write!(f, " [{kind}] {detail}"),
            (None, Some(detail)) => write!(f, " {detail}"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use rollgate_core::RuntimePair;
    use rollgate_health::StageVerdict;
    use rollgate_validate::CaseOutcome;

    use super::*;

    fn pair() -> RuntimePair {
        RuntimePair::new(
            RuntimeRef::with_created_at("orders", "v6", 1),
            RuntimeRef::with_created_at("orders", "v7", 2),
        )
    }

    fn validation(passed: bool) -> ValidationReport {
        let case = CaseOutcome {
            name: "capability_discovery".into(),
            passed,
            gating: true,
            duration_ms: 3,
            reason: (!passed).then(|| "tool `add` missing inputSchema".to_string()),
            failure: (!passed).then_some(FailureKind::Protocol),
        };
        ValidationReport::new("orders@v7".into(), "s".repeat(64), 100, 150, vec![case], None)
    }

    fn rolled_back() -> RolloutOutcome {
        let reason = "health violation at stage 1 (error rate 0.12 exceeds 0.05)".to_string();
        let stage = RolloutState::StageActive { index: 1, weight: 50 };
        RolloutOutcome {
            pair: pair(),
            token: "op-9".into(),
            strategy: StrategyKind::Canary,
            final_state: RolloutState::RolledBack {
                reason: reason.clone(),
            },
            failure: Some(FailureKind::HealthViolation),
            transitions: vec![Transition {
                from: stage,
                to: RolloutState::RolledBack {
                    reason: reason.clone(),
                },
                at_ms: 2_000,
                reason: Some(reason),
            }],
            validation: Some(validation(true)),
            stages: vec![StageRecord {
                index: 1,
                weight: 50,
                started_at_ms: 1_500,
                finished_at_ms: 1_900,
                verdict: StageVerdict::Healthy,
                samples: 2,
                failed_polls: 0,
            }],
            started_at_ms: 1_000,
            finished_at_ms: 3_500,
        }
    }

    #[test]
    fn rollout_document_carries_outcome() {
        let doc = ReportDocument::from_outcome(&rolled_back(), 4_000).unwrap();
        assert_eq!(doc.kind, ReportKind::Rollout);
        assert!(!doc.passed);
        assert_eq!(doc.duration_ms, 2_500);
        assert_eq!(doc.token.as_deref(), Some("op-9"));
        assert_eq!(doc.stages[0].samples, 2);
        assert_eq!(doc.digest.len(), 64);
        assert!(doc.verify_digest().unwrap());
    }

    #[test]
    fn digest_excludes_itself_and_detects_edits() {
        let doc = ReportDocument::from_outcome(&rolled_back(), 4_000).unwrap();
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("digest").is_some());

        let mut unsealed = doc.clone();
        unsealed.digest.clear();
        let unsealed_json = serde_json::to_value(&unsealed).unwrap();
        assert!(unsealed_json.get("digest").is_none());

        let mut tampered = doc.clone();
        tampered.passed = true;
        assert!(!tampered.verify_digest().unwrap());
    }

    #[test]
    fn digest_survives_json_round_trip() {
        let doc = ReportDocument::from_outcome(&rolled_back(), 4_000).unwrap();
        let text = doc.to_pretty_json().unwrap();
        let back: ReportDocument = serde_json::from_str(&text).unwrap();
        assert!(back.verify_digest().unwrap());
    }

    #[test]
    fn rollback_summary_names_stage_and_kind() {
        let summary = ReportDocument::from_outcome(&rolled_back(), 0).unwrap().summary();
        assert_eq!(summary.outcome, "rolled_back");
        let line = summary.to_string();
        assert!(line.starts_with("rollout orders@v6 -> orders@v7: rolled_back in 2.5s"), "{line}");
        assert!(line.contains("[health violation] health violation at stage 1"), "{line}");
    }

    #[test]
    fn failed_validation_summary_names_case() {
        let runtime = RuntimeRef::with_created_at("orders", "v7", 2);
        let doc = ReportDocument::from_validation(&runtime, &validation(false), 0).unwrap();
        assert_eq!(doc.failure, Some(FailureKind::Protocol));
        let summary = doc.summary();
        assert_eq!(summary.outcome, "failed");
        assert!(summary.detail.unwrap().starts_with("capability_discovery:"));
    }
}
