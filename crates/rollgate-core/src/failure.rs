//! Failure taxonomy.
//!
//! Every terminal rollout reason and every failed validation case is
//! attributed to exactly one of these kinds.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed plan, reused terminal rollout, short session id.
    /// Never retried.
    Caller,
    /// Network, timeout, or stream-format failure. Retried with backoff
    /// before it is surfaced.
    Transport,
    /// Well-formed response carrying a logical error. Never retried.
    Protocol,
    /// A sampled metric breached a threshold.
    HealthViolation,
    /// No health sample could be read for a whole hold window.
    UnverifiableStage,
    /// Operator cancelled the rollout.
    Cancelled,
}

impl FailureKind {
    /// Whether a failure of this kind may be retried locally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Transport)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Caller => "caller error",
            FailureKind::Transport => "transport error",
            FailureKind::Protocol => "protocol error",
            FailureKind::HealthViolation => "health violation",
            FailureKind::UnverifiableStage => "unverifiable stage",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
