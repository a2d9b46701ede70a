//! Persisted rollout types.

use serde::{Deserialize, Serialize};

use rollgate_core::StrategyKind;

/// Rollout lifecycle. Forward-only, except that `RolledBack` and `Failed`
/// are reachable from every non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RolloutState {
    Initializing,
    Validating,
    StageActive { index: usize, weight: u8 },
    Promoted,
    RolledBack { reason: String },
    Failed { reason: String },
}

impl RolloutState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Promoted | Self::RolledBack { .. } | Self::Failed { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Validating => "validating",
            Self::StageActive { .. } => "stage_active",
            Self::Promoted => "promoted",
            Self::RolledBack { .. } => "rolled_back",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::RolledBack { reason } | Self::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: &RolloutState) -> bool {
        use RolloutState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, RolledBack { .. } | Failed { .. }) => true,
            (Initializing, Validating) => true,
            (Validating, StageActive { index: 0, .. }) => true,
            (StageActive { index: i, .. }, StageActive { index: j, .. }) => *j == i + 1,
            (StageActive { .. }, Promoted) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RolloutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StageActive { index, weight } => write!(f, "stage_active({index}, {weight}%)"),
            Self::RolledBack { reason } => write!(f, "rolled_back({reason})"),
            Self::Failed { reason } => write!(f, "failed({reason})"),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: RolloutState,
    pub to: RolloutState,
    pub at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Write authority over a runtime pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub pair_key: String,
    pub token: String,
    pub acquired_at_ms: u64,
    pub expires_at_ms: u64,
}

impl Lease {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Latest known rollout for a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutRecord {
    pub pair_key: String,
    pub token: String,
    pub strategy: StrategyKind,
    pub state: RolloutState,
    pub transitions: Vec<Transition>,
    pub started_at_ms: u64,
    pub updated_at_ms: u64,
}

impl RolloutRecord {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
