//! Errors returned instead of a rollout outcome.

use thiserror::Error;

use rollgate_core::FailureKind;
use rollgate_state::StateError;

pub type RolloutResult<T> = Result<T, RolloutError>;

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("rollout for {pair} already finished as {state}; reset it to start a new rollout")]
    AlreadyTerminal { pair: String, state: String },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl RolloutError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidPlan(_) | Self::AlreadyTerminal { .. } => FailureKind::Caller,
            // A concurrent operation on the same pair is the caller's conflict.
            Self::State(StateError::LeaseHeld { .. }) => FailureKind::Caller,
            Self::State(_) => FailureKind::Transport,
        }
    }
}
