//! The runtime control plane seam.

use std::time::Duration;

use thiserror::Error;

use rollgate_core::{BoxFuture, RuntimeRef, RuntimeStatus};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("control plane unreachable: {0}")]
    Transport(String),

    #[error("control plane call timed out after {0:?}")]
    Timeout(Duration),

    #[error("control plane rejected request: {0}")]
    Rejected(String),
}

impl ControlError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

/// Status queries and traffic mutation for runtime versions.
pub trait ControlPlane: Send + Sync {
    fn describe<'a>(&'a self, runtime: &'a RuntimeRef)
    -> BoxFuture<'a, Result<RuntimeStatus, ControlError>>;

    /// Route `new_weight` percent to `new`, the complement to `old`.
    fn set_traffic_weight<'a>(
        &'a self,
        old: &'a RuntimeRef,
        new: &'a RuntimeRef,
        new_weight: u8,
    ) -> BoxFuture<'a, Result<(), ControlError>>;
}
