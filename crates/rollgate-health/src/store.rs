//! The metric store seam.

use std::time::Duration;

use thiserror::Error;

use rollgate_core::{BoxFuture, RuntimeRef};

use crate::sample::HealthSample;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    #[error("metric store unavailable: {0}")]
    Unavailable(String),

    #[error("metric query timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid metric data: {0}")]
    Invalid(String),
}

impl MetricError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

pub type MetricResult<T> = Result<T, MetricError>;

/// Read side of the log/metric store.
pub trait MetricStore: Send + Sync {
    /// Error rate and latency for `runtime` over the trailing `window`.
    fn sample<'a>(
        &'a self,
        runtime: &'a RuntimeRef,
        window: Duration,
    ) -> BoxFuture<'a, MetricResult<HealthSample>>;
}
