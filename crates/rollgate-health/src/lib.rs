//! rollgate-health — decides whether a rollout stage stayed healthy.
//!
//! During each stage's hold period a background task polls a
//! [`MetricStore`] for the new runtime. Samples stream back to
//! [`HealthMonitor::watch_stage`], which stops polling on the first
//! threshold breach, on cancellation, or when the hold period ends.

pub mod monitor;
pub mod sample;
pub mod store;

pub use monitor::{HealthMonitor, StageOutcome};
pub use sample::{evaluate, Breach, HealthSample, HealthThresholds, Metric, StageVerdict};
pub use store::{MetricError, MetricResult, MetricStore};
