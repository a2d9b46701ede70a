//! rollgate-validate — certifies a runtime before it receives traffic.
//!
//! A [`ValidationSuite`] runs a fixed, ordered list of
//! [`ValidationCase`]s over one shared session, then an advisory latency
//! sample, and folds the outcomes into a [`ValidationReport`]. The
//! controller consumes it through the [`Validator`] trait.

pub mod case;
pub mod report;
pub mod suite;

pub use case::ValidationCase;
pub use report::{CaseOutcome, LatencySummary, ValidationReport};
pub use suite::{LatencyProbe, ValidationSuite, Validator};
