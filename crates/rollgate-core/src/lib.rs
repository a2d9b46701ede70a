//! rollgate-core — shared types for the rollgate workspace.
//!
//! Every other crate depends on this one for the runtime identity types,
//! the failure taxonomy, the bounded retry policy, the cancellation
//! token, and the `rollgate.toml` configuration.

pub mod cancel;
pub mod config;
pub mod duration;
pub mod failure;
pub mod retry;
pub mod types;

pub use cancel::{cancellation, CancelHandle, CancelSignal};
pub use config::{ConfigError, ConfigResult, RollgateConfig, Settings};
pub use duration::parse_duration;
pub use failure::FailureKind;
pub use retry::RetryPolicy;
pub use types::*;
