//! rollgate-rollout — the rollout controller.
//!
//! # Architecture
//!
//! ```text
//! RolloutController::run(request, cancel)
//!   ├── plan check, terminal-record check, lease      (caller errors → Err)
//!   ├── Validating: Validator::validate(new)          (fail → Failed)
//!   ├── ControlPlane::describe(old, new)              (not active → Failed)
//!   ├── for each stage:
//!   │     ControlPlane::set_traffic_weight(old, new, w)
//!   │     StageActive(i, w)
//!   │     HealthMonitor::watch_stage(new, hold)        (breach, unverifiable,
//!   │                                                   cancel → revert to 0)
//!   ├── Promoted (old runtime left at 0%)
//!   └── record persisted, lease released
//! ```
//!
//! Every state change is appended to the transition log and written to
//! the [`rollgate_state::StateStore`], so a second invocation against a
//! finished pair is rejected even from a fresh process.

pub mod control;
pub mod controller;
pub mod error;
pub mod plan;

pub use control::{ControlError, ControlPlane};
pub use controller::{RolloutController, RolloutOutcome, RolloutRequest, StageRecord};
pub use error::{RolloutError, RolloutResult};
pub use plan::RolloutPlan;
pub use rollgate_state::{RolloutState, Transition};
