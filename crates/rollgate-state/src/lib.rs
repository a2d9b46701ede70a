//! rollgate-state — persistent rollout state.
//!
//! Backed by [redb](https://docs.rs/redb). Two tables, both keyed by the
//! runtime pair key (`{old}->{new}`):
//!
//! - `leases`: which operation token currently holds write authority over
//!   the pair, and until when.
//! - `rollouts`: the latest record of the rollout for the pair, including
//!   its state and transition history.
//!
//! The controller may be restarted between stages, so neither lives in
//! process memory. `StateStore` is `Clone` + `Send` + `Sync`.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
