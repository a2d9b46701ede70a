//! Shared types used across rollgate crates.

use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Boxed future returned by the collaborator seams (control plane,
/// metric store, transport, notification sink).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identifies a deployed runtime version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeRef {
    /// Opaque endpoint identifier (an ARN, a URL, a service name).
    endpoint: String,
    /// Version or qualifier string (e.g. `DEFAULT`, `v7`).
    qualifier: String,
    /// Unix timestamp (seconds) when this reference was created.
    created_at: u64,
}

impl RuntimeRef {
    pub fn new(endpoint: &str, qualifier: &str) -> Self {
        Self::with_created_at(endpoint, qualifier, epoch_secs())
    }

    pub fn with_created_at(endpoint: &str, qualifier: &str, created_at: u64) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            qualifier: qualifier.to_string(),
            created_at,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// `{endpoint}@{qualifier}`, used in log fields and store keys.
    pub fn label(&self) -> String {
        format!("{}@{}", self.endpoint, self.qualifier)
    }
}

impl std::fmt::Display for RuntimeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.endpoint, self.qualifier)
    }
}

/// The old/new pair a rollout moves traffic between.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimePair {
    pub old: RuntimeRef,
    pub new: RuntimeRef,
}

impl RuntimePair {
    pub fn new(old: RuntimeRef, new: RuntimeRef) -> Self {
        Self { old, new }
    }

    /// Store key for leases and rollout records: `{old}->{new}`.
    ///
    /// Creation timestamps are not part of the key, so a restarted
    /// controller that rebuilds the refs finds the same record.
    pub fn key(&self) -> String {
        format!("{}->{}", self.old.label(), self.new.label())
    }
}

/// Status reported by the runtime control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    Active,
    Creating,
    Updating,
    Failed,
    #[serde(other)]
    Unknown,
}

impl RuntimeStatus {
    /// Only `active` runtimes accept traffic-weight mutation.
    pub fn accepts_traffic(&self) -> bool {
        matches!(self, RuntimeStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeStatus::Active => "active",
            RuntimeStatus::Creating => "creating",
            RuntimeStatus::Updating => "updating",
            RuntimeStatus::Failed => "failed",
            RuntimeStatus::Unknown => "unknown",
        }
    }
}

/// Rollout strategy selector shared by config and plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Weighted stages with a health hold at each stage.
    #[default]
    Canary,
    /// Single jump from 0% to 100%.
    BlueGreen,
}

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
