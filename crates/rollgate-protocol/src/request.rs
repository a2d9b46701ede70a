//! Invocation requests and session identifiers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Endpoints reject session identifiers shorter than this many characters.
pub const MIN_SESSION_ID_LEN: usize = 33;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fresh 64-character hex session identifier.
pub fn generate_session_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(SESSION_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hex::encode(hasher.finalize())
}

/// One operation to run against a runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub method: String,
    pub params: Map<String, Value>,
    pub session_id: String,
    /// Deadline for each attempt. Retries each get a fresh one, so one
    /// `invoke` can run for several times this.
    pub timeout: Duration,
    /// Send without credentials.
    pub anonymous: bool,
}

impl InvocationRequest {
    pub fn new(method: &str, session_id: &str, timeout: Duration) -> Self {
        Self {
            method: method.to_string(),
            params: Map::new(),
            session_id: session_id.to_string(),
            timeout,
            anonymous: false,
        }
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }
}
