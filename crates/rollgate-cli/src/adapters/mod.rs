//! HTTP adapters for the collaborator seams.
//!
//! Each adapter speaks a small JSON contract over the same
//! [`Transport`](rollgate_protocol::Transport) the protocol client uses:
//!
//! | Seam | Request | Reply |
//! |---|---|---|
//! | control plane `describe` | `GET {url}/runtimes/{endpoint}/versions/{qualifier}/status` | `{"status": "active"}` |
//! | control plane `set_traffic_weight` | `POST {url}/traffic` | any 2xx |
//! | metric store `sample` | `GET {url}/runtimes/{endpoint}/versions/{qualifier}/health?window_secs=N` | `{"error_rate", "p99_latency_ms", "request_count"}` |
//! | notification sink | `POST {url}` | any 2xx |
//!
//! Path segments are percent-encoded. A configured bearer token is sent
//! as `authorization: Bearer <token>`.

pub mod control_plane;
pub mod metrics;
pub mod notify;

pub use control_plane::HttpControlPlane;
pub use metrics::HttpMetricStore;
pub use notify::HttpNotifySink;

use rollgate_core::RuntimeRef;
use rollgate_protocol::{Endpoint, HttpCall};

/// `{base}/runtimes/{endpoint}/versions/{qualifier}{suffix}`, encoded.
fn runtime_url(base: &str, runtime: &RuntimeRef, suffix: &str) -> String {
    let template = format!(
        "{}/runtimes/{{endpoint_encoded}}/versions/{{qualifier}}{suffix}",
        base.trim_end_matches('/')
    );
    Endpoint::resolve(&template, runtime).url().to_string()
}

fn authorized(call: HttpCall, bearer_token: Option<&str>) -> HttpCall {
    match bearer_token {
        Some(token) => call.header("authorization", &format!("Bearer {token}")),
        None => call,
    }
}
