use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use rollgate_core::{BoxFuture, RuntimeRef, RuntimeStatus};
use rollgate_protocol::{HttpCall, HttpReply, Transport, TransportFailure};
use rollgate_rollout::{ControlError, ControlPlane};

use super::{authorized, runtime_url};

pub struct HttpControlPlane {
    transport: Arc<dyn Transport>,
    base_url: String,
    bearer_token: Option<String>,
}

#[derive(Deserialize)]
struct StatusBody {
    status: RuntimeStatus,
}

#[derive(Serialize)]
struct RuntimeBody<'a> {
    endpoint: &'a str,
    qualifier: &'a str,
}

#[derive(Serialize)]
struct TrafficBody<'a> {
    old: RuntimeBody<'a>,
    new: RuntimeBody<'a>,
    new_weight: u8,
    old_weight: u8,
}

impl<'a> From<&'a RuntimeRef> for RuntimeBody<'a> {
    fn from(runtime: &'a RuntimeRef) -> Self {
        Self {
            endpoint: runtime.endpoint(),
            qualifier: runtime.qualifier(),
        }
    }
}

impl HttpControlPlane {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, bearer_token: Option<String>) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
        }
    }

    async fn send(&self, call: HttpCall) -> Result<HttpReply, ControlError> {
        let call = authorized(call, self.bearer_token.as_deref());
        let reply = self.transport.send(call).await.map_err(failure)?;
        match reply.status {
            200..=299 => Ok(reply),
            status @ 500..=599 => Err(ControlError::Transport(format!("status {status}"))),
            status => {
                let body = reply.bytes().await.unwrap_or_default();
                Err(ControlError::Rejected(format!(
                    "status {status}: {}",
                    String::from_utf8_lossy(&body).trim()
                )))
            }
        }
    }
}

/// Retryable transport failures stay retryable; the rest are refusals.
fn failure(e: TransportFailure) -> ControlError {
    if e.is_retryable() {
        ControlError::Transport(e.to_string())
    } else {
        ControlError::Rejected(e.to_string())
    }
}

impl ControlPlane for HttpControlPlane {
    fn describe<'a>(
        &'a self,
        runtime: &'a RuntimeRef,
    ) -> BoxFuture<'a, Result<RuntimeStatus, ControlError>> {
        Box::pin(async move {
            let url = runtime_url(&self.base_url, runtime, "/status");
            let reply = self.send(HttpCall::get(&url)).await?;
            let body: StatusBody = reply
                .json()
                .await
                .map_err(|e| ControlError::Transport(e.to_string()))?;
            debug!(runtime = %runtime, status = body.status.as_str(), "runtime status");
            Ok(body.status)
        })
    }

    fn set_traffic_weight<'a>(
        &'a self,
        old: &'a RuntimeRef,
        new: &'a RuntimeRef,
        new_weight: u8,
    ) -> BoxFuture<'a, Result<(), ControlError>> {
        Box::pin(async move {
            let body = TrafficBody {
                old: old.into(),
                new: new.into(),
                new_weight,
                old_weight: 100u8.saturating_sub(new_weight),
            };
            let call = HttpCall::post_json(&format!("{}/traffic", self.base_url), &body)
                .map_err(|e| ControlError::Rejected(e.to_string()))?;
            self.send(call).await?;
            Ok(())
        })
    }
}
