use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use rollgate_core::{BoxFuture, RuntimeRef, epoch_millis};
use rollgate_health::{HealthSample, MetricError, MetricResult, MetricStore};
use rollgate_protocol::{HttpCall, Transport, TransportFailureKind};

use super::{authorized, runtime_url};

pub struct HttpMetricStore {
    transport: Arc<dyn Transport>,
    base_url: String,
    bearer_token: Option<String>,
}

#[derive(Deserialize)]
struct HealthBody {
    error_rate: f64,
    p99_latency_ms: f64,
    #[serde(default)]
    request_count: u64,
    timestamp_ms: Option<u64>,
}

impl HttpMetricStore {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, bearer_token: Option<String>) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
        }
    }
}

impl MetricStore for HttpMetricStore {
    fn sample<'a>(
        &'a self,
        runtime: &'a RuntimeRef,
        window: Duration,
    ) -> BoxFuture<'a, MetricResult<HealthSample>> {
        Box::pin(async move {
            let suffix = format!("/health?window_secs={}", window.as_secs().max(1));
            let url = runtime_url(&self.base_url, runtime, &suffix);
            let call = authorized(HttpCall::get(&url), self.bearer_token.as_deref());

            let reply = self
                .transport
                .send(call)
                .await
                .map_err(|e| MetricError::Unavailable(e.to_string()))?;
            if !reply.is_success() {
                return Err(MetricError::Unavailable(format!("status {}", reply.status)));
            }
            let body: HealthBody = reply.json().await.map_err(|e| match e.kind {
                TransportFailureKind::Decode => MetricError::Invalid(e.to_string()),
                _ => MetricError::Unavailable(e.to_string()),
            })?;
            Ok(HealthSample::new(
                body.timestamp_ms.unwrap_or_else(epoch_millis),
                body.error_rate,
                body.p99_latency_ms,
                body.request_count,
            ))
        })
    }
}
