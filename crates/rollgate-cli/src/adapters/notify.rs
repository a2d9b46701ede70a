use std::sync::Arc;

use serde::Serialize;

use rollgate_core::BoxFuture;
use rollgate_protocol::{HttpCall, Transport};
use rollgate_report::{NotificationSink, NotifyError, Summary};

use super::authorized;

/// Posts `{"text": ..., "summary": {...}}` to a webhook.
pub struct HttpNotifySink {
    transport: Arc<dyn Transport>,
    url: String,
    bearer_token: Option<String>,
}

#[derive(Serialize)]
struct NotifyBody<'a> {
    text: String,
    summary: &'a Summary,
}

impl HttpNotifySink {
    pub fn new(transport: Arc<dyn Transport>, url: &str, bearer_token: Option<String>) -> Self {
        Self {
            transport,
            url: url.to_string(),
            bearer_token,
        }
    }
}

impl NotificationSink for HttpNotifySink {
    fn notify<'a>(&'a self, summary: &'a Summary) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            let body = NotifyBody {
                text: summary.to_string(),
                summary,
            };
            let call = HttpCall::post_json(&self.url, &body)
                .map_err(|e| NotifyError::Rejected(e.to_string()))?;
            let call = authorized(call, self.bearer_token.as_deref());
            let reply = self
                .transport
                .send(call)
                .await
                .map_err(|e| NotifyError::Transport(e.to_string()))?;
            if !reply.is_success() {
                return Err(NotifyError::Rejected(format!("status {}", reply.status)));
            }
            Ok(())
        })
    }
}
