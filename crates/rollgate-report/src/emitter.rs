//! Report emitter.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use rollgate_core::{RuntimeRef, epoch_millis};
use rollgate_rollout::RolloutOutcome;
use rollgate_validate::ValidationReport;

use crate::document::{ReportDocument, ReportResult, Summary};
use crate::notify::{LogSink, NotificationSink, NotifyError};

const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds report documents and forwards their summary to a sink.
#[derive(Clone)]
pub struct Emitter {
    sink: Arc<dyn NotificationSink>,
    timeout: Duration,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new(Arc::new(LogSink))
    }
}

impl Emitter {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Document a finished rollout and notify. A failed notification is
    /// logged; it never changes the document.
    pub async fn emit(&self, outcome: &RolloutOutcome) -> ReportResult<ReportDocument> {
        let doc = ReportDocument::from_outcome(outcome, epoch_millis())?;
        self.deliver(&doc.summary()).await;
        Ok(doc)
    }

    /// Same as [`Emitter::emit`] for a standalone validation run.
    pub async fn emit_validation(
        &self,
        runtime: &RuntimeRef,
        report: &ValidationReport,
    ) -> ReportResult<ReportDocument> {
        let doc = ReportDocument::from_validation(runtime, report, epoch_millis())?;
        self.deliver(&doc.summary()).await;
        Ok(doc)
    }

    async fn deliver(&self, summary: &Summary) {
        let sent = match tokio::time::timeout(self.timeout, self.sink.notify(summary)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.timeout)),
        };
        match sent {
            Ok(()) => debug!(subject = %summary.subject, "notification sent"),
            Err(e) => warn!(subject = %summary.subject, error = %e, "notification failed; continuing"),
        }
    }
}
