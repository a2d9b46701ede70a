//! Notification sinks.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use rollgate_core::BoxFuture;

use crate::document::Summary;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotifyError {
    #[error("notification sink unreachable: {0}")]
    Transport(String),

    #[error("notification timed out after {0:?}")]
    Timeout(Duration),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Receives one summary per finished run. Fire-and-forget from the
/// caller's point of view.
pub trait NotificationSink: Send + Sync {
    fn notify<'a>(&'a self, summary: &'a Summary) -> BoxFuture<'a, Result<(), NotifyError>>;
}

/// Writes the summary to the log. Used when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify<'a>(&'a self, summary: &'a Summary) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            if summary.passed {
                info!(outcome = %summary.outcome, "{summary}");
            } else {
                warn!(outcome = %summary.outcome, failure = ?summary.failure, "{summary}");
            }
            Ok(())
        })
    }
}
