//! rollgate-report — turns finished validations and rollouts into
//! machine-readable documents and human summaries.
//!
//! The [`ReportDocument`] is what CI gates on; the [`Summary`] is what a
//! [`NotificationSink`] receives. Notification is best-effort: the
//! [`Emitter`] logs a failed send and still returns the document.

pub mod document;
pub mod emitter;
pub mod format;
pub mod notify;

pub use document::{ReportDocument, ReportError, ReportKind, ReportResult, Summary};
pub use emitter::Emitter;
pub use format::format_report;
pub use notify::{LogSink, NotificationSink, NotifyError};
