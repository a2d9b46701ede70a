//! Invocation outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use rollgate_core::FailureKind;

use crate::envelope;

/// Tagged outcome of one `invoke`. Never both a payload and an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvocationResult {
    Success {
        payload: Value,
    },
    ProtocolError {
        kind: ProtocolErrorKind,
        /// JSON-RPC error code; `None` for caller-side rejections.
        code: Option<i64>,
        message: String,
    },
    TransportError {
        kind: TransportFailureKind,
        message: String,
    },
}

/// Logical failure reported by (or on behalf of) the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolErrorKind {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    Internal,
    Unauthorized,
    /// Rejected before sending: session identifier below the minimum length.
    SessionTooShort,
    Other,
}

impl ProtocolErrorKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            envelope::PARSE_ERROR => Self::ParseError,
            envelope::INVALID_REQUEST => Self::InvalidRequest,
            envelope::METHOD_NOT_FOUND => Self::MethodNotFound,
            envelope::INVALID_PARAMS => Self::InvalidParams,
            envelope::INTERNAL_ERROR => Self::Internal,
            envelope::UNAUTHORIZED => Self::Unauthorized,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportFailureKind {
    Timeout,
    Connect,
    /// HTTP 401/403.
    Unauthorized,
    /// HTTP 404.
    NotFound,
    /// HTTP 406; the endpoint rejected the declared `accept` set.
    NotAcceptable,
    /// HTTP 400/422 without a JSON-RPC error body, or an unbuildable request.
    MalformedRequest,
    /// HTTP 5xx.
    Server,
    /// Streamed body ended or broke without a matching reply.
    Stream,
    /// Single JSON body that is not a usable JSON-RPC reply.
    Decode,
    UnexpectedStatus,
}

impl TransportFailureKind {
    /// Transient kinds are retried by the client; the rest are definitive.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connect | Self::Server | Self::Stream | Self::Decode
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not found",
            Self::NotAcceptable => "not acceptable",
            Self::MalformedRequest => "malformed request",
            Self::Server => "server error",
            Self::Stream => "stream",
            Self::Decode => "decode",
            Self::UnexpectedStatus => "unexpected status",
        }
    }
}

impl std::fmt::Display for TransportFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TransportFailure {
    pub kind: TransportFailureKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: TransportFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<TransportFailure> for InvocationResult {
    fn from(f: TransportFailure) -> Self {
        InvocationResult::TransportError {
            kind: f.kind,
            message: f.message,
        }
    }
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Success { payload } => Some(payload),
            _ => None,
        }
    }

    pub fn protocol_kind(&self) -> Option<ProtocolErrorKind> {
        match self {
            Self::ProtocolError { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn transport_kind(&self) -> Option<TransportFailureKind> {
        match self {
            Self::TransportError { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Authorization rejection at either layer.
    pub fn is_unauthorized(&self) -> bool {
        self.protocol_kind() == Some(ProtocolErrorKind::Unauthorized)
            || self.transport_kind() == Some(TransportFailureKind::Unauthorized)
    }

    /// Taxonomy class of a failed outcome; `None` for success.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::ProtocolError {
                kind: ProtocolErrorKind::SessionTooShort,
                ..
            } => Some(FailureKind::Caller),
            Self::ProtocolError { .. } => Some(FailureKind::Protocol),
            Self::TransportError { .. } => Some(FailureKind::Transport),
        }
    }

    /// One-line description used in report reasons.
    pub fn describe(&self) -> String {
        match self {
            Self::Success { .. } => "success".to_string(),
            Self::ProtocolError {
                kind,
                code: Some(code),
                message,
            } => format!("protocol error {kind:?} ({code}): {message}"),
            Self::ProtocolError { kind, message, .. } => {
                format!("protocol error {kind:?}: {message}")
            }
            Self::TransportError { kind, message } => {
                format!("transport error ({kind}): {message}")
            }
        }
    }
}
