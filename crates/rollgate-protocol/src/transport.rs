//! The HTTP seam under the protocol client.
//!
//! [`Transport`] is object-safe so tests and adapters can substitute an
//! in-memory fake for [`crate::HyperTransport`].

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;

use rollgate_core::BoxFuture;

use crate::result::{TransportFailure, TransportFailureKind};

/// Outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpCall {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpCall {
    pub fn get(url: &str) -> Self {
        Self {
            method: http::Method::GET,
            url: url.to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// POST with a JSON body and `content-type: application/json`.
    pub fn post_json<T: Serialize>(url: &str, body: &T) -> Result<Self, TransportFailure> {
        let body = serde_json::to_vec(body).map_err(|e| {
            TransportFailure::new(TransportFailureKind::MalformedRequest, e.to_string())
        })?;
        Ok(Self {
            method: http::Method::POST,
            url: url.to_string(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from(body),
        })
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Streaming response body.
pub trait ReplyBody: Send {
    /// Next data chunk; `None` at end of body.
    fn next_chunk(&mut self) -> BoxFuture<'_, Option<Result<Bytes, TransportFailure>>>;
}

/// Response status line, content type, and body stream.
pub struct HttpReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Box<dyn ReplyBody>,
}

impl std::fmt::Debug for HttpReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReply")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl HttpReply {
    /// Reply whose body is already in memory, delivered as the given chunks.
    pub fn buffered(status: u16, content_type: Option<&str>, chunks: Vec<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: Box::new(BufferedBody {
                chunks: chunks.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_event_stream(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.trim_start().starts_with("text/event-stream"))
    }

    /// Drain the body into one buffer.
    pub async fn bytes(self) -> Result<Bytes, TransportFailure> {
        let mut body = self.body;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next_chunk().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Drain and decode the body as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, TransportFailure> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| TransportFailure::new(TransportFailureKind::Decode, e.to_string()))
    }
}

/// In-memory body.
pub struct BufferedBody {
    chunks: VecDeque<Bytes>,
}

impl ReplyBody for BufferedBody {
    fn next_chunk(&mut self) -> BoxFuture<'_, Option<Result<Bytes, TransportFailure>>> {
        let next = self.chunks.pop_front().map(Ok);
        Box::pin(async move { next })
    }
}

/// Sends one HTTP request and returns the reply head with a body stream.
pub trait Transport: Send + Sync {
    fn send(&self, call: HttpCall) -> BoxFuture<'_, Result<HttpReply, TransportFailure>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, call: HttpCall) -> BoxFuture<'_, Result<HttpReply, TransportFailure>> {
        (**self).send(call)
    }
}
