//! Protocol client: one request in, one [`InvocationResult`] out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, warn};

use rollgate_core::RetryPolicy;
use rollgate_core::config::EndpointSettings;

use crate::endpoint::Endpoint;
use crate::envelope::{JsonRpcRequest, JsonRpcResponse};
use crate::request::{InvocationRequest, MIN_SESSION_ID_LEN};
use crate::result::{InvocationResult, ProtocolErrorKind, TransportFailure, TransportFailureKind};
use crate::sse::{SseDecoder, SseEvent};
use crate::transport::{HttpCall, HttpReply, Transport};

pub const ACCEPT: &str = "application/json, text/event-stream";

/// Headers attached to every call.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub bearer_token: Option<String>,
    /// Header names that carry the session identifier.
    pub session_headers: Vec<String>,
    pub protocol_version: String,
    pub headers: Vec<(String, String)>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            bearer_token: None,
            session_headers: vec!["mcp-session-id".to_string()],
            protocol_version: "2024-11-05".to_string(),
            headers: Vec::new(),
        }
    }
}

impl From<&EndpointSettings> for ClientOptions {
    fn from(settings: &EndpointSettings) -> Self {
        Self {
            bearer_token: settings.bearer_token.clone(),
            session_headers: settings.session_headers.clone(),
            protocol_version: settings.protocol_version.clone(),
            headers: settings.headers.clone(),
        }
    }
}

/// Cheap to clone; clones share the transport and the request id counter.
#[derive(Clone)]
pub struct ProtocolClient {
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    retry: RetryPolicy,
    next_id: Arc<AtomicU64>,
}

impl ProtocolClient {
    pub fn new(transport: Arc<dyn Transport>, options: ClientOptions, retry: RetryPolicy) -> Self {
        Self {
            transport,
            options,
            retry,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Send `request` to `endpoint` and reduce the reply to one outcome.
    ///
    /// Transient transport failures are retried per the client's policy;
    /// protocol errors and definitive HTTP rejections are returned as-is.
    /// A session id below [`MIN_SESSION_ID_LEN`] characters is rejected
    /// without any network call.
    ///
    /// `request.timeout` bounds each attempt. The whole call may take up to
    /// `(retries + 1) * timeout` plus the backoff between attempts.
    pub async fn invoke(&self, endpoint: &Endpoint, request: &InvocationRequest) -> InvocationResult {
        let chars = request.session_id.chars().count();
        if chars < MIN_SESSION_ID_LEN {
            warn!(
                method = %request.method,
                len = chars,
                min = MIN_SESSION_ID_LEN,
                "session id too short; not sending"
            );
            return InvocationResult::ProtocolError {
                kind: ProtocolErrorKind::SessionTooShort,
                code: None,
                message: format!(
                    "session id has {chars} characters, at least {MIN_SESSION_ID_LEN} required"
                ),
            };
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = JsonRpcRequest::new(&request.method, request.params.clone(), id);
        let body = match serde_json::to_vec(&envelope) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                return TransportFailure::new(TransportFailureKind::MalformedRequest, e.to_string())
                    .into();
            }
        };

        let started = Instant::now();
        debug!(method = %request.method, id, url = %endpoint, "invoking");

        let this = self;
        let timeout = request.timeout;
        let outcome = self
            .retry
            .run(
                &request.method,
                move |_attempt| {
                    let call = this.build_call(endpoint, request, body.clone());
                    this.attempt(call, id, timeout)
                },
                TransportFailure::is_retryable,
            )
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(failure) => failure.into(),
        };
        debug!(
            method = %request.method,
            id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = result.is_success(),
            "invocation finished"
        );
        result
    }

    fn build_call(&self, endpoint: &Endpoint, request: &InvocationRequest, body: Bytes) -> HttpCall {
        let mut headers = vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("accept".to_string(), ACCEPT.to_string()),
            (
                "mcp-protocol-version".to_string(),
                self.options.protocol_version.clone(),
            ),
        ];
        for name in &self.options.session_headers {
            headers.push((name.clone(), request.session_id.clone()));
        }
        if !request.anonymous {
            if let Some(token) = &self.options.bearer_token {
                headers.push(("authorization".to_string(), format!("Bearer {token}")));
            }
        }
        headers.extend(self.options.headers.iter().cloned());

        HttpCall {
            method: http::Method::POST,
            url: endpoint.url().to_string(),
            headers,
            body,
        }
    }

    async fn attempt(
        &self,
        call: HttpCall,
        id: u64,
        timeout: Duration,
    ) -> Result<InvocationResult, TransportFailure> {
        match tokio::time::timeout(timeout, self.exchange(call, id)).await {
            Ok(result) => result,
            Err(_) => Err(TransportFailure::new(
                TransportFailureKind::Timeout,
                format!("no reply within {}ms", timeout.as_millis()),
            )),
        }
    }

    async fn exchange(&self, call: HttpCall, id: u64) -> Result<InvocationResult, TransportFailure> {
        let reply = self.transport.send(call).await?;
        let status = reply.status;

        match status {
            200..=299 => {}
            401 | 403 => {
                return Err(status_failure(TransportFailureKind::Unauthorized, reply).await);
            }
            404 => return Err(status_failure(TransportFailureKind::NotFound, reply).await),
            406 => return Err(status_failure(TransportFailureKind::NotAcceptable, reply).await),
            400 | 422 => {
                // Some servers report JSON-RPC errors with a 4xx status.
                let body = reply.bytes().await?;
                if let Ok(resp) = serde_json::from_slice::<JsonRpcResponse>(&body) {
                    if resp.error.is_some() {
                        return resp.into_result();
                    }
                }
                return Err(TransportFailure::new(
                    TransportFailureKind::MalformedRequest,
                    format!("http {status}: {}", snippet(&body)),
                ));
            }
            500..=599 => return Err(status_failure(TransportFailureKind::Server, reply).await),
            _ => return Err(status_failure(TransportFailureKind::UnexpectedStatus, reply).await),
        }

        if reply.is_event_stream() {
            read_event_stream(reply, id).await
        } else {
            let body = reply.bytes().await?;
            let resp: JsonRpcResponse = serde_json::from_slice(&body).map_err(|e| {
                TransportFailure::new(
                    TransportFailureKind::Decode,
                    format!("{e}: {}", snippet(&body)),
                )
            })?;
            if !resp.matches(id) {
                return Err(TransportFailure::new(
                    TransportFailureKind::Decode,
                    format!("reply id {:?} does not match request id {id}", resp.id),
                ));
            }
            resp.into_result()
        }
    }
}

/// First well-formed event answering `id` wins. Malformed events and
/// events for other ids are skipped.
async fn read_event_stream(reply: HttpReply, id: u64) -> Result<InvocationResult, TransportFailure> {
    let mut body = reply.body;
    let mut decoder = SseDecoder::new();
    let mut skipped = 0usize;

    while let Some(chunk) = body.next_chunk().await {
        let chunk = chunk?;
        for event in decoder.push(&chunk) {
            if let Some(result) = match_event(&event, id, &mut skipped) {
                return Ok(result);
            }
        }
    }
    if let Some(event) = decoder.finish() {
        if let Some(result) = match_event(&event, id, &mut skipped) {
            return Ok(result);
        }
    }

    Err(TransportFailure::new(
        TransportFailureKind::Stream,
        format!("stream ended without a reply for id {id} ({skipped} events skipped)"),
    ))
}

fn match_event(event: &SseEvent, id: u64, skipped: &mut usize) -> Option<InvocationResult> {
    let resp = match serde_json::from_str::<JsonRpcResponse>(&event.data) {
        Ok(resp) => resp,
        Err(e) => {
            *skipped += 1;
            debug!(error = %e, "skipping malformed event");
            return None;
        }
    };
    if !resp.matches(id) {
        *skipped += 1;
        debug!(event_id = ?resp.id, id, "skipping event for another request");
        return None;
    }
    match resp.into_result() {
        Ok(result) => Some(result),
        Err(e) => {
            *skipped += 1;
            debug!(error = %e, "skipping unusable reply event");
            None
        }
    }
}

async fn status_failure(kind: TransportFailureKind, reply: HttpReply) -> TransportFailure {
    let status = reply.status;
    let body = reply.bytes().await.unwrap_or_default();
    TransportFailure::new(kind, format!("http {status}: {}", snippet(&body)))
}

fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(200) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
