//! rollgate-protocol — the client side of the tool-serving wire protocol.
//!
//! Requests are JSON-RPC 2.0 envelopes POSTed to the runtime's invocation
//! URL. The endpoint may answer with a single JSON body or with a
//! `text/event-stream` body carrying one JSON-RPC reply per event; the
//! client accepts both and reduces either to one [`InvocationResult`].
//!
//! # Architecture
//!
//! ```text
//! ProtocolClient::invoke(endpoint, request)
//!   ├── session id length check (no network call on failure)
//!   ├── RetryPolicy (transient transport failures only)
//!   │   └── Transport::send(HttpCall) → HttpReply
//!   │         └── HyperTransport (http1 over TCP or rustls)
//!   └── reply decoding
//!       ├── application/json → JsonRpcResponse
//!       └── text/event-stream → SseDecoder → first reply matching id
//! ```

pub mod client;
pub mod endpoint;
pub mod envelope;
pub mod http;
pub mod request;
pub mod result;
pub mod sse;
pub mod transport;

pub use client::{ClientOptions, ProtocolClient};
pub use endpoint::Endpoint;
pub use envelope::{JsonRpcRequest, JsonRpcResponse, RpcError};
pub use http::{HyperTransport, TlsConfig};
pub use request::{generate_session_id, InvocationRequest, MIN_SESSION_ID_LEN};
pub use result::{InvocationResult, ProtocolErrorKind, TransportFailure, TransportFailureKind};
pub use sse::{SseDecoder, SseEvent};
pub use transport::{BufferedBody, HttpCall, HttpReply, ReplyBody, Transport};
