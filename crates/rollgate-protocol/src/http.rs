//! hyper-backed [`Transport`] for `http://` and `https://` URLs.
//!
//! One HTTP/1.1 connection per call, driven on a spawned task. TLS goes
//! through rustls with the Mozilla root store.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;

use rollgate_core::BoxFuture;

use crate::result::{TransportFailure, TransportFailureKind};
use crate::transport::{HttpCall, HttpReply, ReplyBody, Transport};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// rustls client configuration.
#[derive(Clone)]
pub struct TlsConfig {
    pub client_config: Arc<rustls::ClientConfig>,
}

impl TlsConfig {
    /// Mozilla root certificate store, ring provider.
    pub fn with_webpki_roots() -> Result<Self, String> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("tls protocol version error: {e}"))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self {
            client_config: Arc::new(config),
        })
    }
}

impl From<Arc<rustls::ClientConfig>> for TlsConfig {
    fn from(client_config: Arc<rustls::ClientConfig>) -> Self {
        Self { client_config }
    }
}

#[derive(Clone)]
pub struct HyperTransport {
    tls: TlsConfig,
    connect_timeout: Duration,
}

impl HyperTransport {
    pub fn new() -> Result<Self, String> {
        Ok(Self::with_tls(TlsConfig::with_webpki_roots()?))
    }

    pub fn with_tls(tls: TlsConfig) -> Self {
        Self {
            tls,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn execute(&self, call: HttpCall) -> Result<HttpReply, TransportFailure> {
        let malformed =
            |msg: String| TransportFailure::new(TransportFailureKind::MalformedRequest, msg);

        let uri: http::Uri = call
            .url
            .parse()
            .map_err(|e| malformed(format!("invalid url {}: {e}", call.url)))?;
        let scheme = uri.scheme_str().unwrap_or("http").to_string();
        if scheme != "http" && scheme != "https" {
            return Err(malformed(format!("unsupported scheme '{scheme}'")));
        }
        let host = uri
            .host()
            .ok_or_else(|| malformed(format!("url has no host: {}", call.url)))?
            .to_string();
        let default_port = if scheme == "https" { 443 } else { 80 };
        let port = uri.port_u16().unwrap_or(default_port);
        let authority = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_else(|| host.clone());
        let path = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let mut builder = http::Request::builder()
            .method(call.method.clone())
            .uri(path)
            .header(http::header::HOST, authority)
            .header(http::header::USER_AGENT, concat!("rollgate/", env!("CARGO_PKG_VERSION")));
        for (name, value) in &call.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let req = builder
            .body(Full::new(call.body.clone()))
            .map_err(|e| malformed(format!("building request: {e}")))?;

        let addr = format!("{host}:{port}");
        let tcp = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                TransportFailure::new(
                    TransportFailureKind::Timeout,
                    format!("connect to {addr} timed out"),
                )
            })?
            .map_err(|e| {
                TransportFailure::new(TransportFailureKind::Connect, format!("{addr}: {e}"))
            })?;
        let _ = tcp.set_nodelay(true);

        if scheme == "http" {
            send_over(TokioIo::new(tcp), req, &call.url).await
        } else {
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|e| malformed(format!("invalid tls server name '{host}': {e}")))?;
            let connector = tokio_rustls::TlsConnector::from(Arc::clone(&self.tls.client_config));
            let tls = connector.connect(server_name, tcp).await.map_err(|e| {
                TransportFailure::new(
                    TransportFailureKind::Connect,
                    format!("tls handshake with {addr}: {e}"),
                )
            })?;
            send_over(TokioIo::new(tls), req, &call.url).await
        }
    }
}

impl Transport for HyperTransport {
    fn send(&self, call: HttpCall) -> BoxFuture<'_, Result<HttpReply, TransportFailure>> {
        Box::pin(self.execute(call))
    }
}

async fn send_over<I>(
    io: I,
    req: http::Request<Full<Bytes>>,
    url: &str,
) -> Result<HttpReply, TransportFailure>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let connect = |e: hyper::Error| TransportFailure::new(TransportFailureKind::Connect, e.to_string());

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(connect)?;

    let url_owned = url.to_string();
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, url = %url_owned, "connection closed with error");
        }
    });

    let resp = sender.send_request(req).await.map_err(connect)?;
    let status = resp.status().as_u16();
    let content_type = resp
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    debug!(%url, status, content_type = ?content_type, "http reply");

    Ok(HttpReply {
        status,
        content_type,
        body: Box::new(IncomingBody {
            body: resp.into_body(),
        }),
    })
}

struct IncomingBody {
    body: hyper::body::Incoming,
}

impl ReplyBody for IncomingBody {
    fn next_chunk(&mut self) -> BoxFuture<'_, Option<Result<Bytes, TransportFailure>>> {
        Box::pin(async move {
            loop {
                match self.body.frame().await {
                    None => return None,
                    Some(Err(e)) => {
                        return Some(Err(TransportFailure::new(
                            TransportFailureKind::Stream,
                            e.to_string(),
                        )));
                    }
                    Some(Ok(frame)) => {
                        // Trailers carry no data.
                        if let Ok(data) = frame.into_data() {
                            return Some(Ok(data));
                        }
                    }
                }
            }
        })
    }
}
