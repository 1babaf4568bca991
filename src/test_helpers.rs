//! Shared fixtures for unit tests: an in-memory transport, an HTTP mock
//! daemon, and a socket-level daemon that also speaks TLS.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;

use crate::codec;
use crate::error::RpcError;
use crate::transport::Transport;
use crate::value::Value;

/// Encode a `{result, token}` login reply.
pub(crate) fn login_reply(token: &str) -> Vec<u8> {
    codec::encode(&Value::Map(vec![
        ("result".into(), "success".into()),
        ("token".into(), token.into()),
    ]))
    .expect("encode login reply")
}

/// Decode a captured request body back into its envelope elements.
pub(crate) fn envelope_of(body: &[u8]) -> Vec<Value> {
    codec::decode(body).expect("request body is a msgpack array")
}

// =============================================================================
// RecordingTransport
// =============================================================================

type Responder = dyn Fn(&[Value]) -> Result<Vec<u8>, RpcError> + Send + Sync;

/// Transport that records every request and answers from a closure.
pub(crate) struct RecordingTransport {
    requests: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    respond: Box<Responder>,
}

impl RecordingTransport {
    pub(crate) fn new(
        respond: impl Fn(&[Value]) -> Result<Vec<u8>, RpcError> + Send + Sync + 'static,
    ) -> (Self, Arc<Mutex<Vec<(String, Vec<u8>)>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let transport = Self { requests: Arc::clone(&requests), respond: Box::new(respond) };
        (transport, requests)
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let envelope = envelope_of(&body);
        self.requests.lock().unwrap().push((url.to_owned(), body));
        (self.respond)(&envelope)
    }
}

// =============================================================================
// MockDaemon
// =============================================================================

/// A request as seen by [`MockDaemon`].
#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub accept_charset: Option<String>,
    pub body: Vec<u8>,
}

type Reply = (StatusCode, Vec<u8>);

struct MockState {
    requests: Mutex<Vec<CapturedRequest>>,
    respond: Box<dyn Fn(&CapturedRequest) -> Reply + Send + Sync>,
}

/// Plain-HTTP stand-in for `msfrpcd` serving `POST /api` on a loopback port.
pub(crate) struct MockDaemon {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    task: tokio::task::JoinHandle<()>,
}

impl MockDaemon {
    pub(crate) async fn start(respond: impl Fn(&CapturedRequest) -> Reply + Send + Sync + 'static) -> Self {
        let state = Arc::new(MockState { requests: Mutex::new(Vec::new()), respond: Box::new(respond) });
        let app = Router::new().route("/api", post(handle)).with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock daemon");
        let addr = listener.local_addr().expect("local addr");
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock daemon failed");
        });
        Self { addr, state, task }
    }

    pub(crate) fn url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub(crate) fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(State(state): State<Arc<MockState>>, headers: HeaderMap, body: Bytes) -> Reply {
    let text = |name: header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
    let request = CapturedRequest {
        content_type: text(header::CONTENT_TYPE),
        accept: text(header::ACCEPT),
        accept_charset: text(header::ACCEPT_CHARSET),
        body: body.to_vec(),
    };
    let reply = (state.respond)(&request);
    state.requests.lock().unwrap().push(request);
    reply
}

// =============================================================================
// SocketDaemon
// =============================================================================

/// Hand-rolled HTTP/1.1 daemon that counts accepted connections.
///
/// Connections are kept open after each reply, so a client that reuses a
/// socket shows up as fewer accepts than requests.
pub(crate) struct SocketDaemon {
    pub addr: SocketAddr,
    scheme: &'static str,
    accepts: Arc<AtomicUsize>,
    heads: Arc<Mutex<Vec<String>>>,
    task: tokio::task::JoinHandle<()>,
}

impl SocketDaemon {
    /// Plain HTTP, answering every request with `reply`.
    pub(crate) async fn plain(reply: Vec<u8>) -> Self {
        Self::start(reply, None).await
    }

    /// HTTPS with a freshly generated self-signed certificate.
    pub(crate) async fn self_signed(reply: Vec<u8>) -> Self {
        Self::start(reply, Some(self_signed_acceptor())).await
    }

    async fn start(reply: Vec<u8>, tls: Option<tokio_rustls::TlsAcceptor>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind socket daemon");
        let addr = listener.local_addr().expect("local addr");
        let scheme = if tls.is_some() { "https" } else { "http" };
        let accepts = Arc::new(AtomicUsize::new(0));
        let heads = Arc::new(Mutex::new(Vec::new()));
        let reply = Arc::new(reply);

        let task = tokio::spawn({
            let accepts = Arc::clone(&accepts);
            let heads = Arc::clone(&heads);
            async move {
                while let Ok((tcp, _)) = listener.accept().await {
                    accepts.fetch_add(1, Ordering::SeqCst);
                    let (tls, reply, heads) = (tls.clone(), Arc::clone(&reply), Arc::clone(&heads));
                    tokio::spawn(async move {
                        match tls {
                            Some(acceptor) => {
                                if let Ok(stream) = acceptor.accept(tcp).await {
                                    serve_connection(stream, &reply, &heads).await;
                                }
                            }
                            None => serve_connection(tcp, &reply, &heads).await,
                        }
                    });
                }
            }
        });
        Self { addr, scheme, accepts, heads, task }
    }

    pub(crate) fn url(&self) -> String {
        format!("{}://{}/api", self.scheme, self.addr)
    }

    pub(crate) fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    /// Request heads (request line plus headers) in arrival order.
    pub(crate) fn request_heads(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }
}

impl Drop for SocketDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection<S>(mut stream: S, reply: &[u8], heads: &Mutex<Vec<String>>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;

    let mut buf = Vec::new();
    loop {
        let head_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos;
            }
            if !read_more(&mut stream, &mut buf).await {
                return;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
        let request_len = head_end + 4 + content_length(&head);
        while buf.len() < request_len {
            if !read_more(&mut stream, &mut buf).await {
                return;
            }
        }
        buf.drain(..request_len);
        heads.lock().unwrap().push(head);

        let status = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: binary/message-pack\r\ncontent-length: {}\r\n\r\n",
            reply.len()
        );
        if stream.write_all(status.as_bytes()).await.is_err() || stream.write_all(reply).await.is_err() {
            return;
        }
        if stream.flush().await.is_err() {
            return;
        }
    }
}

async fn read_more<S: tokio::io::AsyncRead + Unpin>(stream: &mut S, buf: &mut Vec<u8>) -> bool {
    use tokio::io::AsyncReadExt;

    let mut chunk = [0_u8; 4096];
    match stream.read(&mut chunk).await {
        Ok(0) | Err(_) => false,
        Ok(n) => {
            buf.extend_from_slice(&chunk[..n]);
            true
        }
    }
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

fn self_signed_acceptor() -> tokio_rustls::TlsAcceptor {
    use tokio_rustls::rustls;
    use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_owned(), "127.0.0.1".to_owned()])
            .expect("generate certificate");
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    let config = rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .expect("protocol versions")
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .expect("server certificate");
    tokio_rustls::TlsAcceptor::from(Arc::new(config))
}

/// A loopback port with nothing listening on it.
pub(crate) fn unreachable_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("free port addr").port()
}
