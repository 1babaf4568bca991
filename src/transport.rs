//! HTTP transport for encoded RPC bodies.
//!
//! ARCHITECTURE
//! ============
//! The client only needs "POST these bytes, give me the body back". That
//! contract is the [`Transport`] trait so the envelope and session logic can
//! be tested without a socket.
//!
//! TRADE-OFFS
//! ==========
//! `HttpTransport` builds a fresh `reqwest::Client` for every call with idle
//! pooling turned off, and asks the daemon to close each connection after
//! replying. The daemon drops idle connections without notice, and
//! a reused stale socket fails the next call; paying one handshake per call
//! avoids that.

use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_CHARSET, CONNECTION, CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::config::{ClientConfig, TlsVerification};
use crate::error::RpcError;

pub const MSGPACK_MEDIA_TYPE: &str = "binary/message-pack";
pub const CHARSET: &str = "UTF-8";

// =============================================================================
// TRANSPORT TRAIT
// =============================================================================

/// One request/response exchange with the daemon.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `url` and return the full response body.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] for connection, TLS and I/O failures
    /// and [`RpcError::Status`] for a non-success status with an empty body.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, RpcError>;
}

// =============================================================================
// HTTP TRANSPORT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransport {
    tls_verify: TlsVerification,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            tls_verify: config.tls_verify,
            request_timeout: config.request_timeout,
            connect_timeout: config.connect_timeout,
        }
    }

    fn build_client(&self) -> Result<reqwest::Client, RpcError> {
        let mut builder = reqwest::Client::builder()
            .default_headers(msgpack_headers())
            .pool_max_idle_per_host(0)
            .danger_accept_invalid_certs(self.tls_verify == TlsVerification::Disabled);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        builder.build().map_err(|e| RpcError::HttpClientBuild(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let http = self.build_client()?;

        let response = http
            .post(url)
            .body(body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if !status.is_success() && bytes.is_empty() {
            return Err(RpcError::Status { status: status.as_u16() });
        }
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), len = bytes.len(), "daemon returned error status with body");
        }

        Ok(bytes.to_vec())
    }
}

fn msgpack_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(MSGPACK_MEDIA_TYPE));
    headers.insert(ACCEPT, HeaderValue::from_static(MSGPACK_MEDIA_TYPE));
    headers.insert(ACCEPT_CHARSET, HeaderValue::from_static(CHARSET));
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    headers
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
