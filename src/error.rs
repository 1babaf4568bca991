//! Error taxonomy for RPC calls.

use crate::codec::CodecError;

/// Errors produced by the RPC client.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// A configuration value was missing or could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    /// The request envelope could not be serialized.
    #[error("request encode failed: {0}")]
    Encode(#[source] CodecError),

    /// The response body did not decode into the expected shape.
    #[error("response decode failed: {0}")]
    Decode(#[source] CodecError),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// Connection, TLS or I/O failure during the exchange.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The daemon answered with a non-success status and no body.
    #[error("daemon returned status {status} with empty body")]
    Status { status: u16 },
}

impl RpcError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "E_CONFIG",
            Self::Encode(_) => "E_ENCODE",
            Self::Decode(_) => "E_DECODE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Status { .. } => "E_STATUS",
        }
    }

    /// Whether the same call might succeed if issued again.
    ///
    /// Informational only; the client never retries.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { status: 429 | 500..=599 })
    }
}
