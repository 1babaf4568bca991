//! Client configuration.
//!
//! Connection parameters are fixed at construction. The two trust decisions
//! the daemon forces on clients, certificate verification and tolerance of
//! undecodable responses, are explicit settings here rather than hidden
//! defaults inside the transport.

use std::time::Duration;

use crate::error::RpcError;

pub const DEFAULT_URI: &str = "/api";

/// Whether the daemon's TLS certificate is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsVerification {
    /// Accept any certificate. INSECURE: exposes the session to interception.
    /// This is the default because `msfrpcd` ships with a self-signed
    /// certificate.
    #[default]
    Disabled,
    /// Verify the certificate chain and host name.
    Enabled,
}

/// What to do when a response does not decode into the requested type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeErrors {
    /// Return [`RpcError::Decode`].
    #[default]
    Surface,
    /// Swallow the error and hand back the type's default value.
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub uri: String,
    pub username: String,
    pub password: String,
    pub ssl: bool,
    pub tls_verify: TlsVerification,
    pub decode_errors: DecodeErrors,
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Build a config from the required connection parameters.
    ///
    /// Certificate verification is off, decode errors are surfaced, and no
    /// timeouts are set.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        uri: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        ssl: bool,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            uri: uri.into(),
            username: username.into(),
            password: password.into(),
            ssl,
            tls_verify: TlsVerification::default(),
            decode_errors: DecodeErrors::default(),
            request_timeout: None,
            connect_timeout: None,
        }
    }

    #[must_use]
    pub fn with_tls_verification(mut self, tls_verify: TlsVerification) -> Self {
        self.tls_verify = tls_verify;
        self
    }

    #[must_use]
    pub fn with_decode_errors(mut self, decode_errors: DecodeErrors) -> Self {
        self.decode_errors = decode_errors;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Endpoint URL. Host, port and path are joined verbatim.
    #[must_use]
    pub fn endpoint(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.uri)
    }

    /// Build config from environment variables.
    ///
    /// Required:
    /// - `MSFRPC_HOST`, `MSFRPC_PORT`, `MSFRPC_USER`, `MSFRPC_PASS`
    ///
    /// Optional:
    /// - `MSFRPC_URI`: default `/api`
    /// - `MSFRPC_SSL`: default `true`
    /// - `MSFRPC_TLS_VERIFY`: default `false`
    /// - `MSFRPC_IGNORE_DECODE_ERRORS`: default `false`
    /// - `MSFRPC_REQUEST_TIMEOUT_SECS`, `MSFRPC_CONNECT_TIMEOUT_SECS`: unset means no deadline
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Config`] when a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self, RpcError> {
        let host = required("MSFRPC_HOST")?;
        let port = required("MSFRPC_PORT")?
            .parse::<u16>()
            .map_err(|e| RpcError::Config(format!("MSFRPC_PORT: {e}")))?;
        let username = required("MSFRPC_USER")?;
        let password = required("MSFRPC_PASS")?;
        let uri = std::env::var("MSFRPC_URI").unwrap_or_else(|_| DEFAULT_URI.to_string());
        let ssl = env_flag("MSFRPC_SSL", true)?;

        let mut config = Self::new(host, port, uri, username, password, ssl);
        if env_flag("MSFRPC_TLS_VERIFY", false)? {
            config.tls_verify = TlsVerification::Enabled;
        }
        if env_flag("MSFRPC_IGNORE_DECODE_ERRORS", false)? {
            config.decode_errors = DecodeErrors::Ignore;
        }
        config.request_timeout = env_secs("MSFRPC_REQUEST_TIMEOUT_SECS")?;
        config.connect_timeout = env_secs("MSFRPC_CONNECT_TIMEOUT_SECS")?;
        Ok(config)
    }
}

fn required(key: &str) -> Result<String, RpcError> {
    std::env::var(key).map_err(|_| RpcError::Config(format!("{key} not set")))
}

fn env_flag(key: &str, default: bool) -> Result<bool, RpcError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => parse_flag(&raw).ok_or_else(|| RpcError::Config(format!("{key}: expected a boolean, got '{raw}'"))),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_secs(key: &str) -> Result<Option<Duration>, RpcError> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    raw.parse::<u64>()
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|e| RpcError::Config(format!("{key}: {e}")))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
