//! RPC client: session lifecycle and envelope construction.
//!
//! ARCHITECTURE
//! ============
//! Every request body is a MessagePack array `[method, token, ...args]`. The
//! token slot is omitted only for `auth.login`, the call that obtains it. The
//! client never looks inside responses except for the login reply; callers
//! decode everything else.
//!
//! CONCURRENCY
//! ===========
//! The session sits behind a `RwLock`. `call` copies the token out while
//! building the envelope and `login` writes only after its round trip
//! completes, so the lock is never held across an `.await`. Concurrent calls
//! racing a login see either the old or the new token, never a torn one.

use std::sync::{PoisonError, RwLock};

use serde::de::DeserializeOwned;

use crate::codec::{self, CodecError};
use crate::config::{ClientConfig, DecodeErrors};
use crate::error::RpcError;
use crate::transport::{HttpTransport, Transport};
use crate::value::{Fault, Value};

/// Method that exchanges credentials for a token.
pub const LOGIN_METHOD: &str = "auth.login";

// =============================================================================
// SESSION
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Session {
    auth_token: Option<String>,
    connected: bool,
    rejection: Option<Fault>,
}

/// Reply to `auth.login`. Missing fields decode as empty strings.
///
/// A rejected login carries the daemon's error fields instead of a token.
#[derive(Debug, Default, serde::Deserialize)]
struct LoginResponse {
    #[serde(default)]
    result: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    error_class: String,
    #[serde(default)]
    error_message: String,
    #[serde(default)]
    error_code: Option<i64>,
}

impl LoginResponse {
    fn fault(&self) -> Option<Fault> {
        self.error.then(|| Fault {
            class: self.error_class.clone(),
            message: self.error_message.clone(),
            code: self.error_code,
        })
    }
}

// =============================================================================
// RAW RESPONSE
// =============================================================================

/// Undecoded response body as returned by the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse(Vec<u8>);

impl RawResponse {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    /// Decode the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the body is not valid MessagePack of
    /// the expected shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        codec::decode(&self.0)
    }

    /// Decode the body into a generic [`Value`].
    ///
    /// # Errors
    ///
    /// Same as [`RawResponse::decode`].
    pub fn to_value(&self) -> Result<Value, CodecError> {
        self.decode()
    }
}

impl From<Vec<u8>> for RawResponse {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// Build the positional request array for `method`.
///
/// The token follows the method name for everything except `auth.login`;
/// an absent token is sent as the empty string.
#[must_use]
pub fn build_envelope(method: &str, token: Option<&str>, args: &[Value]) -> Vec<Value> {
    let mut envelope = Vec::with_capacity(args.len() + 2);
    envelope.push(Value::from(method));
    if method != LOGIN_METHOD {
        envelope.push(Value::from(token.unwrap_or_default()));
    }
    envelope.extend_from_slice(args);
    envelope
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct RpcClient {
    config: ClientConfig,
    endpoint: String,
    transport: Box<dyn Transport>,
    session: RwLock<Session>,
}

impl RpcClient {
    /// Create an unauthenticated client speaking HTTP(S) to the daemon.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let transport = HttpTransport::new(&config);
        Self::with_transport(config, transport)
    }

    /// Create an unauthenticated client over a custom transport.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        let endpoint = config.endpoint();
        Self { config, endpoint, transport: Box::new(transport), session: RwLock::new(Session::default()) }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Token from the most recent login, if any.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).auth_token.clone()
    }

    /// Whether the most recent login produced a token.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.read().unwrap_or_else(PoisonError::into_inner).connected
    }

    /// Error the daemon sent in place of a token on the most recent login.
    #[must_use]
    pub fn login_fault(&self) -> Option<Fault> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).rejection.clone()
    }

    /// Exchange the configured credentials for a session token.
    ///
    /// With [`DecodeErrors::Ignore`] the stored token is replaced even when the
    /// call or the decode fails, leaving it empty. With
    /// [`DecodeErrors::Surface`] the session is only touched on success.
    ///
    /// # Errors
    ///
    /// Returns the transport or encode error from the call, and under
    /// [`DecodeErrors::Surface`] also [`RpcError::Decode`].
    pub async fn login(&self) -> Result<(), RpcError> {
        let args = [Value::from(self.config.username.as_str()), Value::from(self.config.password.as_str())];
        let outcome = self.call_and_decode::<LoginResponse>(LOGIN_METHOD, &args).await;

        let reply = match (outcome, self.config.decode_errors) {
            (Ok(reply), _) => reply,
            (Err(e), DecodeErrors::Ignore) => {
                self.store_token(String::new(), None);
                return Err(e);
            }
            (Err(e), DecodeErrors::Surface) => return Err(e),
        };

        let rejection = reply.fault();
        if let Some(fault) = &rejection {
            tracing::warn!(%fault, "daemon rejected login");
        } else if reply.token.is_empty() {
            tracing::warn!(result = %reply.result, "login reply carried no token");
        } else {
            tracing::info!(host = %self.config.host, "authenticated with daemon");
        }
        self.store_token(reply.token, rejection);
        Ok(())
    }

    /// Invoke `method` with positional `args` and return the undecoded body.
    ///
    /// Daemon-side failures (bad token, unknown method) come back as a normal
    /// body; see [`Value::fault`].
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Encode`] if the envelope cannot be serialized, and
    /// transport errors from the exchange.
    pub async fn call(&self, method: &str, args: &[Value]) -> Result<RawResponse, RpcError> {
        let token = self.token();
        let envelope = build_envelope(method, token.as_deref(), args);
        let body = codec::encode(&envelope).map_err(RpcError::Encode)?;

        tracing::debug!(%method, args = args.len(), bytes = body.len(), "rpc call");
        let reply = self.transport.post(&self.endpoint, body).await?;
        tracing::debug!(%method, bytes = reply.len(), "rpc reply");

        Ok(RawResponse(reply))
    }

    /// [`RpcClient::call`] followed by a decode into `T`.
    ///
    /// Under [`DecodeErrors::Ignore`] an undecodable body yields `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns any error from [`RpcClient::call`], and under
    /// [`DecodeErrors::Surface`] also [`RpcError::Decode`].
    pub async fn call_and_decode<T: DeserializeOwned + Default>(&self, method: &str, args: &[Value]) -> Result<T, RpcError> {
        let raw = self.call(method, args).await?;
        let mut target = T::default();
        if let Err(e) = codec::decode_into(raw.as_bytes(), &mut target) {
            match self.config.decode_errors {
                DecodeErrors::Surface => return Err(RpcError::Decode(e)),
                DecodeErrors::Ignore => tracing::warn!(%method, error = %e, "ignoring undecodable response"),
            }
        }
        Ok(target)
    }

    fn store_token(&self, token: String, rejection: Option<Fault>) {
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        session.connected = !token.is_empty();
        session.auth_token = Some(token);
        session.rejection = rejection;
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
