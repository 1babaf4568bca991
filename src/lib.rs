//! Client for the Metasploit MessagePack RPC daemon (`msfrpcd`).
//!
//! ```no_run
//! use msfrpc::{ClientConfig, RpcClient, Value};
//!
//! # async fn run() -> Result<(), msfrpc::RpcError> {
//! let client = RpcClient::new(ClientConfig::new("127.0.0.1", 55553, "/api", "msf", "pass", true));
//! client.login().await?;
//! let console: Value = client.call_and_decode("console.create", &[]).await?;
//! println!("{}", console.to_json());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod quote;
pub mod transport;
pub mod value;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use client::{LOGIN_METHOD, RawResponse, RpcClient, build_envelope};
pub use codec::CodecError;
pub use config::{ClientConfig, DecodeErrors, TlsVerification};
pub use error::RpcError;
pub use quote::safe_string;
pub use transport::{HttpTransport, Transport};
pub use value::{Fault, Value};
