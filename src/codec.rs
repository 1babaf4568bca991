//! MessagePack codec for request and response bodies.
//!
//! Thin wrapper over `rmp-serde`. Requests are always positional arrays, so
//! structs are written in compact (array) form; decoding accepts both the map
//! and array forms the daemon may send.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error returned by [`encode`] and [`decode`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value could not be written as MessagePack.
    #[error("failed to encode msgpack: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    /// The bytes were malformed or did not match the target shape.
    #[error("failed to decode msgpack: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encode a value into MessagePack bytes.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the value graph contains something the
/// format cannot represent.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec(value)?)
}

/// Decode MessagePack bytes into `T`.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes or a shape mismatch.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Decode into an existing target.
///
/// On failure `target` is left exactly as it was.
///
/// # Errors
///
/// Same as [`decode`].
pub fn decode_into<T: DeserializeOwned>(bytes: &[u8], target: &mut T) -> Result<(), CodecError> {
    *target = decode(bytes)?;
    Ok(())
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod tests;
