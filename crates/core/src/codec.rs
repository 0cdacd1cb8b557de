//! Text-safe encoding for audio chunks embedded in JSON events.
//!
//! Audio is never inspected here; bytes go in and come back out unchanged.

use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encodes an opaque audio chunk as standard, padded base64.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes a chunk produced by [`encode`].
///
/// Fails with [`RelayError::MalformedEncoding`](crate::RelayError::MalformedEncoding)
/// for anything `encode` could not have produced.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text)?)
}
