//! JSON codec for Relay payloads.
//!
//! Every frame on the wire is a single JSON document carried in a text frame.
//! There is no length prefix; the WebSocket frame boundary is the message boundary.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Default maximum payload size accepted by the decoder (64 KiB).
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload exceeds maximum size.
    #[error("Payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Payload was empty.
    #[error("Empty payload")]
    Empty,

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a value as a JSON payload.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, ProtocolError> {
    let data = serde_json::to_vec(value)?;
    Ok(Bytes::from(data))
}

/// Decode a JSON payload of at most `MAX_PAYLOAD_SIZE` bytes.
///
/// # Errors
///
/// Returns an error if the payload is empty, too large, or not valid JSON
/// for the requested type.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    decode_with_limit(data, MAX_PAYLOAD_SIZE)
}

/// Decode a JSON payload of at most `max` bytes.
///
/// # Errors
///
/// Returns an error if the payload is empty, larger than `max`, or not
/// valid JSON for the requested type.
pub fn decode_with_limit<T: DeserializeOwned>(data: &[u8], max: usize) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::Empty);
    }
    if data.len() > max {
        return Err(ProtocolError::PayloadTooLarge {
            size: data.len(),
            max,
        });
    }

    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_decode_empty() {
        assert!(matches!(decode::<Value>(b""), Err(ProtocolError::Empty)));
    }

    #[test]
    fn test_decode_too_large() {
        let data = vec![b' '; MAX_PAYLOAD_SIZE + 1];
        assert!(matches!(
            decode::<Value>(&data),
            Err(ProtocolError::PayloadTooLarge { max: MAX_PAYLOAD_SIZE, .. })
        ));
    }

    #[test]
    fn test_decode_with_raised_limit() {
        let mut data = vec![b' '; MAX_PAYLOAD_SIZE + 1];
        data[0] = b'1';
        let value: Value = decode_with_limit(&data, 2 * MAX_PAYLOAD_SIZE).unwrap();
        assert_eq!(value, 1);

        assert!(matches!(
            decode_with_limit::<Value>(b"[1, 2]", 4),
            Err(ProtocolError::PayloadTooLarge { size: 6, max: 4 })
        ));
    }

    #[test]
    fn test_decode_invalid_json() {
        assert!(matches!(
            decode::<Value>(b"not json"),
            Err(ProtocolError::Json(_))
        ));
    }
}
