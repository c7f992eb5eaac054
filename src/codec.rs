//! Optional wire codec applied at process boundaries.
//!
//! The dispatcher uses a codec, when one is configured, to decode a
//! wire-encoded parameter block in place before driving the chain and to
//! encode the result of a successful call. The dispatch logic itself is
//! agnostic to whether a codec is present.
//!
//! Encoded blocks travel inside a single parameter slot, base64-framed so
//! they stay representable as an ordinary string value.

use base64::prelude::{Engine, BASE64_STANDARD};

use crate::context::Value;
use crate::invoker::InvokeError;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors that can occur while encoding or decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Decode failed: {0}")]
    Decode(String),
}

impl From<CodecError> for InvokeError {
    fn from(e: CodecError) -> Self {
        InvokeError::Codec(e.to_string())
    }
}

/// Byte-level marshaling for parameters and return values.
pub trait WireCodec: Send + Sync {
    /// Encode one value to bytes.
    fn encode(&self, value: &Value) -> Result<Vec<u8>>;

    /// Decode a parameter block back into an ordered argument list.
    fn decode_parameters(&self, bytes: &[u8]) -> Result<Vec<Value>>;
}

/// JSON wire codec.
#[derive(Debug, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl WireCodec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_parameters(&self, bytes: &[u8]) -> Result<Vec<Value>> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Frame encoded bytes as a single parameter slot value.
pub fn to_wire_block(bytes: &[u8]) -> Value {
    Value::String(BASE64_STANDARD.encode(bytes))
}

/// Recover encoded bytes from a parameter slot value.
pub fn from_wire_block(value: &Value) -> Result<Vec<u8>> {
    let framed = value
        .as_str()
        .ok_or_else(|| CodecError::Decode("parameter block is not a string".into()))?;
    BASE64_STANDARD
        .decode(framed)
        .map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_parameters_round_trip() {
        let codec = JsonCodec::new();
        let params = vec![Value::from(1), Value::from("two")];

        let bytes = codec.encode(&Value::Array(params.clone())).unwrap();
        let decoded = codec.decode_parameters(&bytes).unwrap();

        assert_eq!(decoded, params);
    }

    #[test]
    fn test_wire_block_framing() {
        let bytes = b"{\"n\":7}";
        let block = to_wire_block(bytes);
        assert_eq!(from_wire_block(&block).unwrap(), bytes);
    }

    #[test]
    fn test_non_string_block_rejected() {
        assert!(from_wire_block(&Value::from(12)).is_err());
    }

    #[test]
    fn test_malformed_parameters_rejected() {
        let codec = JsonCodec::new();
        assert!(codec.decode_parameters(b"not json").is_err());
    }
}
