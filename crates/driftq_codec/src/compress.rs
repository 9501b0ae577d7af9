//! Lossy transfer codec.
//!
//! The codec shrinks payloads before they are handed to a transport by
//! recursively dropping null members, then base64-encoding the compact
//! serialization. The stripping is lossy by design: after a round trip, a
//! field that was explicitly `null` is indistinguishable from one that was
//! never present. Callers that need null-vs-absent semantics must not route
//! payloads through this codec.

use crate::error::{CodecError, CodecResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};

/// The result of compressing a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Compressed {
    /// Base64 encoding of the stripped payload's compact serialization.
    pub encoded: String,
    /// Byte length of the compact serialization before stripping.
    pub original_size: usize,
    /// Byte length of the compact serialization after stripping.
    pub compressed_size: usize,
    /// `compressed_size / original_size`; 1.0 for an empty original.
    pub ratio: f64,
}

/// Compresses a payload for transfer.
///
/// Null object members and null array elements are dropped recursively
/// before encoding.
pub fn compress(value: &Value) -> CodecResult<Compressed> {
    let original = serde_json::to_string(value)
        .map_err(|e| CodecError::invalid_structure(e.to_string()))?;

    let stripped = strip_nulls(value);
    let compact = serde_json::to_string(&stripped)
        .map_err(|e| CodecError::invalid_structure(e.to_string()))?;

    let original_size = original.len();
    let compressed_size = compact.len();
    let ratio = if original_size == 0 {
        1.0
    } else {
        compressed_size as f64 / original_size as f64
    };

    Ok(Compressed {
        encoded: STANDARD.encode(compact.as_bytes()),
        original_size,
        compressed_size,
        ratio,
    })
}

/// Decompresses a previously encoded payload.
///
/// # Errors
///
/// Returns [`CodecError::InvalidBase64`] if the blob is not valid base64 and
/// [`CodecError::InvalidPayload`] if the decoded bytes are not valid JSON.
pub fn decompress(encoded: &str) -> CodecResult<Value> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| CodecError::invalid_base64(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| CodecError::invalid_payload(e.to_string()))
}

/// Returns a copy of `value` with null members removed recursively.
///
/// Objects lose members whose value is null; arrays lose null elements.
/// Nested composites are stripped in place. Scalars pass through.
pub fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, val) in map {
                if !val.is_null() {
                    out.insert(key.clone(), strip_nulls(val));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|item| !item.is_null())
                .map(strip_nulls)
                .collect(),
        ),
        other => other.clone(),
    }
}
