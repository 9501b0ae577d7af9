//! Deterministic payload checksums.
//!
//! Checksums are computed over a canonical JSON form so that two payloads
//! that are structurally equal always hash identically, regardless of the
//! key order the caller inserted them with. The checksum is fixed at
//! enqueue time and used only for integrity comparison downstream; the
//! engine never recomputes it.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Computes the SHA-256 checksum of a payload's canonical JSON form.
///
/// Returns a lowercase hex string. Identical payloads always produce the
/// same checksum; distinct payloads collide only with SHA-256 probability.
pub fn checksum(payload: &Value) -> String {
    let canonical = canonical_json(payload);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Serializes a value to its canonical JSON form.
///
/// Object keys are sorted bytewise at every nesting level; array order is
/// preserved; output is compact.
pub fn canonical_json(value: &Value) -> String {
    // Compact serialization of a Value cannot fail.
    serde_json::to_string(&sort_keys(value)).unwrap_or_default()
}

/// Returns a copy of `value` with all object keys sorted recursively.
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(&String, &Value)> = map.iter().collect();
            sorted.sort_by(|(a, _), (b, _)| a.cmp(b));

            let mut out = Map::new();
            for (key, val) in sorted {
                out.insert(key.clone(), sort_keys(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
