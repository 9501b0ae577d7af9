//! # DriftQ Codec
//!
//! Payload fingerprinting and lossy transfer encoding for DriftQ.
//!
//! This crate provides:
//! - Deterministic payload checksums over a canonical JSON form
//! - A lossy transfer codec that strips null members before encoding
//!
//! ## Canonical JSON Rules
//!
//! - Object keys are sorted (bytewise, recursively)
//! - Array order is preserved
//! - Serialization is compact (no whitespace)
//!
//! Identical payloads always produce identical checksums, regardless of the
//! key order the caller built them with.
//!
//! ## Usage
//!
//! ```
//! use driftq_codec::{checksum, compress, decompress};
//! use serde_json::json;
//!
//! let payload = json!({"title": "offline edit", "draft": null});
//! let sum = checksum(&payload);
//! assert_eq!(sum, checksum(&payload));
//!
//! // Null members do not survive the transfer codec.
//! let compressed = compress(&payload).unwrap();
//! let restored = decompress(&compressed.encoded).unwrap();
//! assert_eq!(restored, json!({"title": "offline edit"}));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checksum;
mod compress;
mod error;

pub use checksum::{canonical_json, checksum};
pub use compress::{compress, decompress, strip_nulls, Compressed};
pub use error::{CodecError, CodecResult};
