//! Hashing Utilities

use sha2::{Digest, Sha256};
use tiermem_core::Value;

/// Compute SHA-256 hash of bytes and return as hex string
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Hash of a payload's serialized JSON form.
///
/// Mapping keys serialize in sorted order, so equal payloads hash equally.
/// Returns `None` for payloads with no JSON form.
pub fn payload_hash(payload: &Value) -> Option<String> {
    let json = payload.to_json()?;
    let bytes = serde_json::to_vec(&json).ok()?;
    Some(content_hash(&bytes))
}
