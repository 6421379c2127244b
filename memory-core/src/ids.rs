//! Sortable ids and content hashing.
//!
//! Ids must be lexicographically time-ordered (spec.md §3 "Identity"), which
//! rules out `Uuid::new_v4`. This mirrors `generate_id()` in
//! `original_source/src/core/models.py`: a Crockford-base32 encoding of the
//! millisecond timestamp followed by random entropy, 26 characters total
//! (ULID shape), without pulling in a dedicated `ulid` crate.

use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Opaque, sortable, globally-unique memory/relationship/session id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub String);

impl MemoryId {
    /// Generate a new id, time-ordered as of `now`.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Generate a new id stamped with an explicit time (used by tests that
    /// need deterministic ordering).
    #[must_use]
    pub fn generate_at(now: DateTime<Utc>) -> Self {
        let millis = u64::try_from(now.timestamp_millis().max(0)).unwrap_or(0);
        let mut entropy = [0u8; 10];
        rand::rng().fill_bytes(&mut entropy);
        Self(encode_ulid(millis, &entropy))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Encode a 48-bit millisecond timestamp plus 80 bits of entropy as a
/// 26-character Crockford base32 string (ULID shape).
fn encode_ulid(millis: u64, entropy: &[u8; 10]) -> String {
    let mut bytes = [0u8; 16];
    bytes[0] = ((millis >> 40) & 0xFF) as u8;
    bytes[1] = ((millis >> 32) & 0xFF) as u8;
    bytes[2] = ((millis >> 24) & 0xFF) as u8;
    bytes[3] = ((millis >> 16) & 0xFF) as u8;
    bytes[4] = ((millis >> 8) & 0xFF) as u8;
    bytes[5] = (millis & 0xFF) as u8;
    bytes[6..16].copy_from_slice(entropy);

    let mut out = String::with_capacity(26);
    let mut bit_buf: u32 = 0;
    let mut bit_len = 0u32;
    for byte in bytes {
        bit_buf = (bit_buf << 8) | u32::from(byte);
        bit_len += 8;
        while bit_len >= 5 {
            bit_len -= 5;
            let idx = ((bit_buf >> bit_len) & 0x1F) as usize;
            out.push(CROCKFORD_ALPHABET[idx] as char);
        }
    }
    if bit_len > 0 {
        let idx = ((bit_buf << (5 - bit_len)) & 0x1F) as usize;
        out.push(CROCKFORD_ALPHABET[idx] as char);
    }
    out
}

/// Normalize content for hashing: lowercase, collapse runs of whitespace.
/// Idempotent: `normalize(normalize(c)) == normalize(c)`.
#[must_use]
pub fn normalize(content: &str) -> String {
    let lowered = content.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_space = false;
    for ch in lowered.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

/// Truncated SHA-256 of the normalized content, used for dedup-at-write.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let normalized = normalize(content);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, 32)
}

fn hex_prefix(bytes: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(len);
    for byte in bytes {
        if out.len() >= len {
            break;
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out.truncate(len);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_time_ordered() {
        let t0 = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let t1 = DateTime::parse_from_rfc3339("2026-01-01T00:00:01Z").unwrap().with_timezone(&Utc);
        let a = MemoryId::generate_at(t0);
        let b = MemoryId::generate_at(t1);
        assert!(a.as_str() < b.as_str());
    }

    #[test]
    fn normalize_is_idempotent() {
        let c = "  Hello   World\n\n";
        assert_eq!(normalize(&normalize(c)), normalize(c));
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("Hello  World"), content_hash("hello world"));
    }
}
