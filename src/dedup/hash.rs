// src/dedup/hash.rs
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Only the head of the body takes part in the hash.
pub const HASH_CONTENT_PREFIX_CHARS: usize = 500;

/// Hex SHA-256 of `trim(title) + trim(first 500 chars of content)`.
///
/// Returns an empty string when both parts are blank; callers treat that as
/// "no key" rather than an error.
pub fn hash_content(title: &str, content: &str) -> String {
    let title = title.trim();
    let head: String = content.chars().take(HASH_CONTENT_PREFIX_CHARS).collect();
    let head = head.trim();
    if title.is_empty() && head.is_empty() {
        return String::new();
    }

    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(head.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
