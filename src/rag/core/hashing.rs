//! Text normalization and stable content hashing.
//!
//! Hashes end up in cache keys and persisted cache files, so they must be
//! stable across builds and processes; `sha2` is used instead of `std`'s
//! randomized hasher.

use sha2::{Digest, Sha256};

/// Normalize text for hashing (trim, lowercase, collapse whitespace).
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut prev_space = false;

    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            if !prev_space {
                normalized.push(' ');
                prev_space = true;
            }
        } else {
            normalized.extend(ch.to_lowercase());
            prev_space = false;
        }
    }

    normalized
}

/// Hex-encoded SHA-256 of the input.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Hash raw content after normalization.
#[must_use]
pub fn hash_content(text: &str) -> String {
    sha256_hex(&normalize_text(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize_text("  What IS\t\n  RRF? "), "what is rrf?");
    }

    #[test]
    fn test_hash_is_normalization_invariant() {
        assert_eq!(hash_content("Hello   World"), hash_content("hello world"));
        assert_ne!(hash_content("hello world"), hash_content("hello worlds"));
    }

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
