//! Cache keys derived from normalized queries.

use crate::rag::core::hashing::sha256_hex;
use crate::rag::retrieval::query::normalize_query;

/// Hex characters kept from the SHA-256 digest.
pub const CACHE_KEY_LEN: usize = 32;

/// Stable cache key for a query.
///
/// Queries that only differ in case or whitespace share a key. The key does
/// not include the user: every user owns a separate shard and file.
#[must_use]
pub fn cache_key(query: &str) -> String {
    let mut digest = sha256_hex(&normalize_query(query));
    digest.truncate(CACHE_KEY_LEN);
    digest
}
