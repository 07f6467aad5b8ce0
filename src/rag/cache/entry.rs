//! Cached answers and their provenance.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::rag::core::ids::ChunkId;
use crate::rag::retrieval::fusion::FusedHit;

/// Chunk that contributed to a cached answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Chunk identifier.
    pub chunk_id: ChunkId,
    /// Source document of the chunk.
    pub source: String,
    /// Fused RRF score at answer time.
    pub score: f64,
}

impl From<&FusedHit> for SourceRef {
    fn from(hit: &FusedHit) -> Self {
        Self {
            chunk_id: hit.chunk.id,
            source: hit.chunk.source.clone(),
            score: hit.score,
        }
    }
}

/// A previously computed answer for one user's query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedAnswer {
    /// Query the answer was computed for (after rewriting).
    pub query: String,
    /// Generated answer text.
    pub answer: String,
    /// Chunks the answer was grounded on.
    pub sources: Vec<SourceRef>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Corpus fingerprint at creation time.
    pub corpus_version: String,
    /// Number of times this entry was served.
    #[serde(default)]
    pub hit_count: u64,
}

impl CachedAnswer {
    /// Create a fresh entry stamped with the current time.
    #[must_use]
    pub fn new(
        query: impl Into<String>,
        answer: impl Into<String>,
        sources: Vec<SourceRef>,
        corpus_version: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
            sources,
            created_at: Utc::now(),
            corpus_version: corpus_version.into(),
            hit_count: 0,
        }
    }

    /// Whether the entry's age has reached `ttl_seconds`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, ttl_seconds: u64) -> bool {
        let ttl = i64::try_from(ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        now.signed_duration_since(self.created_at) >= ttl
    }

    /// Whether the entry can still be served for `corpus_version` at `now`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl_seconds: u64, corpus_version: &str) -> bool {
        self.corpus_version == corpus_version && !self.is_expired(now, ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let entry = CachedAnswer::new("q", "a", Vec::new(), "v1");
        let created = entry.created_at;
        assert!(!entry.is_expired(created + Duration::seconds(59), 60));
        assert!(entry.is_expired(created + Duration::seconds(60), 60));
    }

    #[test]
    fn test_corpus_change_is_stale() {
        let entry = CachedAnswer::new("q", "a", Vec::new(), "v1");
        let now = entry.created_at;
        assert!(entry.is_fresh(now, 60, "v1"));
        assert!(!entry.is_fresh(now, 60, "v2"));
    }
}
