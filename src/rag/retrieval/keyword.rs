//! In-memory BM25 keyword index over chunks.
//!
//! Scoring:
//! - `idf = ln(1 + (N - df + 0.5) / (df + 0.5))` (never negative)
//! - `tf' = tf * (k1 + 1) / (tf + k1 * (1 - b + b * len / avgdl))`
//!
//! Query terms are deduplicated, so repeating a word does not inflate scores.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::rag::core::chunk::Chunk;
use crate::rag::core::errors::{RagError, RagResult};
use crate::rag::core::hashing::sha256_hex;
use crate::rag::core::ids::ChunkId;
use crate::rag::retrieval::tokenize::tokenize;

/// BM25 tuning parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Config {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization strength in `[0, 1]`.
    pub b: f64,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Bm25Config {
    /// Validate parameter ranges.
    ///
    /// # Errors
    /// Returns an error if `k1` is negative or `b` is outside `[0, 1]`.
    pub fn validate(&self) -> RagResult<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(RagError::InvalidConfig(
                "keyword.k1 must be finite and >= 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(RagError::InvalidConfig(
                "keyword.b must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Keyword match with its BM25 score.
#[derive(Clone, Debug)]
pub struct KeywordHit {
    /// BM25 score (always > 0).
    pub score: f64,
    /// Matched chunk.
    pub chunk: Chunk,
}

#[derive(Clone, Debug)]
struct IndexedChunk {
    chunk: Chunk,
    length: u32,
    terms: Vec<String>,
}

/// BM25 index with postings per term.
#[derive(Debug, Default)]
pub struct Bm25Index {
    config: Bm25Config,
    chunks: HashMap<ChunkId, IndexedChunk>,
    postings: HashMap<String, HashMap<ChunkId, u32>>,
    total_length: u64,
}

impl Bm25Index {
    /// Create an empty index.
    #[must_use]
    pub fn new(config: Bm25Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Number of indexed chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of distinct terms.
    #[must_use]
    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }

    /// Look up an indexed chunk.
    #[must_use]
    pub fn get(&self, id: &ChunkId) -> Option<&Chunk> {
        self.chunks.get(id).map(|indexed| &indexed.chunk)
    }

    /// Iterate over all indexed chunks in arbitrary order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values().map(|indexed| &indexed.chunk)
    }

    /// Index a chunk, replacing any chunk with the same id.
    pub fn insert(&mut self, chunk: Chunk) {
        self.remove(&chunk.id);

        let tokens = tokenize(&chunk.content);
        let length = u32::try_from(tokens.len()).unwrap_or(u32::MAX);
        let mut frequencies: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *frequencies.entry(token).or_insert(0) += 1;
        }

        let id = chunk.id;
        let mut terms = Vec::with_capacity(frequencies.len());
        for (term, tf) in frequencies {
            self.postings.entry(term.clone()).or_default().insert(id, tf);
            terms.push(term);
        }

        self.total_length += u64::from(length);
        self.chunks.insert(
            id,
            IndexedChunk {
                chunk,
                length,
                terms,
            },
        );
    }

    /// Remove a chunk. Returns `true` if it was indexed.
    pub fn remove(&mut self, id: &ChunkId) -> bool {
        let Some(indexed) = self.chunks.remove(id) else {
            return false;
        };

        self.total_length = self.total_length.saturating_sub(u64::from(indexed.length));
        for term in &indexed.terms {
            if let Some(posting) = self.postings.get_mut(term) {
                posting.remove(id);
                if posting.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        true
    }

    /// Drop every chunk.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.postings.clear();
        self.total_length = 0;
    }

    /// Rank chunks for a query. Ties are broken by ascending chunk id.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Corpus sizes stay far below 2^52
    pub fn search(&self, query: &str, limit: usize) -> Vec<KeywordHit> {
        if limit == 0 || self.chunks.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|term| seen.insert(term.clone()))
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let n = self.chunks.len() as f64;
        let avgdl = (self.total_length as f64 / n).max(f64::MIN_POSITIVE);
        let Bm25Config { k1, b } = self.config;

        let mut scores: HashMap<ChunkId, f64> = HashMap::new();
        for term in &terms {
            let Some(posting) = self.postings.get(term) else {
                continue;
            };
            let df = posting.len() as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();

            for (id, tf) in posting {
                let Some(indexed) = self.chunks.get(id) else {
                    continue;
                };
                let tf = f64::from(*tf);
                let norm = k1 * (1.0 - b + b * f64::from(indexed.length) / avgdl);
                *scores.entry(*id).or_insert(0.0) += idf * tf * (k1 + 1.0) / (tf + norm);
            }
        }

        let mut ranked: Vec<(ChunkId, f64)> =
            scores.into_iter().filter(|(_, score)| *score > 0.0).collect();
        ranked.sort_by(|x, y| y.1.total_cmp(&x.1).then_with(|| x.0.cmp(&y.0)));
        ranked.truncate(limit);

        ranked
            .into_iter()
            .filter_map(|(id, score)| {
                self.chunks.get(&id).map(|indexed| KeywordHit {
                    score,
                    chunk: indexed.chunk.clone(),
                })
            })
            .collect()
    }

    /// Hash of the sorted multiset of chunk content hashes.
    ///
    /// Two indexes holding the same texts produce the same fingerprint,
    /// regardless of chunk ids or insertion order.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hashes: Vec<&str> = self
            .chunks
            .values()
            .map(|indexed| indexed.chunk.content_hash.as_str())
            .collect();
        hashes.sort_unstable();
        sha256_hex(&hashes.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk::new("test.md", 0, text).unwrap()
    }

    fn index_of(texts: &[&str]) -> Bm25Index {
        let mut index = Bm25Index::new(Bm25Config::default());
        for text in texts {
            index.insert(chunk(text));
        }
        index
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = Bm25Index::new(Bm25Config::default());
        assert!(index.search("anything", 5).is_empty());
    }

    #[test]
    fn test_matching_chunk_ranks_first() {
        let index = index_of(&[
            "rust ownership and borrowing",
            "python garbage collection",
            "cooking pasta at home",
        ]);
        let hits = index.search("borrowing in rust", 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.content, "rust ownership and borrowing");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_rare_term_outweighs_common_term() {
        let index = index_of(&[
            "memory memory cache",
            "memory layout",
            "memory allocator",
            "cache eviction policy",
        ]);
        let hits = index.search("memory eviction", 4);
        assert_eq!(hits[0].chunk.content, "cache eviction policy");
    }

    #[test]
    fn test_repeated_query_terms_do_not_inflate() {
        let index = index_of(&["vector search", "keyword search"]);
        let once = index.search("vector", 1);
        let thrice = index.search("vector vector vector", 1);
        assert!((once[0].score - thrice[0].score).abs() < 1e-12);
    }

    #[test]
    fn test_stopword_only_query_is_empty() {
        let index = index_of(&["the cat"]);
        assert!(index.search("the of and", 5).is_empty());
    }

    #[test]
    fn test_ties_break_by_chunk_id() {
        let index = index_of(&["alpha beta", "alpha beta", "alpha beta"]);
        let hits = index.search("alpha", 3);
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].chunk.id < w[1].chunk.id));
    }

    #[test]
    fn test_remove_drops_chunk_and_postings() {
        let mut index = Bm25Index::new(Bm25Config::default());
        let target = chunk("unique zebra text");
        let id = target.id;
        index.insert(target);
        index.insert(chunk("other text"));

        assert!(index.remove(&id));
        assert!(!index.remove(&id));
        assert!(index.search("zebra", 5).is_empty());
        assert_eq!(index.len(), 1);
        assert!(index.postings.get("zebra").is_none());
    }

    #[test]
    fn test_reinsert_replaces() {
        let mut index = Bm25Index::new(Bm25Config::default());
        let mut original = chunk("first version");
        index.insert(original.clone());
        original.content = "second draft".to_string();
        index.insert(original);

        assert_eq!(index.len(), 1);
        assert!(index.search("version", 5).is_empty());
        assert_eq!(index.search("draft", 5).len(), 1);
    }

    #[test]
    fn test_fingerprint_ignores_ids_and_order() {
        let a = index_of(&["one", "two"]);
        let b = index_of(&["two", "one"]);
        let c = index_of(&["one", "three"]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_config_validation() {
        assert!(Bm25Config::default().validate().is_ok());
        assert!(Bm25Config { k1: 1.2, b: 1.5 }.validate().is_err());
        assert!(Bm25Config { k1: -1.0, b: 0.5 }.validate().is_err());
    }
}
