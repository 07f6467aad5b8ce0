//! Weighted Reciprocal Rank Fusion of keyword and vector rankings.
//!
//! RRF score = sum(weight / (k + rank)) over every list a chunk appears in,
//! with 1-based ranks. Only ranks matter, so BM25 scores and cosine
//! similarities never need to be put on a common scale.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::rag::core::chunk::Chunk;
use crate::rag::core::errors::{RagError, RagResult};
use crate::rag::core::ids::ChunkId;
use crate::rag::retrieval::keyword::KeywordHit;
use crate::rag::storage::vector_store::VectorHit;

/// Configuration for rank fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// RRF constant k (typically 60).
    pub rrf_k: f64,
    /// Weight for BM25/keyword results.
    pub keyword_weight: f64,
    /// Weight for vector/semantic results.
    pub vector_weight: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self::balanced()
    }
}

impl FusionConfig {
    /// Create a config with equal weighting.
    #[must_use]
    pub const fn balanced() -> Self {
        Self {
            rrf_k: 60.0,
            keyword_weight: 0.5,
            vector_weight: 0.5,
        }
    }

    /// Create a config favoring vector search.
    #[must_use]
    pub const fn vector_heavy() -> Self {
        Self {
            rrf_k: 60.0,
            keyword_weight: 0.2,
            vector_weight: 0.8,
        }
    }

    /// Create a config favoring keyword search.
    #[must_use]
    pub const fn keyword_heavy() -> Self {
        Self {
            rrf_k: 60.0,
            keyword_weight: 0.7,
            vector_weight: 0.3,
        }
    }

    /// Validate weights and the RRF constant.
    ///
    /// # Errors
    /// Returns an error if a value is negative or non-finite, or if both weights are zero.
    pub fn validate(&self) -> RagResult<()> {
        for (name, value) in [
            ("fusion.rrf_k", self.rrf_k),
            ("fusion.keyword_weight", self.keyword_weight),
            ("fusion.vector_weight", self.vector_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RagError::InvalidConfig(format!(
                    "{name} must be finite and >= 0"
                )));
            }
        }
        if self.keyword_weight + self.vector_weight <= 0.0 {
            return Err(RagError::InvalidConfig(
                "fusion weights must not both be zero".to_string(),
            ));
        }
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)] // Ranks are small
    fn contribution(&self, weight: f64, rank: usize) -> f64 {
        weight / (self.rrf_k + rank as f64)
    }
}

/// Chunk with its fused score and per-list provenance.
#[derive(Debug, Clone)]
pub struct FusedHit {
    /// Combined RRF score.
    pub score: f64,
    /// 1-based rank in the keyword list, if present.
    pub keyword_rank: Option<usize>,
    /// 1-based rank in the vector list, if present.
    pub vector_rank: Option<usize>,
    /// BM25 score, if found by keyword search.
    pub keyword_score: Option<f64>,
    /// Vector similarity, if found by vector search.
    pub vector_score: Option<f64>,
    /// The chunk.
    pub chunk: Chunk,
}

impl FusedHit {
    /// Best (lowest) rank across both lists.
    #[must_use]
    pub fn best_rank(&self) -> usize {
        match (self.keyword_rank, self.vector_rank) {
            (Some(k), Some(v)) => k.min(v),
            (Some(rank), None) | (None, Some(rank)) => rank,
            (None, None) => usize::MAX,
        }
    }

    /// Deterministic ordering: score desc, best rank asc, chunk id asc.
    fn ordering(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.best_rank().cmp(&other.best_rank()))
            .then_with(|| self.chunk.id.cmp(&other.chunk.id))
    }
}

/// Fuse keyword and vector rankings and keep the `limit` best chunks.
///
/// A chunk repeated within one list only counts at its first position.
#[must_use]
pub fn fuse(
    keyword: &[KeywordHit],
    vector: &[VectorHit],
    config: &FusionConfig,
    limit: usize,
) -> Vec<FusedHit> {
    if limit == 0 {
        return Vec::new();
    }

    let mut fused: HashMap<ChunkId, FusedHit> = HashMap::new();

    for (index, hit) in keyword.iter().enumerate() {
        let rank = index + 1;
        let entry = fused.entry(hit.chunk.id).or_insert_with(|| empty_hit(&hit.chunk));
        if entry.keyword_rank.is_some() {
            continue;
        }
        entry.score += config.contribution(config.keyword_weight, rank);
        entry.keyword_rank = Some(rank);
        entry.keyword_score = Some(hit.score);
    }

    for (index, hit) in vector.iter().enumerate() {
        let rank = index + 1;
        let entry = fused.entry(hit.chunk.id).or_insert_with(|| empty_hit(&hit.chunk));
        if entry.vector_rank.is_some() {
            continue;
        }
        entry.score += config.contribution(config.vector_weight, rank);
        entry.vector_rank = Some(rank);
        entry.vector_score = Some(hit.similarity);
    }

    let mut results: Vec<FusedHit> = fused.into_values().collect();
    results.sort_by(FusedHit::ordering);
    results.truncate(limit);
    results
}

fn empty_hit(chunk: &Chunk) -> FusedHit {
    FusedHit {
        score: 0.0,
        keyword_rank: None,
        vector_rank: None,
        keyword_score: None,
        vector_score: None,
        chunk: chunk.clone(),
    }
}
