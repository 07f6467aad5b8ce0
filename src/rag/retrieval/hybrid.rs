//! Hybrid search combining BM25 keyword matching with vector similarity.
//!
//! Uses Reciprocal Rank Fusion (RRF) to combine results from both search methods.

use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::rag::core::config::RetrievalConfig;
use crate::rag::core::errors::{RagError, RagResult};
use crate::rag::retrieval::fusion::{FusedHit, FusionConfig, fuse};
use crate::rag::retrieval::keyword::{Bm25Index, KeywordHit};
use crate::rag::storage::vector_store::{VectorChunkStore, VectorHit};

/// Which retrievers contributed to an outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Both keyword and vector lists were fused.
    Hybrid,
    /// Vector search was skipped or failed.
    KeywordOnly,
    /// The keyword index was empty.
    VectorOnly,
    /// Nothing to search, or `top_k` was zero.
    Empty,
}

impl RetrievalMode {
    /// Stable string representation (for logs and API responses).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::KeywordOnly => "keyword_only",
            Self::VectorOnly => "vector_only",
            Self::Empty => "empty",
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fused hits plus the mode that produced them.
#[derive(Clone, Debug)]
pub struct RetrievalOutcome {
    /// Fused hits, best first.
    pub hits: Vec<FusedHit>,
    /// Contributing retrievers.
    pub mode: RetrievalMode,
}

impl RetrievalOutcome {
    const fn empty() -> Self {
        Self {
            hits: Vec::new(),
            mode: RetrievalMode::Empty,
        }
    }
}

/// Hybrid retriever over a shared BM25 index and a vector chunk store.
pub struct HybridRetriever {
    keyword: Arc<RwLock<Bm25Index>>,
    vector: Arc<dyn VectorChunkStore>,
    retrieval: RetrievalConfig,
    fusion: FusionConfig,
}

impl HybridRetriever {
    /// Create a new hybrid retriever.
    #[must_use]
    pub fn new(
        keyword: Arc<RwLock<Bm25Index>>,
        vector: Arc<dyn VectorChunkStore>,
        retrieval: RetrievalConfig,
        fusion: FusionConfig,
    ) -> Self {
        Self {
            keyword,
            vector,
            retrieval,
            fusion,
        }
    }

    /// Retrieve and fuse the `top_k` best chunks for a query.
    ///
    /// # Errors
    /// Returns an error only when the keyword index is empty and the vector
    /// store fails; a vector failure next to a populated keyword index
    /// degrades to keyword-only results.
    pub async fn search(&self, query: &str, top_k: usize) -> RagResult<RetrievalOutcome> {
        if top_k == 0 {
            return Ok(RetrievalOutcome::empty());
        }
        let depth = self.retrieval.candidate_depth(top_k);

        let (keyword_hits, keyword_available) = {
            let index = self.keyword.read().await;
            (index.search(query, depth), !index.is_empty())
        };

        let vector_hits = match self
            .vector
            .query(query, depth, self.retrieval.min_similarity)
            .await
        {
            Ok(hits) => Some(hits),
            Err(err) if keyword_available => {
                warn!(%err, "Vector search failed, falling back to keyword results");
                None
            }
            Err(err) => {
                return Err(RagError::RetrievalUnavailable(format!(
                    "keyword index is empty and vector search failed: {err}"
                )));
            }
        };

        let outcome = self.combine(&keyword_hits, keyword_available, vector_hits.as_deref(), top_k);
        debug!(
            mode = %outcome.mode,
            keyword = keyword_hits.len(),
            vector = vector_hits.as_ref().map_or(0, Vec::len),
            fused = outcome.hits.len(),
            "Hybrid retrieval finished"
        );
        Ok(outcome)
    }

    fn combine(
        &self,
        keyword_hits: &[KeywordHit],
        keyword_available: bool,
        vector_hits: Option<&[VectorHit]>,
        top_k: usize,
    ) -> RetrievalOutcome {
        let mode = match (keyword_available, vector_hits.is_some()) {
            (true, true) => RetrievalMode::Hybrid,
            (true, false) => RetrievalMode::KeywordOnly,
            (false, true) => RetrievalMode::VectorOnly,
            (false, false) => RetrievalMode::Empty,
        };
        let hits = fuse(keyword_hits, vector_hits.unwrap_or(&[]), &self.fusion, top_k);
        if hits.is_empty() {
            return RetrievalOutcome::empty();
        }
        RetrievalOutcome { hits, mode }
    }
}
