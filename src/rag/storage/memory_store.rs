//! In-process vector store using cosine similarity.
//!
//! Suitable for small corpora and for tests. Query embeddings come from the
//! same [`Embedder`] that produced the stored vectors.

use std::collections::HashMap;
use std::sync::Arc;

use rig::embeddings::Embedding;
use tokio::sync::RwLock;

use crate::rag::core::chunk::Chunk;
use crate::rag::core::errors::{RagError, RagResult};
use crate::rag::core::ids::ChunkId;
use crate::rag::embedding::embedder::Embedder;
use crate::rag::storage::vector_store::{StoreFuture, VectorChunkStore, VectorHit};

/// Vector store keeping every embedding in memory.
pub struct InMemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    rows: RwLock<HashMap<ChunkId, (Chunk, Vec<f64>)>>,
}

impl InMemoryVectorStore {
    /// Create an empty store that embeds queries with `embedder`.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl VectorChunkStore for InMemoryVectorStore {
    fn upsert(&self, chunk: Chunk, embedding: Embedding) -> StoreFuture<'_, RagResult<()>> {
        Box::pin(async move {
            let expected = self.embedder.ndims();
            if embedding.vec.len() != expected {
                return Err(RagError::InvalidChunk(format!(
                    "embedding has {} dimensions, expected {expected}",
                    embedding.vec.len()
                )));
            }
            self.rows
                .write()
                .await
                .insert(chunk.id, (chunk, embedding.vec));
            Ok(())
        })
    }

    fn query(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: f64,
    ) -> StoreFuture<'_, RagResult<Vec<VectorHit>>> {
        let query = query.to_string();
        Box::pin(async move {
            if top_k == 0 {
                return Ok(Vec::new());
            }

            let query_vec = self.embedder.embed_text(&query).await?.vec;
            let rows = self.rows.read().await;
            let mut hits: Vec<VectorHit> = rows
                .values()
                .filter_map(|(chunk, vec)| {
                    let similarity = cosine_similarity(&query_vec, vec)?;
                    (similarity >= min_similarity).then(|| VectorHit {
                        similarity,
                        chunk: chunk.clone(),
                    })
                })
                .collect();
            drop(rows);

            hits.sort_by(|a, b| {
                b.similarity
                    .total_cmp(&a.similarity)
                    .then_with(|| a.chunk.id.cmp(&b.chunk.id))
            });
            hits.truncate(top_k);
            Ok(hits)
        })
    }

    fn delete_by_ids(&self, ids: Vec<ChunkId>) -> StoreFuture<'_, RagResult<()>> {
        Box::pin(async move {
            let mut rows = self.rows.write().await;
            for id in &ids {
                rows.remove(id);
            }
            Ok(())
        })
    }

    fn count(&self) -> StoreFuture<'_, RagResult<usize>> {
        Box::pin(async move { Ok(self.rows.read().await.len()) })
    }

    fn all_chunks(&self) -> StoreFuture<'_, RagResult<Vec<Chunk>>> {
        Box::pin(async move {
            Ok(self
                .rows
                .read()
                .await
                .values()
                .map(|(chunk, _)| chunk.clone())
                .collect())
        })
    }
}

/// Cosine similarity, or `None` when lengths differ or a vector is all zeros.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        dot = x.mul_add(*y, dot);
        norm_a = x.mul_add(*x, norm_a);
        norm_b = y.mul_add(*y, norm_b);
    }

    if norm_a <= 0.0 || norm_b <= 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}
