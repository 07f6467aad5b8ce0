//! Vector chunk store integration using Rig + `SQLite`.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::OnceLock;

use rig::OneOrMany;
use rig::embeddings::Embedding;
use rig::vector_store::VectorStoreIndex;
use rig::vector_store::request::VectorSearchRequest;
use rig_sqlite::{
    Column, ColumnValue, SqliteSearchFilter, SqliteVectorIndex, SqliteVectorStore,
    SqliteVectorStoreTable,
};
use serde::Deserialize;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::rag::core::chunk::Chunk;
use crate::rag::core::config::RagConfig;
use crate::rag::core::errors::{RagError, RagResult};
use crate::rag::core::ids::ChunkId;
use crate::rag::embedding::embedder::{OllamaEmbeddingModel, ollama_embedding_model};

/// Boxed future type for vector store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Vector search result with similarity score.
#[derive(Clone, Debug)]
pub struct VectorHit {
    /// Similarity score reported by the store.
    pub similarity: f64,
    /// Retrieved chunk.
    pub chunk: Chunk,
}

/// Vector store abstraction for chunks.
pub trait VectorChunkStore: Send + Sync {
    /// Upsert a chunk with its embedding.
    ///
    /// # Errors
    /// Returns an error if the store cannot persist the chunk.
    fn upsert(&self, chunk: Chunk, embedding: Embedding) -> StoreFuture<'_, RagResult<()>>;
    /// Query the nearest chunks to a text, best first.
    ///
    /// # Errors
    /// Returns an error if the query cannot be executed.
    fn query(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: f64,
    ) -> StoreFuture<'_, RagResult<Vec<VectorHit>>>;
    /// Delete chunks by id.
    ///
    /// # Errors
    /// Returns an error if deletion fails.
    fn delete_by_ids(&self, ids: Vec<ChunkId>) -> StoreFuture<'_, RagResult<()>>;
    /// Number of stored chunks.
    ///
    /// # Errors
    /// Returns an error if the store cannot be queried.
    fn count(&self) -> StoreFuture<'_, RagResult<usize>>;
    /// Every stored chunk, in no particular order.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn all_chunks(&self) -> StoreFuture<'_, RagResult<Vec<Chunk>>>;
}

const DEFAULT_TABLE: &str = "rag_chunks";
static TABLE_NAME: OnceLock<&'static str> = OnceLock::new();

// rig-sqlite reads the table name through a static fn, so it is fixed per process.
fn init_table_name(name: &str) -> RagResult<()> {
    if let Some(existing) = TABLE_NAME.get() {
        if *existing == name {
            return Ok(());
        }
        return Err(RagError::InvalidConfig(
            "chunk table already initialized with a different name".to_string(),
        ));
    }

    let leaked = Box::leak(name.to_string().into_boxed_str());
    let _ = TABLE_NAME.set(leaked);
    Ok(())
}

fn table_name() -> &'static str {
    TABLE_NAME.get().copied().unwrap_or(DEFAULT_TABLE)
}

#[derive(Clone, Debug, Deserialize)]
struct ChunkDocument {
    id: String,
    source: String,
    ordinal: String,
    content: String,
    content_hash: String,
}

impl ChunkDocument {
    fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            id: chunk.id.to_string(),
            source: chunk.source.clone(),
            ordinal: chunk.ordinal.to_string(),
            content: chunk.content.clone(),
            content_hash: chunk.content_hash.clone(),
        }
    }

    fn to_chunk(&self) -> RagResult<Chunk> {
        let id = ChunkId::from_str(&self.id)
            .map_err(|err| RagError::InvalidChunk(format!("invalid chunk id: {err}")))?;
        let ordinal = self
            .ordinal
            .parse::<u32>()
            .map_err(|err| RagError::InvalidChunk(format!("invalid ordinal: {err}")))?;
        Ok(Chunk {
            id,
            source: self.source.clone(),
            ordinal,
            content: self.content.clone(),
            content_hash: self.content_hash.clone(),
        })
    }
}

impl SqliteVectorStoreTable for ChunkDocument {
    fn name() -> &'static str {
        table_name()
    }

    fn schema() -> Vec<Column> {
        vec![
            Column::new("id", "TEXT PRIMARY KEY"),
            Column::new("source", "TEXT").indexed(),
            Column::new("ordinal", "TEXT"),
            Column::new("content", "TEXT"),
            Column::new("content_hash", "TEXT").indexed(),
        ]
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn column_values(&self) -> Vec<(&'static str, Box<dyn ColumnValue>)> {
        vec![
            ("id", Box::new(self.id.clone())),
            ("source", Box::new(self.source.clone())),
            ("ordinal", Box::new(self.ordinal.clone())),
            ("content", Box::new(self.content.clone())),
            ("content_hash", Box::new(self.content_hash.clone())),
        ]
    }
}

/// SQLite-backed vector chunk store (the persistent vector database).
pub struct SqliteVectorChunkStore {
    conn: Connection,
    store: SqliteVectorStore<OllamaEmbeddingModel, ChunkDocument>,
    index: SqliteVectorIndex<OllamaEmbeddingModel, ChunkDocument>,
}

impl SqliteVectorChunkStore {
    /// Initialize the `SQLite` vector store.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the sqlite-vec extension is missing.
    ///
    /// # Note
    /// `init_sqlite_vec_extension()` must run before this function.
    pub async fn new(config: &RagConfig) -> RagResult<Self> {
        init_table_name(&config.storage.chunk_table)?;
        let conn = Connection::open(&config.storage.sqlite_path).await?;
        let model = ollama_embedding_model(&config.embedding)?;

        let store = SqliteVectorStore::new(conn.clone(), &model).await?;
        let index = store.clone().index(model);

        debug!(path = %config.storage.sqlite_path.display(), table = table_name(), "Opened vector store");
        Ok(Self { conn, store, index })
    }
}

impl VectorChunkStore for SqliteVectorChunkStore {
    fn upsert(&self, chunk: Chunk, embedding: Embedding) -> StoreFuture<'_, RagResult<()>> {
        Box::pin(async move {
            // Re-indexing a chunk id replaces the stored row and its embedding.
            self.delete_by_ids(vec![chunk.id]).await?;
            let doc = ChunkDocument::from_chunk(&chunk);
            self.store
                .add_rows(vec![(doc, OneOrMany::one(embedding))])
                .await?;
            Ok(())
        })
    }

    fn query(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: f64,
    ) -> StoreFuture<'_, RagResult<Vec<VectorHit>>> {
        let query_text = query.to_string();
        Box::pin(async move {
            if top_k == 0 {
                return Ok(Vec::new());
            }

            let request = VectorSearchRequest::<SqliteSearchFilter>::builder()
                .query(query_text)
                .samples(top_k as u64)
                .threshold(min_similarity)
                .build()
                .map_err(|err| RagError::InvalidConfig(err.to_string()))?;

            let raw = self.index.top_n::<ChunkDocument>(request).await?;
            let mut hits = Vec::with_capacity(raw.len());
            for (score, _id, doc) in raw {
                if score < min_similarity {
                    continue;
                }
                hits.push(VectorHit {
                    similarity: score,
                    chunk: doc.to_chunk()?,
                });
            }
            Ok(hits)
        })
    }

    fn delete_by_ids(&self, ids: Vec<ChunkId>) -> StoreFuture<'_, RagResult<()>> {
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(());
            }

            let table = table_name().to_string();
            let ids: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
            let placeholders = numbered_placeholders(ids.len());

            self.conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let rowids = {
                        let mut stmt = tx.prepare(&format!(
                            "SELECT rowid FROM {table} WHERE id IN ({placeholders})"
                        ))?;
                        stmt.query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                            row.get::<_, i64>(0)
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?
                    };

                    tx.execute(
                        &format!("DELETE FROM {table} WHERE id IN ({placeholders})"),
                        rusqlite::params_from_iter(ids.iter()),
                    )?;

                    if !rowids.is_empty() {
                        let rowid_placeholders = numbered_placeholders(rowids.len());
                        tx.execute(
                            &format!(
                                "DELETE FROM {table}_embeddings WHERE rowid IN ({rowid_placeholders})"
                            ),
                            rusqlite::params_from_iter(rowids.iter()),
                        )?;
                    }

                    tx.commit()?;
                    Ok(())
                })
                .await?;

            Ok(())
        })
    }

    fn count(&self) -> StoreFuture<'_, RagResult<usize>> {
        Box::pin(async move {
            let table = table_name().to_string();
            let count = self
                .conn
                .call(move |conn| {
                    let count: i64 =
                        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                            row.get(0)
                        })?;
                    Ok(count)
                })
                .await?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }

    fn all_chunks(&self) -> StoreFuture<'_, RagResult<Vec<Chunk>>> {
        Box::pin(async move {
            let table = table_name().to_string();
            let docs = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, source, ordinal, content, content_hash FROM {table}"
                    ))?;
                    let docs = stmt
                        .query_map([], |row| {
                            Ok(ChunkDocument {
                                id: row.get(0)?,
                                source: row.get(1)?,
                                ordinal: row.get(2)?,
                                content: row.get(3)?,
                                content_hash: row.get(4)?,
                            })
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(docs)
                })
                .await?;
            docs.iter().map(ChunkDocument::to_chunk).collect()
        })
    }
}

fn numbered_placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(numbered_placeholders(3), "?1, ?2, ?3");
        assert_eq!(numbered_placeholders(0), "");
    }

    #[test]
    fn test_document_roundtrip() {
        let chunk = Chunk::new("data/a.md", 7, "some text").unwrap();
        let restored = ChunkDocument::from_chunk(&chunk).to_chunk().unwrap();
        assert_eq!(chunk, restored);
    }

    #[test]
    fn test_document_rejects_bad_id() {
        let mut doc = ChunkDocument::from_chunk(&Chunk::new("a", 0, "x").unwrap());
        doc.id = "not-a-uuid".to_string();
        assert!(matches!(doc.to_chunk(), Err(RagError::InvalidChunk(_))));
    }
}
