//! Retrieval-augmented question answering for the hybrid RAG server.
//!
//! This module is organized into:
//! - `core`: Configuration, errors, IDs, chunks and text hashing
//! - `embedding`: Embedding model abstraction and Ollama implementation
//! - `storage`: Vector chunk stores (SQLite via rig-sqlite, in-memory)
//! - `retrieval`: Tokenizer, BM25 index, RRF fusion, hybrid retriever, query rewriting
//! - `cache`: Per-user answer cache with JSON persistence
//! - `conversation`: Per-user bounded conversation history
//! - `usage`: Usage log and frequent-question detection
//! - `generation`: Answer generator abstraction and Ollama adapter
//! - `maintenance`: Background cache sweeping
//! - `engine`: Main orchestration of a question round-trip

pub mod cache;
pub mod conversation;
pub mod core;
pub mod embedding;
pub mod engine;
pub mod generation;
pub mod maintenance;
pub mod retrieval;
pub mod storage;
pub mod usage;

// Re-export commonly used types for convenience
pub use cache::{CacheStats, CachedAnswer, SourceRef, UserCache, cache_key};
pub use conversation::{ConversationStore, ConversationTurn};
pub use self::core::{
    CacheConfig, Chunk, ChunkId, ConversationConfig, EmbeddingConfig, LlmConfig, RagConfig,
    RagError, RagResult, StorageConfig, UsageConfig, UserId,
};
pub use embedding::{EmbedFuture, Embedder, OllamaEmbedder};
pub use engine::{Answer, EngineStatus, RagBackends, RagEngine};
pub use generation::{AnswerGenerator, GenerationRequest, OllamaGenerator};
pub use maintenance::{CacheSweeper, SweepStats};
pub use retrieval::{
    Bm25Config, Bm25Index, FusedHit, FusionConfig, HybridRetriever, KeywordHit, RetrievalConfig,
    RetrievalMode, RetrievalOutcome, fuse, normalize_query, rewrite_query, tokenize,
};
pub use storage::{
    InMemoryVectorStore, SqliteVectorChunkStore, VectorChunkStore, VectorHit,
    init_sqlite_vec_extension,
};
pub use usage::{UsageLog, UsageRecord};
