//! Core RAG types and identifiers.

pub mod chunk;
pub mod config;
pub mod errors;
pub mod hashing;
pub mod ids;

pub use chunk::Chunk;
pub use config::{
    CacheConfig, ConversationConfig, EmbeddingConfig, LlmConfig, RagConfig, RetrievalConfig,
    StorageConfig, UsageConfig,
};
pub use errors::{RagError, RagResult};
pub use hashing::{hash_content, normalize_text, sha256_hex};
pub use ids::{ChunkId, UserId, UserIdError};
