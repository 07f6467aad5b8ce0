//! Persistent and in-memory vector stores for chunks.

pub mod memory_store;
pub mod sqlite_vec_loader;
pub mod vector_store;

pub use memory_store::{InMemoryVectorStore, cosine_similarity};
pub use sqlite_vec_loader::init_sqlite_vec_extension;
pub use vector_store::{SqliteVectorChunkStore, StoreFuture, VectorChunkStore, VectorHit};
