//! Embedding abstractions and implementations.

pub mod embedder;

pub use embedder::{EmbedFuture, Embedder, OllamaEmbedder};
