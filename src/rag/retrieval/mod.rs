//! Retrieval: tokenizer, BM25 keyword index, RRF fusion and the hybrid retriever.

pub mod fusion;
pub mod hybrid;
pub mod keyword;
pub mod query;
pub mod tokenize;

pub use crate::rag::core::config::RetrievalConfig;
pub use fusion::{FusedHit, FusionConfig, fuse};
pub use hybrid::{HybridRetriever, RetrievalMode, RetrievalOutcome};
pub use keyword::{Bm25Config, Bm25Index, KeywordHit};
pub use query::{is_follow_up, normalize_query, rewrite_query};
pub use tokenize::tokenize;
