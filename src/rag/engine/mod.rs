//! RAG engine orchestration module.

pub mod core;

pub use self::core::{Answer, EngineStatus, RagBackends, RagEngine};
