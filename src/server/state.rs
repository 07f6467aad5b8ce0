//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::rag::engine::RagEngine;

/// Shared application state.
pub struct AppState {
    /// RAG engine answering questions.
    pub engine: Arc<RagEngine>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(engine: Arc<RagEngine>) -> Arc<Self> {
        Arc::new(Self { engine })
    }
}
