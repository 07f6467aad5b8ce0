//! Error types for the RAG engine.

use thiserror::Error;

use crate::rag::core::ids::UserIdError;

/// RAG engine error type.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// User identifier rejected by validation.
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
    /// Question is empty after trimming.
    #[error("query is empty")]
    EmptyQuery,
    /// Invalid chunk content.
    #[error("invalid chunk: {0}")]
    InvalidChunk(String),
    /// Neither retriever could serve the query.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Vector store error.
    #[error("vector store error: {0}")]
    VectorStore(#[from] rig::vector_store::VectorStoreError),
    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] rig::embeddings::EmbeddingError),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    HttpClient(#[from] rig::http_client::Error),
    /// Completion error.
    #[error("completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Whether the error was caused by caller input rather than a backend.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidUserId(_) | Self::EmptyQuery | Self::InvalidChunk(_)
        )
    }
}

impl From<UserIdError> for RagError {
    fn from(err: UserIdError) -> Self {
        Self::InvalidUserId(err.to_string())
    }
}

/// Convenience result alias for RAG operations.
pub type RagResult<T> = Result<T, RagError>;
