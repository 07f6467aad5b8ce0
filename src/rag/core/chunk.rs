//! Indexed text chunk model.

use serde::{Deserialize, Serialize};

use crate::rag::core::errors::{RagError, RagResult};
use crate::rag::core::hashing::hash_content;
use crate::rag::core::ids::ChunkId;

/// A retrievable unit of text produced by an external chunker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier.
    pub id: ChunkId,
    /// Originating document (usually a file path under the data folder).
    pub source: String,
    /// Position of the chunk within its source.
    pub ordinal: u32,
    /// Chunk text.
    pub content: String,
    /// Hash of normalized content.
    pub content_hash: String,
}

impl Chunk {
    /// Create a new chunk with a computed hash.
    ///
    /// # Errors
    /// Returns an error if content is empty after trimming.
    pub fn new(source: impl Into<String>, ordinal: u32, content: impl AsRef<str>) -> RagResult<Self> {
        let trimmed = content.as_ref().trim();
        if trimmed.is_empty() {
            return Err(RagError::InvalidChunk("content is empty".to_string()));
        }

        Ok(Self {
            id: ChunkId::new(),
            source: source.into(),
            ordinal,
            content: trimmed.to_string(),
            content_hash: hash_content(trimmed),
        })
    }

    /// Build one chunk per non-empty text, numbering them in order.
    ///
    /// # Errors
    /// Returns an error if every text is blank.
    pub fn batch(source: &str, texts: &[String]) -> RagResult<Vec<Self>> {
        let chunks: Vec<Self> = texts
            .iter()
            .filter(|text| !text.trim().is_empty())
            .zip(0_u32..)
            .map(|(text, ordinal)| Self::new(source, ordinal, text))
            .collect::<RagResult<_>>()?;

        if chunks.is_empty() {
            return Err(RagError::InvalidChunk(format!(
                "no non-empty chunks for source {source}"
            )));
        }
        Ok(chunks)
    }
}
