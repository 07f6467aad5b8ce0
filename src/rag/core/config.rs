//! Configuration for the hybrid RAG engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::rag::core::errors::{RagError, RagResult};
use crate::rag::retrieval::fusion::FusionConfig;
use crate::rag::retrieval::keyword::Bm25Config;

/// Top-level configuration for the RAG engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Retrieval depth settings.
    pub retrieval: RetrievalConfig,
    /// Reciprocal Rank Fusion settings.
    pub fusion: FusionConfig,
    /// BM25 keyword index settings.
    pub keyword: Bm25Config,
    /// Per-user cache settings.
    pub cache: CacheConfig,
    /// Conversation history settings.
    pub conversation: ConversationConfig,
    /// Usage log settings.
    pub usage: UsageConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Embedding model settings.
    pub embedding: EmbeddingConfig,
    /// Completion model settings.
    pub llm: LlmConfig,
}

impl RagConfig {
    /// Load a configuration from a JSON file. Missing sections use defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> RagResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> RagResult<()> {
        if self.retrieval.top_k == 0 {
            return Err(RagError::InvalidConfig(
                "retrieval.top_k must be > 0".to_string(),
            ));
        }

        if self.retrieval.candidate_multiplier == 0 {
            return Err(RagError::InvalidConfig(
                "retrieval.candidate_multiplier must be > 0".to_string(),
            ));
        }

        if !self.retrieval.min_similarity.is_finite() {
            return Err(RagError::InvalidConfig(
                "retrieval.min_similarity must be finite".to_string(),
            ));
        }

        self.fusion.validate()?;
        self.keyword.validate()?;

        if self.cache.max_entries_per_user == 0 {
            return Err(RagError::InvalidConfig(
                "cache.max_entries_per_user must be > 0".to_string(),
            ));
        }

        if self.cache.ttl_seconds == 0 {
            return Err(RagError::InvalidConfig(
                "cache.ttl_seconds must be > 0".to_string(),
            ));
        }

        if self.cache.sweep_interval_seconds == 0 {
            return Err(RagError::InvalidConfig(
                "cache.sweep_interval_seconds must be > 0".to_string(),
            ));
        }

        if self.conversation.window == 0 {
            return Err(RagError::InvalidConfig(
                "conversation.window must be > 0".to_string(),
            ));
        }

        if self.usage.frequent_threshold == 0 {
            return Err(RagError::InvalidConfig(
                "usage.frequent_threshold must be > 0".to_string(),
            ));
        }

        if self.embedding.ndims == 0 {
            return Err(RagError::InvalidConfig(
                "embedding.ndims must be > 0".to_string(),
            ));
        }

        if self.storage.chunk_table.is_empty()
            || !self
                .storage
                .chunk_table
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            return Err(RagError::InvalidConfig(
                "storage.chunk_table must be a non-empty [A-Za-z0-9_] identifier".to_string(),
            ));
        }

        if let Some(base_url) = &self.embedding.base_url {
            Url::parse(base_url)?;
        }

        if let Some(base_url) = &self.llm.base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }

    /// Point both Ollama clients at the same base URL.
    pub fn set_ollama_base_url(&mut self, base_url: &str) {
        self.embedding.base_url = Some(base_url.to_string());
        self.llm.base_url = Some(base_url.to_string());
    }
}

/// Retrieval depth settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of fused chunks handed to generation.
    pub top_k: usize,
    /// Each retriever fetches `top_k * candidate_multiplier` candidates before fusion.
    pub candidate_multiplier: usize,
    /// Minimum vector similarity to keep a candidate.
    pub min_similarity: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            candidate_multiplier: 2,
            min_similarity: 0.0,
        }
    }
}

impl RetrievalConfig {
    /// Candidate depth requested from each retriever for a given `top_k`.
    #[must_use]
    pub const fn candidate_depth(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.candidate_multiplier)
    }
}

/// Per-user cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether answers are cached at all.
    pub enabled: bool,
    /// Directory holding one JSON file per user.
    pub dir: PathBuf,
    /// Entry lifetime in seconds.
    pub ttl_seconds: u64,
    /// LRU capacity of each user's shard.
    pub max_entries_per_user: usize,
    /// Whether shards are mirrored to disk.
    pub persist: bool,
    /// Interval between background purges of expired entries.
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("user_caches"),
            ttl_seconds: 60 * 60 * 24,
            max_entries_per_user: 256,
            persist: true,
            sweep_interval_seconds: 600,
        }
    }
}

/// Conversation history settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of turns kept per user.
    pub window: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self { window: 6 }
    }
}

/// Usage log settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// JSONL file receiving one record per question. `None` keeps counts in memory only.
    pub path: Option<PathBuf>,
    /// Number of repeats after which a question is flagged as frequent.
    pub frequent_threshold: u32,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("usage_log.jsonl")),
            frequent_threshold: 3,
        }
    }
}

/// Storage configuration for the vector database.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Chunk table name.
    pub chunk_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("rag_vectors.sqlite"),
            chunk_table: "rag_chunks".to_string(),
        }
    }
}

/// Embedding model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Ollama embedding model name.
    pub model: String,
    /// Embedding vector dimensions.
    pub ndims: usize,
    /// Optional custom base URL.
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            ndims: 768,
            base_url: None,
        }
    }
}

/// Completion model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama completion model name.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Optional max tokens.
    pub max_tokens: Option<u64>,
    /// Optional custom base URL.
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2:1b".to_string(),
            temperature: 0.4,
            max_tokens: Some(256),
            base_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RagConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let mut config = RagConfig::default();
        config.retrieval.top_k = 0;
        assert!(matches!(config.validate(), Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_unsafe_table_name() {
        let mut config = RagConfig::default();
        config.storage.chunk_table = "chunks; DROP TABLE x".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RagConfig =
            serde_json::from_str(r#"{"retrieval": {"top_k": 5}, "cache": {"persist": false}}"#)
                .unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.candidate_multiplier, 2);
        assert!(!config.cache.persist);
        assert_eq!(config.cache.max_entries_per_user, 256);
        assert!((config.fusion.rrf_k - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ollama_base_url_override() {
        let mut config = RagConfig::default();
        config.set_ollama_base_url("http://10.0.0.2:11434");
        assert_eq!(config.llm.base_url.as_deref(), Some("http://10.0.0.2:11434"));
        assert!(config.validate().is_ok());
    }
}
