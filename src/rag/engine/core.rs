//! RAG engine orchestration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::rag::cache::entry::{CachedAnswer, SourceRef};
use crate::rag::cache::user_cache::{CacheStats, UserCache};
use crate::rag::conversation::history::{ConversationStore, ConversationTurn};
use crate::rag::core::chunk::Chunk;
use crate::rag::core::config::RagConfig;
use crate::rag::core::errors::{RagError, RagResult};
use crate::rag::core::ids::{ChunkId, UserId};
use crate::rag::embedding::embedder::{Embedder, OllamaEmbedder};
use crate::rag::generation::generator::{AnswerGenerator, GenerationRequest, OllamaGenerator};
use crate::rag::retrieval::hybrid::{HybridRetriever, RetrievalMode};
use crate::rag::retrieval::keyword::Bm25Index;
use crate::rag::retrieval::query::rewrite_query;
use crate::rag::storage::sqlite_vec_loader::init_sqlite_vec_extension;
use crate::rag::storage::vector_store::{SqliteVectorChunkStore, VectorChunkStore};
use crate::rag::usage::usage_log::UsageLog;

/// Answer returned to a user.
#[derive(Clone, Debug, Serialize)]
pub struct Answer {
    /// Answer text.
    pub text: String,
    /// Chunks the answer is grounded on.
    pub sources: Vec<SourceRef>,
    /// Whether the answer came from the user's cache.
    pub cache_hit: bool,
    /// Query used for retrieval and caching.
    pub retrieval_query: String,
    /// Retrievers that contributed; `None` for cache hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<RetrievalMode>,
    /// Whether this user asks this question frequently.
    pub frequent: bool,
}

/// Engine status snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct EngineStatus {
    /// Chunks in the keyword index.
    pub indexed_chunks: usize,
    /// Chunks in the vector store, if it could be counted.
    pub vector_chunks: Option<usize>,
    /// Distinct terms in the keyword index.
    pub vocabulary: usize,
    /// Current corpus fingerprint.
    pub corpus_version: String,
    /// Whether answers are cached.
    pub cache_enabled: bool,
    /// Loaded cache occupancy.
    pub cache: CacheStats,
    /// Users with conversation history.
    pub conversations: usize,
    /// Generation model name.
    pub model: String,
    /// When the engine was created.
    pub started_at: DateTime<Utc>,
    /// Seconds since `started_at`.
    pub uptime_seconds: i64,
}

/// Backend dependencies for the RAG engine.
pub struct RagBackends {
    /// Vector store implementation.
    pub vector_store: Arc<dyn VectorChunkStore>,
    /// Embedding model wrapper.
    pub embedder: Arc<dyn Embedder>,
    /// Answer generator.
    pub generator: Arc<dyn AnswerGenerator>,
}

impl RagBackends {
    /// Build the default Ollama + `SQLite` backends from config.
    ///
    /// # Errors
    /// Returns an error if any backend cannot be initialized.
    pub async fn ollama_sqlite(config: &RagConfig) -> RagResult<Self> {
        init_sqlite_vec_extension();
        let vector_store = Arc::new(SqliteVectorChunkStore::new(config).await?);
        let embedder = Arc::new(OllamaEmbedder::new(&config.embedding)?);
        let generator = Arc::new(OllamaGenerator::new(&config.llm)?);

        Ok(Self {
            vector_store,
            embedder,
            generator,
        })
    }
}

/// Hybrid RAG engine with per-user caching.
pub struct RagEngine {
    config: RagConfig,
    keyword: Arc<RwLock<Bm25Index>>,
    retriever: HybridRetriever,
    vector_store: Arc<dyn VectorChunkStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn AnswerGenerator>,
    cache: UserCache,
    conversations: ConversationStore,
    usage: UsageLog,
    corpus_version: RwLock<String>,
    started_at: DateTime<Utc>,
}

impl RagEngine {
    /// Create a new engine.
    ///
    /// The keyword index is rebuilt from the chunks already in the vector
    /// store, so the corpus fingerprint is stable across restarts.
    ///
    /// # Errors
    /// Returns an error if configuration is invalid or the usage log cannot be read.
    pub async fn new(config: RagConfig, backends: RagBackends) -> RagResult<Self> {
        config.validate()?;

        let mut index = Bm25Index::new(config.keyword.clone());
        match backends.vector_store.all_chunks().await {
            Ok(chunks) => {
                for chunk in chunks {
                    index.insert(chunk);
                }
            }
            Err(err) => warn!(%err, "Could not reload stored chunks, keyword index starts empty"),
        }
        let corpus_version = index.fingerprint();
        info!(chunks = index.len(), corpus = %corpus_version, "Keyword index ready");

        let keyword = Arc::new(RwLock::new(index));
        let retriever = HybridRetriever::new(
            Arc::clone(&keyword),
            Arc::clone(&backends.vector_store),
            config.retrieval.clone(),
            config.fusion.clone(),
        );
        let usage = UsageLog::open(config.usage.clone()).await?;

        Ok(Self {
            cache: UserCache::new(config.cache.clone()),
            conversations: ConversationStore::new(config.conversation.window),
            usage,
            keyword,
            retriever,
            vector_store: backends.vector_store,
            embedder: backends.embedder,
            generator: backends.generator,
            corpus_version: RwLock::new(corpus_version),
            started_at: Utc::now(),
            config,
        })
    }

    /// Create a new engine using Ollama + `SQLite` backends.
    ///
    /// # Errors
    /// Returns an error if backends cannot be initialized.
    pub async fn from_config(config: RagConfig) -> RagResult<Self> {
        let backends = RagBackends::ollama_sqlite(&config).await?;
        Self::new(config, backends).await
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Current corpus fingerprint.
    pub async fn corpus_version(&self) -> String {
        self.corpus_version.read().await.clone()
    }

    /// Answer a question for a user.
    ///
    /// # Errors
    /// Returns `EmptyQuery` for blank input, or an error if retrieval or
    /// generation fails on a cache miss.
    pub async fn ask(&self, user: &UserId, text: &str) -> RagResult<Answer> {
        let question = text.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let history = self.conversations.recent(user);
        let retrieval_query = rewrite_query(question, &history);
        let corpus_version = self.corpus_version().await;

        let cached = self
            .cache
            .get(user, &retrieval_query, &corpus_version)
            .await;
        let (answer_text, sources, mode) = if let Some(cached) = cached {
            debug!(user = %user, hits = cached.hit_count, "Serving cached answer");
            (cached.answer, cached.sources, None)
        } else {
            match self
                .answer_fresh(user, question, &retrieval_query, history, corpus_version)
                .await
            {
                Ok((answer_text, sources, mode)) => (answer_text, sources, Some(mode)),
                Err(err) => {
                    self.record_usage(user, question, &format!("error: {err}")).await;
                    return Err(err);
                }
            }
        };
        let cache_hit = mode.is_none();

        self.conversations
            .record(user, ConversationTurn::new(question, answer_text.clone()));
        let outcome = if cache_hit { "cache_hit" } else { "ok" };
        let frequent = self.record_usage(user, question, outcome).await;

        info!(user = %user, cache_hit, frequent, "Answered question");
        Ok(Answer {
            text: answer_text,
            sources,
            cache_hit,
            retrieval_query,
            mode,
            frequent,
        })
    }

    async fn answer_fresh(
        &self,
        user: &UserId,
        question: &str,
        retrieval_query: &str,
        history: Vec<ConversationTurn>,
        corpus_version: String,
    ) -> RagResult<(String, Vec<SourceRef>, RetrievalMode)> {
        let outcome = self
            .retriever
            .search(retrieval_query, self.config.retrieval.top_k)
            .await?;
        let sources: Vec<SourceRef> = outcome.hits.iter().map(SourceRef::from).collect();

        let answer_text = self
            .generator
            .generate(GenerationRequest {
                question: question.to_string(),
                retrieval_query: retrieval_query.to_string(),
                context: outcome.hits,
                history,
            })
            .await?;

        let entry = CachedAnswer::new(
            retrieval_query,
            answer_text.clone(),
            sources.clone(),
            corpus_version,
        );
        if let Err(err) = self.cache.put(user, retrieval_query, entry).await {
            warn!(user = %user, %err, "Failed to cache answer");
        }

        Ok((answer_text, sources, outcome.mode))
    }

    /// Returns whether the question is now frequent for this user.
    async fn record_usage(&self, user: &UserId, question: &str, outcome: &str) -> bool {
        match self.usage.record(user, question, outcome).await {
            Ok(count) => self.usage.is_frequent(count),
            Err(err) => {
                warn!(user = %user, %err, "Failed to record usage");
                false
            }
        }
    }

    /// Embed and index pre-chunked documents. Returns the number of indexed chunks.
    ///
    /// Cached answers computed against the previous corpus become stale.
    /// If storage fails part way, the chunks stored before the failure stay
    /// searchable by keyword too.
    ///
    /// # Errors
    /// Returns an error if embedding or vector storage fails.
    pub async fn index_chunks(&self, chunks: Vec<Chunk>) -> RagResult<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = self.embedder.embed_texts(texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::RetrievalUnavailable(format!(
                "embedder returned {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let requested = chunks.len();
        let mut stored = Vec::with_capacity(requested);
        let mut failure = None;
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            match self.vector_store.upsert(chunk.clone(), embedding).await {
                Ok(()) => stored.push(chunk),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let count = stored.len();
        if count > 0 {
            self.change_corpus(|index| {
                for chunk in stored {
                    index.insert(chunk);
                }
            })
            .await;
        }

        if let Some(err) = failure {
            warn!(count, requested, %err, "Indexing stopped early");
            return Err(err);
        }
        info!(count, "Indexed chunks");
        Ok(count)
    }

    /// Remove chunks from both indexes. Returns how many were in the keyword index.
    ///
    /// # Errors
    /// Returns an error if the vector store deletion fails.
    pub async fn remove_chunks(&self, ids: Vec<ChunkId>) -> RagResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.vector_store.delete_by_ids(ids.clone()).await?;
        let removed = self
            .change_corpus(|index| ids.iter().filter(|id| index.remove(id)).count())
            .await;

        info!(removed, "Removed chunks");
        Ok(removed)
    }

    /// Apply a change to the keyword index and publish the new fingerprint.
    ///
    /// The version is written while the index is still locked, so concurrent
    /// changes publish their fingerprints in the order they were applied.
    async fn change_corpus<R>(&self, change: impl FnOnce(&mut Bm25Index) -> R) -> R {
        let mut index = self.keyword.write().await;
        let result = change(&mut index);
        *self.corpus_version.write().await = index.fingerprint();
        result
    }

    /// Forget a user's cached answers and conversation history.
    ///
    /// # Errors
    /// Returns an error if the user's cache file cannot be removed.
    pub async fn clear_user(&self, user: &UserId) -> RagResult<()> {
        self.cache.invalidate_user(user).await?;
        self.conversations.clear(user);
        info!(user = %user, "Cleared user state");
        Ok(())
    }

    /// Purge expired and stale cache entries. Returns the number removed.
    pub async fn purge_cache(&self) -> usize {
        let corpus_version = self.corpus_version().await;
        let removed = self.cache.purge(Utc::now(), &corpus_version).await;
        if removed > 0 {
            debug!(removed, "Purged cache entries");
        }
        removed
    }

    /// Snapshot of index, cache and conversation state.
    pub async fn status(&self) -> EngineStatus {
        let (indexed_chunks, vocabulary) = {
            let index = self.keyword.read().await;
            (index.len(), index.vocabulary_size())
        };
        let vector_chunks = match self.vector_store.count().await {
            Ok(count) => Some(count),
            Err(err) => {
                warn!(%err, "Failed to count vector chunks");
                None
            }
        };

        EngineStatus {
            indexed_chunks,
            vector_chunks,
            vocabulary,
            corpus_version: self.corpus_version().await,
            cache_enabled: self.cache.is_enabled(),
            cache: self.cache.stats().await,
            conversations: self.conversations.users(),
            model: self.generator.model_name().to_string(),
            started_at: self.started_at,
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Engine wired to in-memory fakes.

    use std::path::PathBuf;
    use std::sync::Arc;

    use uuid::Uuid;

    use super::{RagBackends, RagEngine};
    use crate::rag::core::config::RagConfig;
    use crate::rag::generation::generator::testing::EchoGenerator;
    use crate::rag::storage::memory_store::InMemoryVectorStore;
    use crate::rag::storage::memory_store::testing::BagOfWordsEmbedder;

    pub(crate) fn test_config() -> (RagConfig, PathBuf) {
        let dir = std::env::temp_dir().join(format!("hybrid_rag_engine_{}", Uuid::new_v4()));
        let mut config = RagConfig::default();
        config.cache.dir = dir.join("user_caches");
        config.usage.path = None;
        (config, dir)
    }

    pub(crate) fn fake_backends(store: Arc<InMemoryVectorStore>) -> RagBackends {
        RagBackends {
            vector_store: store,
            embedder: Arc::new(BagOfWordsEmbedder),
            generator: Arc::new(EchoGenerator),
        }
    }

    pub(crate) async fn test_engine() -> (RagEngine, PathBuf) {
        let (config, dir) = test_config();
        let store = Arc::new(InMemoryVectorStore::new(Arc::new(BagOfWordsEmbedder)));
        let engine = RagEngine::new(config, fake_backends(store)).await.unwrap();
        (engine, dir)
    }
}
