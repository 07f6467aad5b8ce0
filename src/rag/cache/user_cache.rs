//! Per-user answer cache with LRU eviction, TTL and corpus-version checks.
//!
//! Each user owns one shard guarded by its own async mutex, so users never
//! contend with each other and a user's file writes are serialized.

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lru::LruCache;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::rag::cache::entry::CachedAnswer;
use crate::rag::cache::key::cache_key;
use crate::rag::cache::persistence::{load_entries, remove_file, save_entries};
use crate::rag::core::config::CacheConfig;
use crate::rag::core::errors::RagResult;
use crate::rag::core::ids::UserId;

/// Cache occupancy snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Users with a loaded shard.
    pub users: usize,
    /// Entries across loaded shards.
    pub entries: usize,
}

struct UserShard {
    entries: LruCache<String, CachedAnswer>,
    loaded: bool,
}

impl UserShard {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            loaded: false,
        }
    }

    /// Entries from least to most recently used.
    fn snapshot(&self) -> Vec<(String, CachedAnswer)> {
        self.entries
            .iter()
            .rev()
            .map(|(key, answer)| (key.clone(), answer.clone()))
            .collect()
    }

    fn purge(&mut self, now: DateTime<Utc>, ttl_seconds: u64, corpus_version: &str) -> usize {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, answer)| !answer.is_fresh(now, ttl_seconds, corpus_version))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.entries.pop(key);
        }
        stale.len()
    }
}

/// Answer cache isolated per user.
pub struct UserCache {
    config: CacheConfig,
    capacity: NonZeroUsize,
    shards: DashMap<UserId, Arc<Mutex<UserShard>>>,
}

impl UserCache {
    /// Create a cache. Shards are loaded lazily from `config.dir`.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries_per_user).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            capacity,
            shards: DashMap::new(),
        }
    }

    /// Whether caching is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Look up a fresh answer for `query`.
    ///
    /// Expired entries and entries computed against another corpus version
    /// are evicted and reported as a miss.
    pub async fn get(
        &self,
        user: &UserId,
        query: &str,
        corpus_version: &str,
    ) -> Option<CachedAnswer> {
        if !self.config.enabled {
            return None;
        }

        let key = cache_key(query);
        let handle = self.shard(user);
        let mut shard = handle.lock().await;
        self.ensure_loaded(user, &mut shard).await;

        let fresh = shard
            .entries
            .peek(&key)
            .map(|answer| answer.is_fresh(Utc::now(), self.config.ttl_seconds, corpus_version))?;
        if !fresh {
            shard.entries.pop(&key);
            debug!(user = %user, key = %key, "Evicted stale cache entry");
            return None;
        }

        let answer = shard.entries.get_mut(&key)?;
        answer.hit_count += 1;
        Some(answer.clone())
    }

    /// Store an answer for `query`, evicting the least recently used entry at capacity.
    ///
    /// # Errors
    /// Returns an error if the shard cannot be written to disk.
    pub async fn put(&self, user: &UserId, query: &str, answer: CachedAnswer) -> RagResult<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let handle = self.shard(user);
        let mut shard = handle.lock().await;
        self.ensure_loaded(user, &mut shard).await;
        shard.entries.put(cache_key(query), answer);

        if self.config.persist {
            save_entries(&self.config.dir, user, shard.snapshot()).await?;
        }
        Ok(())
    }

    /// Drop every entry of a user, in memory and on disk.
    ///
    /// The shard stays registered and is marked loaded, so requests queued
    /// behind the invalidation see an empty cache instead of reloading the file.
    ///
    /// # Errors
    /// Returns an error if the user's file cannot be removed.
    pub async fn invalidate_user(&self, user: &UserId) -> RagResult<()> {
        let handle = self.shard(user);
        let mut shard = handle.lock().await;
        shard.entries.clear();
        shard.loaded = true;
        if self.config.persist {
            remove_file(&self.config.dir, user).await?;
        }
        debug!(user = %user, "Invalidated user cache");
        Ok(())
    }

    /// Remove expired and stale entries from loaded shards.
    ///
    /// Returns the number of removed entries. Shards that changed are
    /// persisted again; write failures are logged.
    pub async fn purge(&self, now: DateTime<Utc>, corpus_version: &str) -> usize {
        let handles: Vec<(UserId, Arc<Mutex<UserShard>>)> = self
            .shards
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut removed = 0;
        for (user, handle) in handles {
            let mut shard = handle.lock().await;
            let count = shard.purge(now, self.config.ttl_seconds, corpus_version);
            if count == 0 {
                continue;
            }
            removed += count;
            if self.config.persist {
                if let Err(err) = save_entries(&self.config.dir, &user, shard.snapshot()).await {
                    warn!(user = %user, %err, "Failed to persist purged cache shard");
                }
            }
        }
        removed
    }

    /// Count loaded users and entries.
    pub async fn stats(&self) -> CacheStats {
        let handles: Vec<Arc<Mutex<UserShard>>> = self
            .shards
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut entries = 0;
        for handle in &handles {
            entries += handle.lock().await.entries.len();
        }
        CacheStats {
            users: handles.len(),
            entries,
        }
    }

    fn shard(&self, user: &UserId) -> Arc<Mutex<UserShard>> {
        Arc::clone(
            self.shards
                .entry(user.clone())
                .or_insert_with(|| Arc::new(Mutex::new(UserShard::new(self.capacity))))
                .value(),
        )
    }

    async fn ensure_loaded(&self, user: &UserId, shard: &mut UserShard) {
        if shard.loaded {
            return;
        }
        shard.loaded = true;
        if !self.config.persist {
            return;
        }

        match load_entries(&self.config.dir, user).await {
            Ok(entries) => {
                for (key, answer) in entries {
                    shard.entries.put(key, answer);
                }
            }
            Err(err) => warn!(user = %user, %err, "Failed to load cache shard, starting empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use chrono::Duration;
    use uuid::Uuid;

    use super::*;
    use crate::rag::cache::persistence::cache_path;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("hybrid_rag_cache_{}", Uuid::new_v4()))
    }

    fn config(dir: &Path) -> CacheConfig {
        CacheConfig {
            dir: dir.to_path_buf(),
            ..CacheConfig::default()
        }
    }

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    fn answer(query: &str) -> CachedAnswer {
        CachedAnswer::new(query, format!("answer to {query}"), Vec::new(), "v1")
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let dir = temp_dir();
        let cache = UserCache::new(config(&dir));
        cache.put(&user("alice"), "what is rrf", answer("what is rrf")).await.unwrap();

        assert!(cache.get(&user("alice"), "what is rrf", "v1").await.is_some());
        assert!(cache.get(&user("bob"), "what is rrf", "v1").await.is_none());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_normalized_query_hits_and_counts() {
        let dir = temp_dir();
        let cache = UserCache::new(config(&dir));
        let alice = user("alice");
        cache.put(&alice, "What is RRF?", answer("What is RRF?")).await.unwrap();

        let first = cache.get(&alice, "  what is   rrf? ", "v1").await.unwrap();
        assert_eq!(first.hit_count, 1);
        let second = cache.get(&alice, "WHAT IS RRF?", "v1").await.unwrap();
        assert_eq!(second.hit_count, 2);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let dir = temp_dir();
        let cache = UserCache::new(CacheConfig {
            ttl_seconds: 60,
            ..config(&dir)
        });
        let alice = user("alice");
        let mut old = answer("q");
        old.created_at = Utc::now() - Duration::seconds(120);
        cache.put(&alice, "q", old).await.unwrap();

        assert!(cache.get(&alice, "q", "v1").await.is_none());
        assert_eq!(cache.stats().await.entries, 0);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_corpus_change_is_a_miss() {
        let dir = temp_dir();
        let cache = UserCache::new(config(&dir));
        let alice = user("alice");
        cache.put(&alice, "q", answer("q")).await.unwrap();

        assert!(cache.get(&alice, "q", "v2").await.is_none());
        assert!(cache.get(&alice, "q", "v1").await.is_none());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_lru_evicts_least_recently_used() {
        let dir = temp_dir();
        let cache = UserCache::new(CacheConfig {
            max_entries_per_user: 2,
            ..config(&dir)
        });
        let alice = user("alice");
        cache.put(&alice, "a", answer("a")).await.unwrap();
        cache.put(&alice, "b", answer("b")).await.unwrap();
        assert!(cache.get(&alice, "a", "v1").await.is_some());
        cache.put(&alice, "c", answer("c")).await.unwrap();

        assert!(cache.get(&alice, "a", "v1").await.is_some());
        assert!(cache.get(&alice, "b", "v1").await.is_none());
        assert!(cache.get(&alice, "c", "v1").await.is_some());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_entries_survive_restart_in_lru_order() {
        let dir = temp_dir();
        let alice = user("alice");
        {
            let cache = UserCache::new(CacheConfig {
                max_entries_per_user: 2,
                ..config(&dir)
            });
            cache.put(&alice, "a", answer("a")).await.unwrap();
            cache.put(&alice, "b", answer("b")).await.unwrap();
            cache.put(&alice, "a", answer("a")).await.unwrap();
        }

        let cache = UserCache::new(CacheConfig {
            max_entries_per_user: 2,
            ..config(&dir)
        });
        cache.put(&alice, "c", answer("c")).await.unwrap();
        assert!(cache.get(&alice, "a", "v1").await.is_some());
        assert!(cache.get(&alice, "b", "v1").await.is_none());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_invalidate_user_removes_file() {
        let dir = temp_dir();
        let cache = UserCache::new(config(&dir));
        let alice = user("alice");
        cache.put(&alice, "q", answer("q")).await.unwrap();
        assert!(cache_path(&dir, &alice).exists());

        cache.invalidate_user(&alice).await.unwrap();
        assert!(!cache_path(&dir, &alice).exists());
        assert!(cache.get(&alice, "q", "v1").await.is_none());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_invalidate_user_orders_with_queued_requests() {
        let dir = temp_dir();
        let cache = Arc::new(UserCache::new(config(&dir)));
        let alice = user("alice");
        cache.put(&alice, "q", answer("q")).await.unwrap();

        let handle = cache.shard(&alice);
        let guard = handle.lock().await;

        let invalidate = tokio::spawn({
            let cache = Arc::clone(&cache);
            let alice = alice.clone();
            async move { cache.invalidate_user(&alice).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let lookup = tokio::spawn({
            let cache = Arc::clone(&cache);
            let alice = alice.clone();
            async move { cache.get(&alice, "q", "v1").await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        drop(guard);
        invalidate.await.unwrap().unwrap();
        assert!(lookup.await.unwrap().is_none());
        assert!(cache.get(&alice, "q", "v1").await.is_none());
        assert!(!cache_path(&dir, &alice).exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_invalidated_user_can_cache_again() {
        let dir = temp_dir();
        let cache = UserCache::new(config(&dir));
        let alice = user("alice");
        cache.put(&alice, "old", answer("old")).await.unwrap();
        cache.invalidate_user(&alice).await.unwrap();

        cache.put(&alice, "new", answer("new")).await.unwrap();
        let reloaded = UserCache::new(config(&dir));
        assert!(reloaded.get(&alice, "old", "v1").await.is_none());
        assert!(reloaded.get(&alice, "new", "v1").await.is_some());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_purge_removes_stale_entries() {
        let dir = temp_dir();
        let cache = UserCache::new(config(&dir));
        cache.put(&user("alice"), "q", answer("q")).await.unwrap();
        cache.put(&user("bob"), "q", answer("q")).await.unwrap();

        assert_eq!(cache.purge(Utc::now(), "v1").await, 0);
        assert_eq!(cache.purge(Utc::now(), "v2").await, 2);
        assert_eq!(
            cache.stats().await,
            CacheStats {
                users: 2,
                entries: 0
            }
        );
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let dir = temp_dir();
        let cache = UserCache::new(CacheConfig {
            enabled: false,
            ..config(&dir)
        });
        let alice = user("alice");
        cache.put(&alice, "q", answer("q")).await.unwrap();
        assert!(cache.get(&alice, "q", "v1").await.is_none());
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_memory_only_cache_writes_nothing() {
        let dir = temp_dir();
        let cache = UserCache::new(CacheConfig {
            persist: false,
            ..config(&dir)
        });
        let alice = user("alice");
        cache.put(&alice, "q", answer("q")).await.unwrap();
        assert!(cache.get(&alice, "q", "v1").await.is_some());
        assert!(!dir.exists());
    }
}
