//! Background sweeper for expired and stale cache entries.
//!
//! Lookups already skip expired entries; the sweeper keeps loaded shards
//! and their files from accumulating entries nobody asks for again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::rag::engine::core::RagEngine;

/// Statistics from a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Number of cache entries removed.
    pub removed: usize,
    /// Sweep duration in milliseconds.
    pub duration_ms: u64,
}

/// Periodic cache purge worker.
pub struct CacheSweeper {
    engine: Arc<RagEngine>,
    interval: Duration,
    enabled: bool,
    shutdown: Arc<Notify>,
}

impl CacheSweeper {
    /// Create a sweeper using the engine's cache settings.
    #[must_use]
    pub fn new(engine: Arc<RagEngine>) -> Self {
        let cache = &engine.config().cache;
        let interval = Duration::from_secs(cache.sweep_interval_seconds);
        let enabled = cache.enabled;
        Self {
            engine,
            interval,
            enabled,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Override the sweep interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Get a shutdown notifier to stop the sweeper.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the sweeper as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.enabled {
            info!("Cache sweeper is disabled");
            return;
        }

        info!(interval = ?self.interval, "Starting cache sweeper");
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.interval) => {
                    let stats = self.sweep_once().await;
                    if stats.removed > 0 {
                        info!(removed = stats.removed, duration_ms = stats.duration_ms, "Cache sweep completed");
                    } else {
                        debug!("Cache sweep found nothing to remove");
                    }
                }
                () = self.shutdown.notified() => {
                    info!("Cache sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// Run a single sweep.
    pub async fn sweep_once(&self) -> SweepStats {
        let start = Instant::now();
        let removed = self.engine.purge_cache().await;
        SweepStats {
            removed,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::core::chunk::Chunk;
    use crate::rag::core::ids::UserId;
    use crate::rag::engine::core::testing::test_engine;

    #[tokio::test]
    async fn test_sweep_removes_stale_entries() {
        let (engine, dir) = test_engine().await;
        let engine = Arc::new(engine);
        let chunks = Chunk::batch("a.md", &["tokio runtime basics".to_string()]).unwrap();
        let id = chunks[0].id;
        engine.index_chunks(chunks).await.unwrap();
        engine
            .ask(&UserId::new("alice").unwrap(), "explain the tokio runtime basics")
            .await
            .unwrap();

        let sweeper = CacheSweeper::new(Arc::clone(&engine));
        assert_eq!(sweeper.sweep_once().await.removed, 0);

        engine.remove_chunks(vec![id]).await.unwrap();
        assert_eq!(sweeper.sweep_once().await.removed, 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let (engine, dir) = test_engine().await;
        let sweeper =
            CacheSweeper::new(Arc::new(engine)).with_interval(Duration::from_millis(10));
        let shutdown = sweeper.shutdown_notifier();
        let handle = sweeper.spawn();

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        let _ = std::fs::remove_dir_all(dir);
    }
}
