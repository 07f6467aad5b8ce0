//! Append-only usage log with per-user question counts.
//!
//! Each asked question becomes one JSON line. Counts are keyed by user and
//! normalized question, seeded from the existing log at startup.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::rag::core::config::UsageConfig;
use crate::rag::core::errors::RagResult;
use crate::rag::core::ids::UserId;
use crate::rag::retrieval::query::normalize_query;

/// One line of the usage log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Time the question was answered.
    pub ts: DateTime<Utc>,
    /// Asking user.
    pub user_id: String,
    /// Question as asked.
    pub query: String,
    /// Outcome label (`ok`, `cache_hit`, `error: …`).
    pub outcome: String,
}

/// Usage log and frequency counter.
pub struct UsageLog {
    config: UsageConfig,
    counts: DashMap<(UserId, String), u32>,
    writer: Mutex<()>,
}

impl UsageLog {
    /// Open the log and seed counts from its existing lines.
    ///
    /// Malformed lines and lines with invalid user ids are skipped.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read.
    pub async fn open(config: UsageConfig) -> RagResult<Self> {
        let counts = DashMap::new();

        if let Some(path) = &config.path {
            match tokio::fs::read_to_string(path).await {
                Ok(raw) => {
                    let mut skipped = 0_usize;
                    for line in raw.lines().filter(|line| !line.trim().is_empty()) {
                        let Ok(record) = serde_json::from_str::<UsageRecord>(line) else {
                            skipped += 1;
                            continue;
                        };
                        let Ok(user) = UserId::new(&record.user_id) else {
                            skipped += 1;
                            continue;
                        };
                        *counts
                            .entry((user, normalize_query(&record.query)))
                            .or_insert(0_u32) += 1;
                    }
                    if skipped > 0 {
                        warn!(path = %path.display(), skipped, "Skipped malformed usage log lines");
                    }
                    debug!(path = %path.display(), questions = counts.len(), "Seeded usage counts");
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        Ok(Self {
            config,
            counts,
            writer: Mutex::new(()),
        })
    }

    /// Record a question and return how many times this user has asked it.
    ///
    /// # Errors
    /// Returns an error if the log line cannot be appended.
    pub async fn record(&self, user: &UserId, query: &str, outcome: &str) -> RagResult<u32> {
        let count = {
            let mut count = self
                .counts
                .entry((user.clone(), normalize_query(query)))
                .or_insert(0);
            *count += 1;
            *count
        };

        if let Some(path) = &self.config.path {
            let record = UsageRecord {
                ts: Utc::now(),
                user_id: user.to_string(),
                query: query.to_string(),
                outcome: outcome.to_string(),
            };
            let mut line = serde_json::to_string(&record)?;
            line.push('\n');

            let _guard = self.writer.lock().await;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
        }

        Ok(count)
    }

    /// How many times `user` asked `query` so far.
    #[must_use]
    pub fn count(&self, user: &UserId, query: &str) -> u32 {
        self.counts
            .get(&(user.clone(), normalize_query(query)))
            .map_or(0, |count| *count)
    }

    /// Whether a count reaches the frequent-question threshold.
    #[must_use]
    pub const fn is_frequent(&self, count: u32) -> bool {
        count >= self.config.frequent_threshold
    }
}
