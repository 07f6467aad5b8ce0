//! JSON persistence for per-user cache shards.
//!
//! One file per user: `{dir}/{user_id}.json`. Writes go to a temporary file
//! that is renamed over the target, so a crash never leaves a half-written
//! shard behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::rag::cache::entry::CachedAnswer;
use crate::rag::core::errors::RagResult;
use crate::rag::core::ids::UserId;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    user_id: String,
    entries: Vec<PersistedEntry>,
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    key: String,
    answer: CachedAnswer,
}

/// Path of a user's cache file.
#[must_use]
pub fn cache_path(dir: &Path, user: &UserId) -> PathBuf {
    dir.join(format!("{user}.json"))
}

/// Load a user's entries, least recently used first.
///
/// A missing file is an empty shard. Corrupt files, unknown versions and
/// files written for another user are logged and treated as empty.
///
/// # Errors
/// Returns an error only if the file exists but cannot be read.
pub async fn load_entries(dir: &Path, user: &UserId) -> RagResult<Vec<(String, CachedAnswer)>> {
    let path = cache_path(dir, user);
    let raw = match tokio::fs::read(&path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let file: CacheFile = match serde_json::from_slice(&raw) {
        Ok(file) => file,
        Err(err) => {
            warn!(path = %path.display(), %err, "Ignoring corrupt cache file");
            return Ok(Vec::new());
        }
    };

    if file.version != FORMAT_VERSION {
        warn!(path = %path.display(), version = file.version, "Ignoring cache file with unknown version");
        return Ok(Vec::new());
    }
    if file.user_id != user.as_str() {
        warn!(path = %path.display(), owner = %file.user_id, "Ignoring cache file owned by another user");
        return Ok(Vec::new());
    }

    debug!(user = %user, entries = file.entries.len(), "Loaded cache shard");
    Ok(file
        .entries
        .into_iter()
        .map(|entry| (entry.key, entry.answer))
        .collect())
}

/// Atomically write a user's entries, least recently used first.
///
/// # Errors
/// Returns an error if the directory or file cannot be written.
pub async fn save_entries(
    dir: &Path,
    user: &UserId,
    entries: Vec<(String, CachedAnswer)>,
) -> RagResult<()> {
    tokio::fs::create_dir_all(dir).await?;

    let file = CacheFile {
        version: FORMAT_VERSION,
        user_id: user.to_string(),
        entries: entries
            .into_iter()
            .map(|(key, answer)| PersistedEntry { key, answer })
            .collect(),
    };
    let bytes = serde_json::to_vec_pretty(&file)?;

    let path = cache_path(dir, user);
    let tmp = dir.join(format!("{user}.json.tmp"));
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

/// Delete a user's cache file. A missing file is not an error.
///
/// # Errors
/// Returns an error if the file exists but cannot be removed.
pub async fn remove_file(dir: &Path, user: &UserId) -> RagResult<()> {
    match tokio::fs::remove_file(cache_path(dir, user)).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
