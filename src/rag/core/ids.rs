//! Identifier types for the RAG engine.
//!
//! `ChunkId` is a UUID newtype generated at indexing time. `UserId` is a
//! caller-supplied name; it doubles as the per-user cache file stem, so
//! its character set is restricted at construction.
//!
//! ## Cargo features used by this module
//! - `uuid_v7`: enables `UUIDv7` generation via `uuid/v7`.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate an ID intended to have good DB insert locality.
///
/// With feature `uuid_v7` enabled, this uses `Uuid::now_v7()`.
/// Otherwise it falls back to `Uuid::new_v4()`.
#[inline]
#[must_use]
fn uuid_time_ordered() -> Uuid {
    #[cfg(feature = "uuid_v7")]
    {
        Uuid::now_v7()
    }
    #[cfg(not(feature = "uuid_v7"))]
    {
        Uuid::new_v4()
    }
}

/// Stable identifier of an indexed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ChunkId(pub Uuid);

impl Default for ChunkId {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkId {
    /// Create a new identifier.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(uuid_time_ordered())
    }

    /// Wrap an existing UUID.
    #[inline]
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Borrow the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ChunkId {
    #[inline]
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for ChunkId {
    type Err = uuid::Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ===== User IDs =============================================================

/// Reasons a raw string is rejected as a [`UserId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIdError {
    /// Empty after trimming.
    Empty,
    /// Longer than [`UserId::MAX_LEN`] bytes.
    TooLong {
        /// Maximum accepted length.
        max: usize,
        /// Actual length.
        got: usize,
    },
    /// Character outside `[A-Za-z0-9_.-]`.
    InvalidChar {
        /// Offending character.
        ch: char,
        /// Character index.
        index: usize,
    },
    /// `.` or `..`, which would resolve outside the cache directory.
    Reserved,
}

impl fmt::Display for UserIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "user id must not be empty"),
            Self::TooLong { max, got } => write!(f, "user id too long: got {got}, max {max}"),
            Self::InvalidChar { ch, index } => {
                write!(f, "user id contains invalid character {ch:?} at index {index}")
            }
            Self::Reserved => write!(f, "user id must not be a relative path component"),
        }
    }
}

impl std::error::Error for UserIdError {}

/// Identity that owns a cache shard and a conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Maximum length in bytes.
    pub const MAX_LEN: usize = 64;

    /// Validate and wrap a user identifier.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, reserved, or contains
    /// characters outside `[A-Za-z0-9_.-]`.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, UserIdError> {
        let s = raw.as_ref().trim();

        if s.is_empty() {
            return Err(UserIdError::Empty);
        }
        if s.len() > Self::MAX_LEN {
            return Err(UserIdError::TooLong {
                max: Self::MAX_LEN,
                got: s.len(),
            });
        }
        if s == "." || s == ".." {
            return Err(UserIdError::Reserved);
        }

        for (i, ch) in s.chars().enumerate() {
            if !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')) {
                return Err(UserIdError::InvalidChar { ch, index: i });
            }
        }

        Ok(Self(s.to_owned()))
    }

    /// Borrow as `&str`.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserId {
    type Err = UserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = UserIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_accepts_names() {
        let id = UserId::new("  Dwijas  ").unwrap();
        assert_eq!(id.as_str(), "Dwijas");
        assert!(UserId::new("team.alpha-01_x").is_ok());
    }

    #[test]
    fn test_user_id_rejects_path_traversal() {
        assert_eq!(UserId::new(".."), Err(UserIdError::Reserved));
        assert!(matches!(
            UserId::new("../etc/passwd"),
            Err(UserIdError::InvalidChar { ch: '/', .. })
        ));
        assert_eq!(UserId::new(""), Err(UserIdError::Empty));
    }

    #[test]
    fn test_user_id_rejects_long_ids() {
        let raw = "a".repeat(UserId::MAX_LEN + 1);
        assert!(matches!(UserId::new(raw), Err(UserIdError::TooLong { .. })));
    }

    #[test]
    fn test_user_id_deserialize_validates() {
        let ok: UserId = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(ok.as_str(), "alice");
        assert!(serde_json::from_str::<UserId>("\"a/b\"").is_err());
    }

    #[test]
    fn test_chunk_id_roundtrip_str() {
        let id = ChunkId::new();
        let parsed: ChunkId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
