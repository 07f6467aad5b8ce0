//! Per-user answer cache with JSON persistence.

pub mod entry;
pub mod key;
pub mod persistence;
pub mod user_cache;

pub use entry::{CachedAnswer, SourceRef};
pub use key::cache_key;
pub use user_cache::{CacheStats, UserCache};
