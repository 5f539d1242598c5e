//! Persistent resolution cache
//!
//! Remote and AI tiers are slow and non-deterministic, so every final result
//! is memoized here. Once a key is stored, lookups for it never reach a
//! resolver again. The primary implementation is `SqliteCache`.

mod sqlite;
mod traits;

pub use sqlite::SqliteCache;
pub use traits::{
    CacheEntry, CacheError, CacheResult, CachedValue, EntryKind, OpenCache, ResolutionCache,
};
