//! Cache trait definitions

use crate::types::{NationalityResult, PlaceResolution, ResolutionKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Namespace of a cache entry. Nationality and place keys live side by side
/// without colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Nationality,
    Place,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nationality => "nationality",
            Self::Place => "place",
        }
    }
}

/// A stored resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CachedValue {
    Nationality(NationalityResult),
    Places(PlaceResolution),
}

impl CachedValue {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Nationality(_) => EntryKind::Nationality,
            Self::Places(_) => EntryKind::Place,
        }
    }
}

/// A cache row as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: ResolutionKey,
    pub value: CachedValue,
    pub written_at: DateTime<Utc>,
}

/// Persistent memo of resolutions.
///
/// Implementations must be thread-safe and serialize concurrent writers
/// themselves: callers never hold a handle to the underlying store. A write
/// replaces any previous value for the same key as a whole.
pub trait ResolutionCache: Send + Sync {
    /// Look up a key. Unreadable entries are reported as misses.
    fn get(&self, kind: EntryKind, key: &ResolutionKey) -> CacheResult<Option<CacheEntry>>;

    /// Store a value, overwriting any previous entry for the key.
    fn put(&self, key: &ResolutionKey, value: &CachedValue) -> CacheResult<()>;

    /// Number of stored entries.
    fn len(&self) -> CacheResult<usize>;

    fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Typed nationality lookup.
    fn get_nationality(&self, key: &ResolutionKey) -> CacheResult<Option<NationalityResult>> {
        Ok(self
            .get(EntryKind::Nationality, key)?
            .and_then(|entry| match entry.value {
                CachedValue::Nationality(result) => Some(result),
                CachedValue::Places(_) => None,
            }))
    }

    /// Typed place-set lookup.
    fn get_places(&self, key: &ResolutionKey) -> CacheResult<Option<PlaceResolution>> {
        Ok(self
            .get(EntryKind::Place, key)?
            .and_then(|entry| match entry.value {
                CachedValue::Places(result) => Some(result),
                CachedValue::Nationality(_) => None,
            }))
    }
}

/// Extension trait for opening caches from paths
pub trait OpenCache: ResolutionCache + Sized {
    /// Open or create a cache at the given path
    fn open(path: impl AsRef<Path>) -> CacheResult<Self>;

    /// Create an in-memory cache (useful for testing)
    fn open_in_memory() -> CacheResult<Self>;
}
