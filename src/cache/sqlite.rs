//! SQLite cache backend

use super::traits::{
    CacheEntry, CacheError, CacheResult, CachedValue, EntryKind, OpenCache, ResolutionCache,
};
use crate::types::ResolutionKey;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::warn;

/// SQLite-backed resolution cache
///
/// One table keyed by `(kind, key)`. The single connection sits behind a
/// mutex, so every read and write is serialized at this boundary; SQLite's
/// transactional writes keep an interrupted write from leaving a torn row.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    fn init_schema(conn: &Connection) -> CacheResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS resolution_cache (
                kind TEXT NOT NULL,
                key TEXT NOT NULL,
                value_json TEXT NOT NULL,
                written_at TEXT NOT NULL,
                PRIMARY KEY (kind, key)
            );

            -- Readers in other processes keep working while this one writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    /// Lock the connection. A panic in another holder cannot leave SQLite
    /// mid-write, so a poisoned lock is still usable.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn decode_entry(
        key: &ResolutionKey,
        value_json: &str,
        written_at: &str,
    ) -> CacheResult<CacheEntry> {
        let value: CachedValue = serde_json::from_str(value_json)?;
        let written_at = DateTime::parse_from_rfc3339(written_at)
            .map_err(|e| CacheError::DateParse(e.to_string()))?
            .with_timezone(&Utc);
        Ok(CacheEntry {
            key: key.clone(),
            value,
            written_at,
        })
    }
}

impl OpenCache for SqliteCache {
    fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ResolutionCache for SqliteCache {
    fn get(&self, kind: EntryKind, key: &ResolutionKey) -> CacheResult<Option<CacheEntry>> {
        let row: Option<(String, String)> = {
            let conn = self.conn();
            conn.query_row(
                "SELECT value_json, written_at FROM resolution_cache WHERE kind = ?1 AND key = ?2",
                params![kind.as_str(), key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        };

        let Some((value_json, written_at)) = row else {
            return Ok(None);
        };

        match Self::decode_entry(key, &value_json, &written_at) {
            Ok(entry) if entry.value.kind() == kind => Ok(Some(entry)),
            Ok(_) => {
                warn!(%key, kind = kind.as_str(), "cache entry holds a different kind; treating as miss");
                Ok(None)
            }
            Err(e) => {
                warn!(%key, kind = kind.as_str(), error = %e, "unreadable cache entry; treating as miss");
                Ok(None)
            }
        }
    }

    fn put(&self, key: &ResolutionKey, value: &CachedValue) -> CacheResult<()> {
        let value_json = serde_json::to_string(value)?;
        let written_at = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO resolution_cache (kind, key, value_json, written_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(kind, key) DO UPDATE SET
                value_json = excluded.value_json,
                written_at = excluded.written_at
            "#,
            params![value.kind().as_str(), key.as_str(), value_json, written_at],
        )?;
        Ok(())
    }

    fn len(&self) -> CacheResult<usize> {
        let conn = self.conn();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM resolution_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Confidence, NationalityResult, PlaceKind, PlaceResolution, PlaceResult, PlaceSource,
        PostalCheck,
    };
    use std::sync::Arc;

    fn create_test_cache() -> SqliteCache {
        SqliteCache::open_in_memory().expect("Failed to create in-memory cache")
    }

    fn argentina() -> NationalityResult {
        NationalityResult::new(true, "Argentina", Confidence::High)
    }

    fn sample_places() -> PlaceResolution {
        PlaceResolution {
            locality: PlaceResult::found(PlaceKind::Locality, "Quilmes", PlaceSource::Normalized),
            district: PlaceResult::found(PlaceKind::District, "Quilmes", PlaceSource::Inferred),
            province: PlaceResult::found(PlaceKind::Province, "Buenos Aires", PlaceSource::Inferred),
            postal_check: PostalCheck::NotApplicable,
        }
    }

    #[test]
    fn test_miss_on_empty_cache() {
        let cache = create_test_cache();
        let key = ResolutionKey::single("argentina");
        assert!(cache.get(EntryKind::Nationality, &key).unwrap().is_none());
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_put_then_get_nationality() {
        let cache = create_test_cache();
        let key = ResolutionKey::single("Argentino");
        cache
            .put(&key, &CachedValue::Nationality(argentina()))
            .unwrap();

        let entry = cache.get(EntryKind::Nationality, &key).unwrap().unwrap();
        assert_eq!(entry.key, key);
        assert_eq!(entry.value, CachedValue::Nationality(argentina()));
        assert!(entry.written_at <= Utc::now());
        assert_eq!(cache.get_nationality(&key).unwrap(), Some(argentina()));
    }

    #[test]
    fn test_put_then_get_places() {
        let cache = create_test_cache();
        let key = ResolutionKey::composite(["quilmes", "", "sin dato", "1878"]);
        cache.put(&key, &CachedValue::Places(sample_places())).unwrap();
        assert_eq!(cache.get_places(&key).unwrap(), Some(sample_places()));
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let cache = create_test_cache();
        let key = ResolutionKey::single("rosario");
        cache
            .put(&key, &CachedValue::Nationality(argentina()))
            .unwrap();
        cache.put(&key, &CachedValue::Places(sample_places())).unwrap();

        assert_eq!(cache.len().unwrap(), 2);
        assert_eq!(cache.get_nationality(&key).unwrap(), Some(argentina()));
        assert_eq!(cache.get_places(&key).unwrap(), Some(sample_places()));
    }

    #[test]
    fn test_put_overwrites_wholesale() {
        let cache = create_test_cache();
        let key = ResolutionKey::single("brasil");
        let first = NationalityResult::new(false, "Brasil", Confidence::Medium);
        let second = NationalityResult::new(false, "Brasileña", Confidence::High);
        cache.put(&key, &CachedValue::Nationality(first)).unwrap();
        cache
            .put(&key, &CachedValue::Nationality(second.clone()))
            .unwrap();

        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(cache.get_nationality(&key).unwrap(), Some(second));
    }

    #[test]
    fn test_corrupted_entry_reads_as_miss() {
        let cache = create_test_cache();
        {
            let conn = cache.conn();
            conn.execute(
                "INSERT INTO resolution_cache (kind, key, value_json, written_at) VALUES ('nationality', 'peru', '{not json', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO resolution_cache (kind, key, value_json, written_at) VALUES ('nationality', 'chile', ?1, 'yesterday')",
                [serde_json::to_string(&CachedValue::Nationality(argentina())).unwrap()],
            )
            .unwrap();
        }

        let peru = ResolutionKey::single("peru");
        let chile = ResolutionKey::single("chile");
        assert!(cache.get(EntryKind::Nationality, &peru).unwrap().is_none());
        assert!(cache.get(EntryKind::Nationality, &chile).unwrap().is_none());
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let key = ResolutionKey::single("argentinian");

        {
            let cache = SqliteCache::open(&path).unwrap();
            cache
                .put(&key, &CachedValue::Nationality(argentina()))
                .unwrap();
        }

        let reopened = SqliteCache::open(&path).unwrap();
        assert_eq!(reopened.get_nationality(&key).unwrap(), Some(argentina()));
    }

    #[test]
    fn test_wal_mode_enabled_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteCache::open(dir.path().join("cache.db")).unwrap();
        let mode: String = cache
            .conn()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_concurrent_writers_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SqliteCache::open(dir.path().join("cache.db")).unwrap());
        let key = ResolutionKey::single("uruguaya");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                std::thread::spawn(move || {
                    let value = NationalityResult::new(false, format!("Uruguay {}", i), Confidence::Low);
                    for _ in 0..20 {
                        cache.put(&key, &CachedValue::Nationality(value.clone())).unwrap();
                        cache.get(EntryKind::Nationality, &key).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len().unwrap(), 1);
        let stored = cache.get_nationality(&key).unwrap().unwrap();
        assert!(stored.normalized_name.starts_with("Uruguay "));
    }
}
