//! Persistent feature store
//!
//! Caches each feature table under its name in a SQLite database inside the
//! feature-store directory. Tables are replaced wholesale in a single
//! transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::table::{FeatureRow, FeatureTable};
use crate::{Result, TennisError};

/// File name of the store database inside the feature-store directory
pub const STORE_FILE: &str = "features.db";

/// Whether a table came from the store or was just computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Loaded,
    Built,
}

/// Summary of a persisted table
#[derive(Debug, Clone)]
pub struct StoredTable {
    pub name: String,
    pub schema_version: u32,
    pub fingerprint: Option<String>,
    pub built_at: String,
    pub row_count: usize,
}

/// Feature table cache backed by SQLite
pub struct FeatureStore {
    conn: Mutex<Connection>,
    /// Serializes check-build-persist for each table name
    name_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FeatureStore {
    /// Open or create the store in the given directory
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(STORE_FILE);
        match Self::with_connection(Connection::open(&path)?) {
            Err(TennisError::Database(e)) if is_corruption(&e) => {
                log::warn!(
                    "Feature store {} is unreadable ({}), recreating it",
                    path.display(),
                    e
                );
                std::fs::remove_file(&path)?;
                Self::with_connection(Connection::open(&path)?)
            }
            result => result,
        }
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS feature_tables (
                name TEXT PRIMARY KEY,
                schema_version INTEGER NOT NULL,
                fingerprint TEXT,
                built_at TEXT NOT NULL,
                row_count INTEGER NOT NULL,
                payload BLOB NOT NULL
            );
            "#,
        )?;
        Ok(FeatureStore {
            conn: Mutex::new(conn),
            name_locks: Mutex::new(HashMap::new()),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .name_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(name.to_string()).or_default().clone()
    }

    /// Load a persisted table.
    ///
    /// Ok(None) when no table has this name; Err(CacheRead) when one exists
    /// but cannot be decoded or was written with another schema version.
    pub fn load<R: FeatureRow>(&self, name: &str) -> Result<Option<FeatureTable<R>>> {
        let read_error = |message: String| TennisError::CacheRead {
            name: name.to_string(),
            message,
        };

        let stored: Option<(u32, Option<String>, String, Vec<u8>)> = self
            .conn()
            .query_row(
                "SELECT schema_version, fingerprint, built_at, payload
                 FROM feature_tables WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| read_error(e.to_string()))?;

        let Some((schema_version, fingerprint, built_at, payload)) = stored else {
            return Ok(None);
        };

        if schema_version != R::SCHEMA_VERSION {
            return Err(read_error(format!(
                "schema version {} does not match {}",
                schema_version,
                R::SCHEMA_VERSION
            )));
        }

        let built_at = DateTime::parse_from_rfc3339(&built_at)
            .map_err(|e| read_error(format!("bad build timestamp: {}", e)))?
            .with_timezone(&Utc);
        let rows: Vec<R> =
            serde_json::from_slice(&payload).map_err(|e| read_error(e.to_string()))?;

        Ok(Some(FeatureTable {
            name: name.to_string(),
            schema_version,
            fingerprint,
            built_at,
            rows,
        }))
    }

    /// Persist a table, replacing any previous version
    pub fn save<R: FeatureRow>(&self, table: &FeatureTable<R>) -> Result<()> {
        let write_error = |source: rusqlite::Error| TennisError::CacheWrite {
            name: table.name.clone(),
            source,
        };
        let payload = serde_json::to_vec(&table.rows)
            .map_err(|e| write_error(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))?;

        let mut conn = self.conn();
        let tx = conn.transaction().map_err(write_error)?;
        tx.execute(
            "INSERT OR REPLACE INTO feature_tables
                (name, schema_version, fingerprint, built_at, row_count, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                table.name,
                table.schema_version,
                table.fingerprint,
                table.built_at.to_rfc3339(),
                table.rows.len() as i64,
                payload,
            ],
        )
        .map_err(write_error)?;
        tx.commit().map_err(write_error)?;

        log::debug!("Persisted feature table {} ({} rows)", table.name, table.rows.len());
        Ok(())
    }

    /// Return the persisted table, or build, persist and return a new one.
    ///
    /// The builder runs when `force` is set, when nothing is stored under
    /// `name`, or when the stored table cannot be read. Builder and write
    /// errors are returned to the caller.
    pub fn get_or_build<R, F>(&self, name: &str, builder: F, force: bool) -> Result<FeatureTable<R>>
    where
        R: FeatureRow,
        F: FnOnce() -> Result<Vec<R>>,
    {
        self.get_or_build_checked(name, None, builder, force)
            .map(|(table, _)| table)
    }

    /// Like [`get_or_build`](Self::get_or_build), additionally treating a
    /// stored table as stale when its fingerprint differs from `fingerprint`.
    pub fn get_or_build_checked<R, F>(
        &self,
        name: &str,
        fingerprint: Option<&str>,
        builder: F,
        force: bool,
    ) -> Result<(FeatureTable<R>, CacheOutcome)>
    where
        R: FeatureRow,
        F: FnOnce() -> Result<Vec<R>>,
    {
        let lock = self.name_lock(name);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if force {
            log::info!("Recomputing {} (forced)", name);
        } else {
            match self.load::<R>(name) {
                Ok(Some(table)) => {
                    let stale = match fingerprint {
                        Some(expected) => table.fingerprint.as_deref() != Some(expected),
                        None => false,
                    };
                    if !stale {
                        log::info!("Loaded {} from feature store ({} rows)", name, table.len());
                        return Ok((table, CacheOutcome::Loaded));
                    }
                    log::info!("Feature table {} is out of date, recomputing", name);
                }
                Ok(None) => log::info!("No stored {} table, computing", name),
                Err(e) => log::warn!("{}, recomputing", e),
            }
        }

        let rows = builder()?;
        let table = FeatureTable::new(name, fingerprint.map(str::to_string), rows);
        self.save(&table)?;
        Ok((table, CacheOutcome::Built))
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM feature_tables WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Delete a table; returns whether one existed
    pub fn remove(&self, name: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM feature_tables WHERE name = ?1", params![name])?;
        Ok(deleted > 0)
    }

    /// All persisted tables, by name
    pub fn list(&self) -> Result<Vec<StoredTable>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name, schema_version, fingerprint, built_at, row_count
             FROM feature_tables ORDER BY name",
        )?;
        let tables = stmt
            .query_map([], |row| {
                let row_count: i64 = row.get(4)?;
                Ok(StoredTable {
                    name: row.get(0)?,
                    schema_version: row.get(1)?,
                    fingerprint: row.get(2)?,
                    built_at: row.get(3)?,
                    row_count: row_count as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tables)
    }
}

/// Whether an SQLite error means the store file itself is damaged
fn is_corruption(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlayerId;
    use serde::{Deserialize, Serialize};
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestRow {
        player_id: PlayerId,
        score: f32,
    }

    impl FeatureRow for TestRow {
        const SCHEMA_VERSION: u32 = 3;

        fn key(&self) -> String {
            self.player_id.0.to_string()
        }

        fn players(&self) -> Vec<PlayerId> {
            vec![self.player_id]
        }

        fn values(&self) -> Vec<(String, f32)> {
            vec![("score".to_string(), self.score)]
        }
    }

    fn rows(score: f32) -> Vec<TestRow> {
        vec![
            TestRow {
                player_id: PlayerId(1),
                score,
            },
            TestRow {
                player_id: PlayerId(2),
                score: score * 2.0,
            },
        ]
    }

    #[test]
    fn test_builds_once_without_force() {
        let store = FeatureStore::in_memory().unwrap();
        let calls = Cell::new(0);
        let build = |score: f32| -> Result<Vec<TestRow>> {
            calls.set(calls.get() + 1);
            Ok(rows(score))
        };

        let first = store.get_or_build("test", || build(1.0), false).unwrap();
        let second = store.get_or_build("test", || build(5.0), false).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(first.rows, second.rows);
        assert_eq!(second.schema_version, 3);

        let forced = store.get_or_build("test", || build(5.0), true).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(forced.rows[0].score, 5.0);

        // The forced result replaced the stored one
        let loaded = store.load::<TestRow>("test").unwrap().unwrap();
        assert_eq!(loaded.rows, forced.rows);
    }

    #[test]
    fn test_corrupt_payload_rebuilds() {
        let store = FeatureStore::in_memory().unwrap();
        store.get_or_build("test", || Ok(rows(1.0)), false).unwrap();
        store
            .conn()
            .execute("UPDATE feature_tables SET payload = x'00ff10' WHERE name = 'test'", [])
            .unwrap();
        assert!(matches!(
            store.load::<TestRow>("test"),
            Err(TennisError::CacheRead { .. })
        ));

        let calls = Cell::new(0);
        let table = store
            .get_or_build(
                "test",
                || {
                    calls.set(calls.get() + 1);
                    Ok(rows(2.0))
                },
                false,
            )
            .unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(table.rows[0].score, 2.0);
        assert!(store.load::<TestRow>("test").unwrap().is_some());
    }

    #[test]
    fn test_missing_field_rebuilds() {
        let store = FeatureStore::in_memory().unwrap();
        store.get_or_build("test", || Ok(rows(1.0)), false).unwrap();
        store
            .conn()
            .execute(
                "UPDATE feature_tables SET payload = CAST('[{\"player_id\":1}]' AS BLOB) WHERE name = 'test'",
                [],
            )
            .unwrap();

        let table = store.get_or_build("test", || Ok(rows(7.0)), false).unwrap();
        assert_eq!(table.rows[0].score, 7.0);
    }

    #[test]
    fn test_schema_mismatch_rebuilds() {
        let store = FeatureStore::in_memory().unwrap();
        store.get_or_build("test", || Ok(rows(1.0)), false).unwrap();
        store
            .conn()
            .execute("UPDATE feature_tables SET schema_version = 99", [])
            .unwrap();

        let table = store.get_or_build("test", || Ok(rows(4.0)), false).unwrap();
        assert_eq!(table.rows[0].score, 4.0);
    }

    #[test]
    fn test_builder_error_propagates() {
        let store = FeatureStore::in_memory().unwrap();
        let result = store.get_or_build::<TestRow, _>(
            "test",
            || Err(TennisError::InvalidRecord("bad".to_string())),
            false,
        );
        assert!(matches!(result, Err(TennisError::InvalidRecord(_))));
        assert!(!store.contains("test").unwrap());
    }

    #[test]
    fn test_fingerprint_mismatch_rebuilds() {
        let store = FeatureStore::in_memory().unwrap();
        let (_, outcome) = store
            .get_or_build_checked("test", Some("a"), || Ok(rows(1.0)), false)
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Built);

        let (_, outcome) = store
            .get_or_build_checked("test", Some("a"), || Ok(rows(2.0)), false)
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Loaded);

        let (table, outcome) = store
            .get_or_build_checked("test", Some("b"), || Ok(rows(3.0)), false)
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Built);
        assert_eq!(table.fingerprint.as_deref(), Some("b"));
    }

    #[test]
    fn test_list_and_remove() {
        let store = FeatureStore::in_memory().unwrap();
        store.get_or_build("b", || Ok(rows(1.0)), false).unwrap();
        store.get_or_build("a", || Ok(rows(1.0)), false).unwrap();

        let tables = store.list().unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "a");
        assert_eq!(tables[0].row_count, 2);

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert!(!store.contains("a").unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FeatureStore::open(dir.path()).unwrap();
            store.get_or_build("test", || Ok(rows(1.5)), false).unwrap();
        }
        assert!(dir.path().join(STORE_FILE).exists());

        let store = FeatureStore::open(dir.path()).unwrap();
        let table = store
            .get_or_build::<TestRow, _>("test", || panic!("should load from disk"), false)
            .unwrap();
        assert_eq!(table.rows[0].score, 1.5);
    }

    #[test]
    fn test_unreadable_store_file_recreated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STORE_FILE), vec![0x5a; 4096]).unwrap();

        let store = FeatureStore::open(dir.path()).unwrap();
        assert!(store.list().unwrap().is_empty());
        let table = store.get_or_build("test", || Ok(rows(2.0)), false).unwrap();
        assert_eq!(table.rows[0].score, 2.0);
        drop(store);

        let store = FeatureStore::open(dir.path()).unwrap();
        assert!(store.contains("test").unwrap());
    }

    #[test]
    fn test_write_failure_names_table() {
        let store = FeatureStore::in_memory().unwrap();
        store.conn().execute("DROP TABLE feature_tables", []).unwrap();

        let table = FeatureTable::new("career_stats", None, rows(1.0));
        match store.save(&table) {
            Err(TennisError::CacheWrite { name, .. }) => assert_eq!(name, "career_stats"),
            other => panic!("expected CacheWrite, got {:?}", other),
        }

        let result = store.get_or_build("career_stats", || Ok(rows(1.0)), false);
        assert!(matches!(result, Err(TennisError::CacheWrite { .. })));
    }

    #[derive(Debug, Clone, Deserialize)]
    struct UnencodableRow;

    impl Serialize for UnencodableRow {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("row cannot be encoded"))
        }
    }

    impl FeatureRow for UnencodableRow {
        const SCHEMA_VERSION: u32 = 1;

        fn key(&self) -> String {
            String::new()
        }

        fn players(&self) -> Vec<PlayerId> {
            Vec::new()
        }

        fn values(&self) -> Vec<(String, f32)> {
            Vec::new()
        }
    }

    #[test]
    fn test_encoding_failure_names_table() {
        let store = FeatureStore::in_memory().unwrap();
        let table = FeatureTable::new("rolling_stats", None, vec![UnencodableRow]);
        match store.save(&table) {
            Err(TennisError::CacheWrite { name, .. }) => assert_eq!(name, "rolling_stats"),
            other => panic!("expected CacheWrite, got {:?}", other),
        }
        assert!(!store.contains("rolling_stats").unwrap());
    }

    #[test]
    fn test_concurrent_builders_build_once() {
        let store = FeatureStore::in_memory().unwrap();
        let calls = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    store
                        .get_or_build(
                            "shared",
                            || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                std::thread::sleep(std::time::Duration::from_millis(20));
                                Ok(rows(1.0))
                            },
                            false,
                        )
                        .unwrap();
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
