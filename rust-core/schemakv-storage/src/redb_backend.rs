// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// redb-backed persistent row store for SchemaKV.
//
// Uses redb (pure Rust, B-tree, ACID, single-file database) to provide
// durable row storage. No C/C++ dependencies.
//
// # Design
//
// - One redb `Database` file; every SchemaKV table is one redb table with
//   `&str` keys and `&str` values.
// - Read transactions for `table_exists` and `load_rows`.
// - Write transactions for create/upsert/delete/truncate (serialised by redb
//   internally). Each commit is durable on return.
// - All redb calls run on the blocking thread pool via `spawn_blocking`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, TableError, TableHandle,
    WriteTransaction,
};
use tracing::debug;

use crate::backend::{PersistedRow, RowStore};
use crate::error::{StorageError, StorageResult};

fn table_def(name: &str) -> TableDefinition<'_, &'static str, &'static str> {
    TableDefinition::new(name)
}

fn unavailable<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> StorageError {
    move |e| StorageError::BackendUnavailable(format!("{context}: {e}"))
}

fn corrupted<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> StorageError {
    move |e| StorageError::CorruptedData(format!("{context}: {e}"))
}

fn open_table_err(table: &str, err: TableError) -> StorageError {
    match err {
        TableError::TableDoesNotExist(_) => StorageError::TableMissing(table.to_string()),
        other => StorageError::BackendUnavailable(format!("open table {table}: {other}")),
    }
}

/// Row-level writes must not silently create a table that was never set up.
fn ensure_table(txn: &WriteTransaction, table: &str) -> StorageResult<()> {
    let exists = txn
        .list_tables()
        .map_err(unavailable("list tables"))?
        .any(|handle| handle.name() == table);
    if exists {
        Ok(())
    } else {
        Err(StorageError::TableMissing(table.to_string()))
    }
}

/// A persistent row store powered by redb.
///
/// Thread-safe: `Database` is `Send + Sync` and handles internal locking.
///
/// # Example
///
/// ```rust,no_run
/// use schemakv_storage::{PersistedRow, RedbRowStore, RowStore};
///
/// # tokio_test::block_on(async {
/// let store = RedbRowStore::open("/tmp/schemakv-test.redb").unwrap();
/// store.create_table("data-store").await.unwrap();
/// store.upsert("data-store", &PersistedRow::new("count", "5")).await.unwrap();
/// # });
/// ```
pub struct RedbRowStore {
    /// The redb database handle.
    db: Arc<Database>,
    /// Path to the database file (for diagnostics).
    path: PathBuf,
}

impl RedbRowStore {
    /// Open or create a redb database at the given path.
    ///
    /// Creates the file and parent directories if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }

        let db = Database::create(&path).map_err(|e| {
            StorageError::BackendUnavailable(format!(
                "failed to open redb at {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), "opened redb row store");

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Return the filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run_blocking<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> StorageResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }
}

impl std::fmt::Debug for RedbRowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbRowStore")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl RowStore for RedbRowStore {
    async fn table_exists(&self, table: &str) -> StorageResult<bool> {
        let table = table.to_string();
        self.run_blocking(move |db| {
            let txn = db.begin_read().map_err(unavailable("read txn"))?;
            let mut tables = txn.list_tables().map_err(unavailable("list tables"))?;
            Ok(tables.any(|handle| handle.name() == table))
        })
        .await
    }

    async fn create_table(&self, table: &str) -> StorageResult<()> {
        let table = table.to_string();
        self.run_blocking(move |db| {
            let txn = db.begin_write().map_err(unavailable("write txn"))?;
            // Opening a table in a write transaction creates it if absent.
            txn.open_table(table_def(&table))
                .map_err(|e| open_table_err(&table, e))?;
            txn.commit().map_err(corrupted("commit"))?;
            debug!(%table, "redb table ready");
            Ok(())
        })
        .await
    }

    async fn load_rows(&self, table: &str) -> StorageResult<Vec<PersistedRow>> {
        let table = table.to_string();
        self.run_blocking(move |db| {
            let txn = db.begin_read().map_err(unavailable("read txn"))?;
            let handle = txn
                .open_table(table_def(&table))
                .map_err(|e| open_table_err(&table, e))?;

            let mut rows = Vec::new();
            for entry in handle.iter().map_err(corrupted("iter"))? {
                let (key, value) = entry.map_err(corrupted("scan entry"))?;
                rows.push(PersistedRow::new(key.value(), value.value()));
            }
            Ok(rows)
        })
        .await
    }

    async fn upsert(&self, table: &str, row: &PersistedRow) -> StorageResult<()> {
        let table = table.to_string();
        let row = row.clone();
        self.run_blocking(move |db| {
            let txn = db.begin_write().map_err(unavailable("write txn"))?;
            {
                ensure_table(&txn, &table)?;
                let mut handle = txn
                    .open_table(table_def(&table))
                    .map_err(|e| open_table_err(&table, e))?;
                handle
                    .insert(row.key.as_str(), row.value.as_str())
                    .map_err(corrupted("insert"))?;
            }
            txn.commit().map_err(corrupted("commit"))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, table: &str, key: &str) -> StorageResult<bool> {
        let table = table.to_string();
        let key = key.to_string();
        self.run_blocking(move |db| {
            let txn = db.begin_write().map_err(unavailable("write txn"))?;
            let existed;
            {
                ensure_table(&txn, &table)?;
                let mut handle = txn
                    .open_table(table_def(&table))
                    .map_err(|e| open_table_err(&table, e))?;
                existed = handle
                    .remove(key.as_str())
                    .map_err(corrupted("remove"))?
                    .is_some();
            }
            txn.commit().map_err(corrupted("commit"))?;
            Ok(existed)
        })
        .await
    }

    async fn truncate(&self, table: &str) -> StorageResult<u64> {
        let table = table.to_string();
        self.run_blocking(move |db| {
            let txn = db.begin_write().map_err(unavailable("write txn"))?;
            let removed;
            {
                ensure_table(&txn, &table)?;
                let handle = txn
                    .open_table(table_def(&table))
                    .map_err(|e| open_table_err(&table, e))?;
                removed = handle.iter().map_err(corrupted("iter"))?.count() as u64;
            }
            txn.delete_table(table_def(&table))
                .map_err(|e| open_table_err(&table, e))?;
            txn.open_table(table_def(&table))
                .map_err(|e| open_table_err(&table, e))?;
            txn.commit().map_err(corrupted("commit"))?;
            debug!(%table, removed, "redb table truncated");
            Ok(removed)
        })
        .await
    }

    fn name(&self) -> &str {
        "redb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TABLE: &str = "data-store";

    /// Create a temporary store; the directory guard must outlive the store.
    fn temp_store() -> (RedbRowStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");
        let store = RedbRowStore::open(&path).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_basic_crud() {
        let (store, _dir) = temp_store();

        assert!(!store.table_exists(TABLE).await.unwrap());
        store.create_table(TABLE).await.unwrap();
        assert!(store.table_exists(TABLE).await.unwrap());

        store.upsert(TABLE, &PersistedRow::new("int", "1")).await.unwrap();
        store.upsert(TABLE, &PersistedRow::new("int", "2")).await.unwrap();
        assert_eq!(
            store.load_rows(TABLE).await.unwrap(),
            vec![PersistedRow::new("int", "2")]
        );

        assert!(store.delete(TABLE, "int").await.unwrap());
        assert!(!store.delete(TABLE, "int").await.unwrap());
        assert!(store.load_rows(TABLE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_truncate_keeps_table() {
        let (store, _dir) = temp_store();
        store.create_table(TABLE).await.unwrap();
        store.upsert(TABLE, &PersistedRow::new("a", "1")).await.unwrap();
        store.upsert(TABLE, &PersistedRow::new("b", "2")).await.unwrap();

        assert_eq!(store.truncate(TABLE).await.unwrap(), 2);
        assert!(store.table_exists(TABLE).await.unwrap());
        assert!(store.load_rows(TABLE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_table() {
        let (store, _dir) = temp_store();
        let err = store
            .upsert("nope", &PersistedRow::new("k", "v"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TableMissing(_)));
        assert!(matches!(
            store.load_rows("nope").await.unwrap_err(),
            StorageError::TableMissing(_)
        ));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persist.redb");

        {
            let store = RedbRowStore::open(&path).unwrap();
            store.create_table(TABLE).await.unwrap();
            store
                .upsert(TABLE, &PersistedRow::new("object", r#"{"some":"object"}"#))
                .await
                .unwrap();
        }

        let store = RedbRowStore::open(&path).unwrap();
        assert!(store.table_exists(TABLE).await.unwrap());
        assert_eq!(
            store.load_rows(TABLE).await.unwrap(),
            vec![PersistedRow::new("object", r#"{"some":"object"}"#)]
        );
    }

    #[test]
    fn test_debug_shows_path() {
        let (store, _dir) = temp_store();
        let dbg = format!("{:?}", store);
        assert!(dbg.contains("RedbRowStore"));
        assert!(dbg.contains("test.redb"));
    }
}
