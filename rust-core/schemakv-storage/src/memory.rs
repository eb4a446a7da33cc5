// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory row store for SchemaKV.
//
// Each table is a `BTreeMap` keyed by row key, all tables living in one map
// wrapped in a tokio `RwLock`. Intended for testing, development, and
// ephemeral stores.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{PersistedRow, RowStore};
use crate::error::{StorageError, StorageResult};

type Tables = HashMap<String, BTreeMap<String, String>>;

/// An in-memory row store backed by sorted maps.
///
/// All data lives in process memory and is lost on drop. Clones share the
/// same tables, so a test can keep a handle and inspect what the store
/// persisted.
///
/// # Example
///
/// ```rust
/// use schemakv_storage::{InMemoryRowStore, PersistedRow, RowStore};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryRowStore::new();
/// store.create_table("data-store").await.unwrap();
/// store.upsert("data-store", &PersistedRow::new("count", "5")).await.unwrap();
/// let rows = store.load_rows("data-store").await.unwrap();
/// assert_eq!(rows, vec![PersistedRow::new("count", "5")]);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryRowStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRowStore {
    /// Create a new store with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `table`, or `None` if the table does not exist.
    pub async fn row_count(&self, table: &str) -> Option<usize> {
        self.tables.read().await.get(table).map(BTreeMap::len)
    }

    /// Look up a single row value without going through the trait.
    pub async fn value_of(&self, table: &str, key: &str) -> Option<String> {
        self.tables
            .read()
            .await
            .get(table)
            .and_then(|rows| rows.get(key).cloned())
    }
}

fn missing(table: &str) -> StorageError {
    StorageError::TableMissing(table.to_string())
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    async fn table_exists(&self, table: &str) -> StorageResult<bool> {
        Ok(self.tables.read().await.contains_key(table))
    }

    async fn create_table(&self, table: &str) -> StorageResult<()> {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default();
        Ok(())
    }

    async fn load_rows(&self, table: &str) -> StorageResult<Vec<PersistedRow>> {
        let tables = self.tables.read().await;
        let rows = tables.get(table).ok_or_else(|| missing(table))?;
        Ok(rows
            .iter()
            .map(|(key, value)| PersistedRow::new(key.as_str(), value.as_str()))
            .collect())
    }

    async fn upsert(&self, table: &str, row: &PersistedRow) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let rows = tables.get_mut(table).ok_or_else(|| missing(table))?;
        rows.insert(row.key.clone(), row.value.clone());
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        let rows = tables.get_mut(table).ok_or_else(|| missing(table))?;
        Ok(rows.remove(key).is_some())
    }

    async fn truncate(&self, table: &str) -> StorageResult<u64> {
        let mut tables = self.tables.write().await;
        let rows = tables.get_mut(table).ok_or_else(|| missing(table))?;
        let removed = rows.len() as u64;
        rows.clear();
        Ok(removed)
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
