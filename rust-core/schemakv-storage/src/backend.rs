// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core row store trait for SchemaKV.
//
// Defines the `RowStore` trait that every backing store must satisfy: a
// relational-style table of `{key, value}` string rows with upsert, delete
// and truncate semantics. Backends are expected to be thread-safe
// (`Send + Sync`) and fully asynchronous.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

/// One persisted row: the primary key and the encoded value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRow {
    /// Primary key (unique within a table).
    pub key: String,
    /// String-encoded value.
    pub value: String,
}

impl PersistedRow {
    /// Build a row from anything string-like.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A pluggable backing store holding string rows in named tables.
///
/// Every operation takes the table name, mirroring a database connection
/// that can host several tables. Row-level operations on a table that was
/// never created fail with [`crate::StorageError::TableMissing`].
///
/// Implementations must be safe to share across threads and tokio tasks.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Check whether `table` has been created.
    async fn table_exists(&self, table: &str) -> StorageResult<bool>;

    /// Create `table` if it does not exist yet. Existing rows are kept.
    async fn create_table(&self, table: &str) -> StorageResult<()>;

    /// Retrieve every row of `table`, ordered by key.
    async fn load_rows(&self, table: &str) -> StorageResult<Vec<PersistedRow>>;

    /// Insert `row`, replacing any previous row with the same key.
    async fn upsert(&self, table: &str, row: &PersistedRow) -> StorageResult<()>;

    /// Delete the row stored under `key`.
    ///
    /// Returns `Ok(true)` if the row existed and was removed, `Ok(false)` if
    /// it was not present.
    async fn delete(&self, table: &str, key: &str) -> StorageResult<bool>;

    /// Remove every row of `table`, keeping the table itself.
    ///
    /// Returns the number of rows removed.
    async fn truncate(&self, table: &str) -> StorageResult<u64>;

    /// A human-readable name for this backend, used in logging and metrics.
    fn name(&self) -> &str;
}
