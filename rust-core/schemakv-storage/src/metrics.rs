// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metrics-collecting wrapper for SchemaKV row stores.
//
// Wraps any `RowStore` and transparently collects operation counts, write
// latency and byte totals. Useful for checking how many writes the write
// queue actually issued and for profiling slow backends.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{PersistedRow, RowStore};
use crate::error::StorageResult;

/// Accumulated statistics for a row store.
///
/// All counters are monotonically increasing for the lifetime of the
/// [`MetricsRowStore`] that owns them.
#[derive(Debug, Clone, Default)]
pub struct RowStoreStats {
    /// Number of `load_rows` calls.
    pub load_count: u64,
    /// Number of `upsert` calls.
    pub upsert_count: u64,
    /// Number of `delete` calls.
    pub delete_count: u64,
    /// Number of `truncate` calls.
    pub truncate_count: u64,
    /// Number of calls (of any kind) that returned an error.
    pub error_count: u64,
    /// Cumulative wall-clock latency of upsert/delete/truncate, in milliseconds.
    pub write_latency_sum_ms: f64,
    /// Total rows returned by `load_rows`.
    pub rows_loaded: u64,
    /// Total key + value bytes written by successful upserts.
    pub total_bytes_written: u64,
}

/// A row store wrapper that collects operation metrics.
///
/// # Example
///
/// ```rust
/// use schemakv_storage::{InMemoryRowStore, MetricsRowStore, PersistedRow, RowStore};
///
/// # tokio_test::block_on(async {
/// let metered = MetricsRowStore::new(InMemoryRowStore::new());
/// metered.create_table("t").await.unwrap();
/// metered.upsert("t", &PersistedRow::new("k", "v")).await.unwrap();
///
/// let stats = metered.stats().await;
/// assert_eq!(stats.upsert_count, 1);
/// assert_eq!(stats.total_bytes_written, 2);
/// # });
/// ```
pub struct MetricsRowStore<S: RowStore> {
    /// The wrapped store that performs the actual operations.
    inner: S,
    /// Shared, mutable statistics accumulator.
    stats: Arc<RwLock<RowStoreStats>>,
}

impl<S: RowStore> MetricsRowStore<S> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            stats: Arc::new(RwLock::new(RowStoreStats::default())),
        }
    }

    /// Return a snapshot of the current statistics.
    pub async fn stats(&self) -> RowStoreStats {
        self.stats.read().await.clone()
    }

    /// Reset all statistics to zero.
    pub async fn reset_stats(&self) {
        *self.stats.write().await = RowStoreStats::default();
    }

    /// Return a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn record_write<T>(&self, start: Instant, result: &StorageResult<T>) {
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let mut s = self.stats.write().await;
        s.write_latency_sum_ms += elapsed_ms;
        if result.is_err() {
            s.error_count += 1;
        }
    }
}

#[async_trait]
impl<S: RowStore> RowStore for MetricsRowStore<S> {
    async fn table_exists(&self, table: &str) -> StorageResult<bool> {
        self.inner.table_exists(table).await
    }

    async fn create_table(&self, table: &str) -> StorageResult<()> {
        self.inner.create_table(table).await
    }

    async fn load_rows(&self, table: &str) -> StorageResult<Vec<PersistedRow>> {
        let result = self.inner.load_rows(table).await;

        let mut s = self.stats.write().await;
        s.load_count += 1;
        match &result {
            Ok(rows) => s.rows_loaded += rows.len() as u64,
            Err(_) => s.error_count += 1,
        }

        result
    }

    async fn upsert(&self, table: &str, row: &PersistedRow) -> StorageResult<()> {
        let start = Instant::now();
        let result = self.inner.upsert(table, row).await;
        self.record_write(start, &result).await;

        let mut s = self.stats.write().await;
        s.upsert_count += 1;
        if result.is_ok() {
            s.total_bytes_written += (row.key.len() + row.value.len()) as u64;
        }

        result
    }

    async fn delete(&self, table: &str, key: &str) -> StorageResult<bool> {
        let start = Instant::now();
        let result = self.inner.delete(table, key).await;
        self.record_write(start, &result).await;
        self.stats.write().await.delete_count += 1;
        result
    }

    async fn truncate(&self, table: &str) -> StorageResult<u64> {
        let start = Instant::now();
        let result = self.inner.truncate(table).await;
        self.record_write(start, &result).await;
        self.stats.write().await.truncate_count += 1;
        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
