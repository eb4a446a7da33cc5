// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SchemaKV Backing Row Store
//
// This crate provides the pluggable row store that SchemaKV persists into.
// The `RowStore` trait defines a relational-style contract (named tables of
// `{key, value}` string rows with upsert, delete and truncate), so the store
// engine can swap storage implementations without changing its logic.
//
// # Modules
//
// - [`backend`] -- The `RowStore` trait and the `PersistedRow` shape.
// - [`error`] -- The `StorageError` enum covering all backend failure modes.
// - [`memory`] -- An in-memory backend for tests and ephemeral stores.
// - [`metrics`] -- A transparent wrapper that collects operation statistics.
//
// # Example
//
// ```rust
// use schemakv_storage::{InMemoryRowStore, MetricsRowStore, PersistedRow, RowStore};
//
// # tokio_test::block_on(async {
// let store = MetricsRowStore::new(InMemoryRowStore::new());
// store.create_table("data-store").await.unwrap();
// store.upsert("data-store", &PersistedRow::new("label", "n/a")).await.unwrap();
//
// let rows = store.load_rows("data-store").await.unwrap();
// assert_eq!(rows[0].value, "n/a");
// # });
// ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod metrics;

// Optional persistent backends — feature-gated to keep the default build lean.
#[cfg(feature = "redb-backend")]
pub mod redb_backend;

pub use backend::{PersistedRow, RowStore};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryRowStore;
pub use metrics::{MetricsRowStore, RowStoreStats};

#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbRowStore;
