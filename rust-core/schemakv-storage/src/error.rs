// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage error types for the SchemaKV backing row store.
//
// Row stores report I/O failures, tables that were never created, rows that
// cannot be read back, and backends that are unreachable.

use thiserror::Error;

/// Result type alias for row store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur when interacting with a backing row store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The named table has not been created.
    #[error("table missing: {0}")]
    TableMissing(String),

    /// The stored data is corrupted or in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The storage backend is not available (e.g., connection lost).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}
