// SPDX-License-Identifier: PMPL-1.0-or-later
//! Store error types.

use schemakv_storage::StorageError;
use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the schema, the accessor surface and the store lifecycle.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed schema definition (absent, empty, bad key or bad value spec).
    #[error("schema error: {0}")]
    Schema(String),

    /// Misuse of the accessor: unknown key or a value of the wrong type.
    #[error("entry error: {0}")]
    Entry(String),

    /// A persisted value or type tag could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("store was not initialized")]
    NotInitialized,

    /// The write queue cannot accept or complete work.
    #[error("write queue error: {0}")]
    Queue(String),

    #[error("backing store error: {0}")]
    Storage(#[from] StorageError),
}

impl StoreError {
    /// Stable machine-readable code for the error category.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Schema(_) => "SCHEMA_ERR",
            StoreError::Entry(_) => "ENTRY_ERR",
            StoreError::Parse(_) => "PARSE_ERR",
            StoreError::NotInitialized => "NOT_INIT",
            StoreError::Queue(_) => "QUEUE_ERR",
            StoreError::Storage(_) => "STORAGE_ERR",
        }
    }
}
