// SPDX-License-Identifier: PMPL-1.0-or-later
//! SchemaKV Core
//!
//! A schema-typed key/value store. Callers declare which keys exist and what
//! type each holds; values are kept in an in-process cache for synchronous
//! reads and written behind to a [`schemakv_storage::RowStore`] as strings,
//! through a single ordered write queue.
//!
//! ```rust
//! use std::sync::Arc;
//! use schemakv_core::{SchemaDefinition, StoreController, StoreOptions, Value};
//! use schemakv_storage::InMemoryRowStore;
//!
//! # tokio_test::block_on(async {
//! let controller = StoreController::new();
//! let schema = SchemaDefinition::new()
//!     .bare("count", "int")
//!     .with_default("label", "string", "n/a");
//!
//! let store = controller
//!     .initialize(Arc::new(InMemoryRowStore::new()), &schema, StoreOptions::default())
//!     .await
//!     .unwrap();
//!
//! store.set("count", 3).unwrap();
//! assert_eq!(store.get("count").unwrap(), Some(Value::Int(3)));
//! assert_eq!(store.get("label").unwrap(), Some(Value::from("n/a")));
//! store.flush().await.unwrap();
//! # });
//! ```

pub mod accessor;
pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod queue;
pub mod schema;
pub mod scoped;
pub mod types;

pub use accessor::Accessor;
pub use config::{FailurePolicy, StoreOptions, DEFAULT_TABLE_NAME};
pub use controller::StoreController;
pub use error::{StoreError, StoreResult};
pub use queue::{QueueStatus, WriteQueue, WriteTask};
pub use schema::{FieldSpec, Schema, SchemaDefinition, ValueSpec};
pub use scoped::ScopedAccessor;
pub use types::{decode, encode, validate, TypeTag, Value};
