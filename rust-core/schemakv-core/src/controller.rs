// SPDX-License-Identifier: PMPL-1.0-or-later
//! Store lifecycle: initialize, reset, purge and accessor hand-out.
//!
//! A [`StoreController`] owns at most one live store. `initialize` is
//! serialized by an async gate, so concurrent callers end up sharing the
//! instance built by whichever call ran first.

use std::sync::{Arc, PoisonError, RwLock};

use schemakv_storage::RowStore;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::accessor::Accessor;
use crate::cache::StoreCache;
use crate::config::StoreOptions;
use crate::error::{StoreError, StoreResult};
use crate::queue::WriteQueue;
use crate::schema::{self, SchemaDefinition};
use crate::scoped::ScopedAccessor;
use crate::types;

#[derive(Debug, Default)]
pub struct StoreController {
    init_gate: Mutex<()>,
    live: RwLock<Option<Accessor>>,
}

impl StoreController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the schema, load the persisted rows and start the write queue.
    ///
    /// Does nothing and returns the existing accessor when already initialized.
    pub async fn initialize(
        &self,
        store: Arc<dyn RowStore>,
        definition: &SchemaDefinition,
        options: StoreOptions,
    ) -> StoreResult<Accessor> {
        let _gate = self.init_gate.lock().await;
        if let Some(accessor) = self.current() {
            debug!("store already initialized");
            return Ok(accessor);
        }

        let schema = schema::validate(definition)?;
        let table = options.table_name.as_str();

        if !store.table_exists(table).await? {
            store.create_table(table).await?;
            info!(%table, backend = store.name(), "created backing table");
        }

        let cache = StoreCache::new();
        let mut loaded = 0usize;
        for row in store.load_rows(table).await? {
            let Some(field) = schema.get(&row.key) else {
                if options.ignore_unknown_rows {
                    warn!(%table, key = %row.key, "ignoring stored row not declared in schema");
                    continue;
                }
                return Err(StoreError::Entry(format!(
                    "There is no entry in schema for key {}",
                    row.key
                )));
            };
            cache.insert(&row.key, types::decode(&row.value, field.tag)?);
            loaded += 1;
        }
        debug!(%table, rows = loaded, "cache loaded");

        let queue = WriteQueue::start(Arc::clone(&store), table, options.failure_policy)?;
        let accessor = Accessor::new(schema, cache, queue);
        *self.live.write().unwrap_or_else(PoisonError::into_inner) = Some(accessor.clone());

        info!(
            %table,
            backend = store.name(),
            keys = accessor.schema().len(),
            rows = loaded,
            "store initialized"
        );
        Ok(accessor)
    }

    fn current(&self) -> Option<Accessor> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.current().is_some()
    }

    /// The live accessor.
    pub fn accessor(&self) -> StoreResult<Accessor> {
        self.current().ok_or(StoreError::NotInitialized)
    }

    /// The live accessor scoped to `prefix`.
    pub fn scoped(&self, prefix: impl Into<String>) -> StoreResult<ScopedAccessor> {
        Ok(self.accessor()?.scope(prefix))
    }

    /// Forget the live store. The backing store is left untouched and writes
    /// already queued keep draining in the background.
    pub fn reset(&self) {
        let previous = self
            .live
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            info!("store reset");
        }
    }

    /// Clear every entry, in memory now and in the backing table eventually.
    pub fn purge(&self) -> StoreResult<()> {
        self.accessor()?.purge()?;
        info!("store purged");
        Ok(())
    }

    /// Wait for every queued write of the live store.
    pub async fn flush(&self) -> StoreResult<()> {
        self.accessor()?.flush().await
    }

    /// Drain the write queue, stop its worker and reset.
    ///
    /// Returns the halting failure if the queue stopped on an error.
    pub async fn shutdown(&self) -> StoreResult<()> {
        let previous = self
            .live
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match previous {
            Some(accessor) => {
                let outcome = accessor.shutdown().await;
                info!(ok = outcome.is_ok(), "store shut down");
                outcome
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeTag, Value};
    use schemakv_storage::{InMemoryRowStore, PersistedRow};

    fn definition() -> SchemaDefinition {
        SchemaDefinition::new()
            .bare("count", TypeTag::Int)
            .with_default("label", TypeTag::String, "n/a")
    }

    async fn seeded(rows: &[(&str, &str)]) -> InMemoryRowStore {
        let store = InMemoryRowStore::new();
        store.create_table("data-store").await.unwrap();
        for (key, value) in rows {
            store
                .upsert("data-store", &PersistedRow::new(*key, *value))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_uninitialized_controller() {
        let controller = StoreController::new();
        assert!(!controller.is_initialized());
        assert!(matches!(controller.accessor(), Err(StoreError::NotInitialized)));
        assert!(matches!(controller.scoped("x"), Err(StoreError::NotInitialized)));
        assert!(matches!(controller.purge(), Err(StoreError::NotInitialized)));
        assert!(controller.flush().await.is_err());
        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_creates_table() {
        let store = InMemoryRowStore::new();
        let controller = StoreController::new();
        controller
            .initialize(Arc::new(store.clone()), &definition(), StoreOptions::default())
            .await
            .unwrap();

        assert!(controller.is_initialized());
        assert!(store.table_exists("data-store").await.unwrap());
    }

    #[tokio::test]
    async fn test_initialize_loads_rows_with_declared_types() {
        let store = seeded(&[("count", "12"), ("label", "hello")]).await;
        let controller = StoreController::new();
        let accessor = controller
            .initialize(Arc::new(store), &definition(), StoreOptions::default())
            .await
            .unwrap();

        assert_eq!(accessor.get("count").unwrap(), Some(Value::Int(12)));
        assert_eq!(accessor.get("label").unwrap(), Some(Value::from("hello")));
    }

    #[tokio::test]
    async fn test_invalid_schema_touches_nothing() {
        let store = InMemoryRowStore::new();
        let controller = StoreController::new();
        let err = controller
            .initialize(
                Arc::new(store.clone()),
                &SchemaDefinition::new(),
                StoreOptions::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), "SCHEMA_ERR");
        assert!(!controller.is_initialized());
        assert!(!store.table_exists("data-store").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_row_fails_unless_ignored() {
        let store = seeded(&[("count", "1"), ("legacy", "x")]).await;
        let controller = StoreController::new();

        let err = controller
            .initialize(Arc::new(store.clone()), &definition(), StoreOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "entry error: There is no entry in schema for key legacy");
        assert!(!controller.is_initialized());

        let accessor = controller
            .initialize(
                Arc::new(store),
                &definition(),
                StoreOptions::default().with_ignore_unknown_rows(true),
            )
            .await
            .unwrap();
        assert_eq!(accessor.keys(), vec!["count"]);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let controller = StoreController::new();
        let first = controller
            .initialize(
                Arc::new(InMemoryRowStore::new()),
                &definition(),
                StoreOptions::default(),
            )
            .await
            .unwrap();
        first.set("count", 5).unwrap();

        // A second call with another store and schema keeps the live instance.
        let second = controller
            .initialize(
                Arc::new(InMemoryRowStore::new()),
                &SchemaDefinition::new().bare("other", "bool"),
                StoreOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(second.get("count").unwrap(), Some(Value::Int(5)));
        assert!(second.get("other").is_err());
    }

    #[tokio::test]
    async fn test_reset_keeps_backing_store() {
        let store = InMemoryRowStore::new();
        let controller = StoreController::new();
        let accessor = controller
            .initialize(Arc::new(store.clone()), &definition(), StoreOptions::default())
            .await
            .unwrap();
        accessor.set("count", 9).unwrap();
        accessor.flush().await.unwrap();

        controller.reset();
        assert!(!controller.is_initialized());
        assert!(controller.accessor().is_err());

        let reloaded = controller
            .initialize(Arc::new(store), &definition(), StoreOptions::default())
            .await
            .unwrap();
        assert_eq!(reloaded.get("count").unwrap(), Some(Value::Int(9)));
    }

    #[tokio::test]
    async fn test_purge_then_shutdown() {
        let store = seeded(&[("count", "3")]).await;
        let controller = StoreController::new();
        controller
            .initialize(Arc::new(store.clone()), &definition(), StoreOptions::default())
            .await
            .unwrap();

        controller.purge().unwrap();
        assert!(controller.accessor().unwrap().entries().is_empty());

        controller.shutdown().await.unwrap();
        assert!(!controller.is_initialized());
        assert_eq!(store.row_count("data-store").await, Some(0));
    }

    #[tokio::test]
    async fn test_custom_table_name() {
        let store = InMemoryRowStore::new();
        let controller = StoreController::new();
        let accessor = controller
            .initialize(
                Arc::new(store.clone()),
                &definition(),
                StoreOptions::default().with_table_name("settings"),
            )
            .await
            .unwrap();
        accessor.set("label", "x").unwrap();
        controller.flush().await.unwrap();

        assert_eq!(store.value_of("settings", "label").await.as_deref(), Some("x"));
        assert_eq!(store.row_count("data-store").await, None);
    }
}
