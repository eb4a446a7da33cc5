// SPDX-License-Identifier: PMPL-1.0-or-later
//! Schema-checked get/set/delete surface over the cache and the write queue.
//!
//! Reads are served from the [`StoreCache`] only. Writes validate against the
//! [`Schema`], update the cache and enqueue the matching persistence task
//! before returning; persistence itself happens later on the queue worker.

use std::sync::Arc;

use schemakv_storage::PersistedRow;
use tracing::debug;

use crate::cache::StoreCache;
use crate::error::{StoreError, StoreResult};
use crate::queue::{QueueStatus, WriteQueue, WriteTask};
use crate::schema::{FieldSpec, Schema};
use crate::scoped::ScopedAccessor;
use crate::types::{self, Value};

#[derive(Debug)]
struct AccessorInner {
    schema: Schema,
    cache: StoreCache,
    queue: WriteQueue,
}

/// Handle to a live store. Clones share the same state.
#[derive(Debug, Clone)]
pub struct Accessor {
    inner: Arc<AccessorInner>,
}

impl Accessor {
    pub(crate) fn new(schema: Schema, cache: StoreCache, queue: WriteQueue) -> Self {
        Self {
            inner: Arc::new(AccessorInner {
                schema,
                cache,
                queue,
            }),
        }
    }

    fn field(&self, name: &str) -> StoreResult<&FieldSpec> {
        self.inner.schema.get(name).ok_or_else(|| {
            StoreError::Entry(format!("Property {name} was not defined in Store's schema!"))
        })
    }

    /// Current value of `name`: the cached value, else the declared default.
    ///
    /// `Ok(None)` means the key is declared but unset and has no default.
    pub fn get(&self, name: &str) -> StoreResult<Option<Value>> {
        let field = self.field(name)?;
        Ok(self.inner.cache.resolve(name, field))
    }

    /// Store `value` under `name` and schedule its persistence.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> StoreResult<()> {
        let field = self.field(name)?;
        let value = value.into();
        if !types::validate(&value, field.tag) {
            return Err(StoreError::Entry(format!(
                "Invalid type for {name}! Expected {} type.",
                field.tag
            )));
        }
        self.inner.queue.ensure_accepting()?;

        let row = PersistedRow::new(name, types::encode(&value));
        // Both steps run under the cache write lock so enqueue order matches
        // mutation order across threads.
        self.inner.cache.mutate(|entries| {
            self.inner.queue.enqueue(WriteTask::Upsert(row))?;
            entries.insert(name, value);
            Ok::<_, StoreError>(())
        })?;
        debug!(key = %name, "entry set");
        Ok(())
    }

    /// Remove `name` and schedule the row deletion. Returns the removed value.
    pub fn delete(&self, name: &str) -> StoreResult<Option<Value>> {
        self.field(name)?;
        self.inner.queue.ensure_accepting()?;

        let removed = self.inner.cache.mutate(|entries| {
            self.inner.queue.enqueue(WriteTask::Delete {
                key: name.to_string(),
            })?;
            Ok::<_, StoreError>(entries.remove(name))
        })?;
        debug!(key = %name, existed = removed.is_some(), "entry deleted");
        Ok(removed)
    }

    /// Whether `name` currently holds an explicitly set value.
    pub fn is_set(&self, name: &str) -> StoreResult<bool> {
        self.field(name)?;
        Ok(self.inner.cache.get(name).is_some())
    }

    /// Keys currently set, with their values, in the order they were first set.
    ///
    /// Declared keys that only have a default are not included.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.inner.cache.entries()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries().into_iter().map(|(name, _)| name).collect()
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Wait until every write scheduled so far has reached the backing store.
    pub async fn flush(&self) -> StoreResult<()> {
        self.inner.queue.flush().await
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.inner.queue.status()
    }

    /// View of this store where every key is prefixed with `prefix`.
    pub fn scope(&self, prefix: impl Into<String>) -> ScopedAccessor {
        ScopedAccessor::new(self.clone(), prefix)
    }

    /// Drop every cached entry and schedule a table truncate.
    pub(crate) fn purge(&self) -> StoreResult<()> {
        self.inner.queue.ensure_accepting()?;
        self.inner.cache.mutate(|entries| {
            self.inner.queue.enqueue(WriteTask::Truncate)?;
            entries.clear();
            Ok::<_, StoreError>(())
        })
    }

    pub(crate) async fn shutdown(&self) -> StoreResult<()> {
        self.inner.queue.shutdown().await
    }
}
