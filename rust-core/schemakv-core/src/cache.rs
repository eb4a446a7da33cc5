// SPDX-License-Identifier: PMPL-1.0-or-later
//! In-process value cache, the read source of truth of the store.
//!
//! Holds only the keys that were explicitly set or loaded from the backing
//! store. Entries remember when they were first inserted so enumeration
//! follows insertion order; overwriting a key keeps its position, deleting
//! and re-setting it moves it to the end.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::schema::FieldSpec;
use crate::types::Value;

#[derive(Debug)]
struct Slot {
    order: u64,
    value: Value,
}

/// Mutable view of the cache contents, handed out by [`StoreCache::mutate`].
#[derive(Debug, Default)]
pub struct CacheEntries {
    slots: HashMap<String, Slot>,
    next_order: u64,
}

impl CacheEntries {
    /// Insert or overwrite `name`.
    pub fn insert(&mut self, name: &str, value: Value) {
        match self.slots.get_mut(name) {
            Some(slot) => slot.value = value,
            None => {
                let order = self.next_order;
                self.next_order += 1;
                self.slots.insert(name.to_string(), Slot { order, value });
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.slots.remove(name).map(|slot| slot.value)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.next_order = 0;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Thread-safe cache of native values.
#[derive(Debug, Default)]
pub struct StoreCache {
    inner: RwLock<CacheEntries>,
}

impl StoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the entries.
    ///
    /// Callers that must order a side effect with the mutation (the accessor
    /// enqueueing a write task) do it inside `f`.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut CacheEntries) -> R) -> R {
        let mut entries = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut entries)
    }

    pub fn insert(&self, name: &str, value: Value) {
        self.mutate(|entries| entries.insert(name, value));
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.mutate(|entries| entries.remove(name))
    }

    pub fn clear(&self) {
        self.mutate(CacheEntries::clear);
    }

    /// Cached value for `name`, without falling back to a default.
    pub fn get(&self, name: &str) -> Option<Value> {
        let entries = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        entries.slots.get(name).map(|slot| slot.value.clone())
    }

    /// Cached value, else the declared default, else `None` (unset).
    pub fn resolve(&self, name: &str, field: &FieldSpec) -> Option<Value> {
        self.get(name).or_else(|| field.default.clone())
    }

    /// Currently set keys with their values, in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        let entries = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut ordered: Vec<_> = entries.slots.iter().collect();
        ordered.sort_by_key(|(_, slot)| slot.order);
        ordered
            .into_iter()
            .map(|(name, slot)| (name.clone(), slot.value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
