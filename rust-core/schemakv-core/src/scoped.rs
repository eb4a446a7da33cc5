// SPDX-License-Identifier: PMPL-1.0-or-later
//! Prefix-qualified view over an [`Accessor`].

use crate::accessor::Accessor;
use crate::error::StoreResult;
use crate::types::Value;

/// Maps logical names onto `prefix + name` in the base accessor.
///
/// Errors name the expanded key, since that is what the schema declares.
#[derive(Debug, Clone)]
pub struct ScopedAccessor {
    base: Accessor,
    prefix: String,
}

impl ScopedAccessor {
    pub fn new(base: Accessor, prefix: impl Into<String>) -> Self {
        Self {
            base,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key in the base accessor that `name` maps to.
    pub fn key_for(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn base(&self) -> &Accessor {
        &self.base
    }

    pub fn get(&self, name: &str) -> StoreResult<Option<Value>> {
        self.base.get(&self.key_for(name))
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> StoreResult<()> {
        self.base.set(&self.key_for(name), value)
    }

    pub fn delete(&self, name: &str) -> StoreResult<Option<Value>> {
        self.base.delete(&self.key_for(name))
    }

    /// Set entries under the prefix, with the prefix stripped from their names.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.base
            .entries()
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(self.prefix.as_str())
                    .map(|name| (name.to_string(), value))
            })
            .collect()
    }
}
