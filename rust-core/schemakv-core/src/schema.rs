// SPDX-License-Identifier: PMPL-1.0-or-later
//! Schema definitions and their validation.
//!
//! Callers describe the store as a [`SchemaDefinition`]: an ordered list of
//! key names, each mapped to a [`ValueSpec`] that is either a bare type name
//! (`"int"`) or an options record (`{"type": "string", "default": "n/a"}`).
//! [`validate`] checks the definition and normalizes both forms into one
//! [`FieldSpec`] record per key, producing a [`Schema`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::types::{self, TypeTag, Value};

/// Un-validated value spec as written by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSpec {
    /// Bare type name, e.g. `"int"`.
    Bare(String),
    /// Options record with an optional default.
    Options {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<serde_json::Value>,
    },
}

/// Ordered, un-validated schema definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDefinition {
    entries: Vec<(String, ValueSpec)>,
}

impl SchemaDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the spec for `name`.
    pub fn field(mut self, name: impl Into<String>, spec: ValueSpec) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = spec,
            None => self.entries.push((name, spec)),
        }
        self
    }

    /// Declare `name` with a bare type, e.g. `.bare("count", "int")`.
    pub fn bare(self, name: impl Into<String>, type_name: impl ToString) -> Self {
        self.field(name, ValueSpec::Bare(type_name.to_string()))
    }

    /// Declare `name` with a type and a default value. A JSON `null` default
    /// declares no default, as it does in [`SchemaDefinition::from_json`].
    pub fn with_default(
        self,
        name: impl Into<String>,
        type_name: impl ToString,
        default: impl Into<serde_json::Value>,
    ) -> Self {
        self.field(
            name,
            ValueSpec::Options {
                type_name: type_name.to_string(),
                default: Some(default.into()).filter(|raw| !raw.is_null()),
            },
        )
    }

    /// Parse a definition from a JSON document such as
    /// `{"count": "int", "label": {"type": "string", "default": "n/a"}}`.
    pub fn from_json(doc: &serde_json::Value) -> StoreResult<Self> {
        let object = match doc {
            serde_json::Value::Null => {
                return Err(StoreError::Schema("Schema has to be defined!".into()));
            }
            serde_json::Value::Object(object) => object,
            _ => return Err(StoreError::Schema("Schema has to be an object!".into())),
        };

        let mut definition = SchemaDefinition::new();
        for (name, raw_spec) in object {
            let spec = match raw_spec {
                serde_json::Value::String(type_name) => ValueSpec::Bare(type_name.clone()),
                serde_json::Value::Object(_) => {
                    serde_json::from_value::<ValueSpec>(raw_spec.clone())
                        .ok()
                        .filter(|spec| matches!(spec, ValueSpec::Options { .. }))
                        .ok_or_else(|| {
                            StoreError::Schema(format!("Key's {name} definition is not valid!"))
                        })?
                }
                _ => {
                    return Err(StoreError::Schema(format!(
                        "Key's {name} definition needs to be either string or object!"
                    )));
                }
            };
            definition = definition.field(name.as_str(), spec);
        }
        Ok(definition)
    }

    /// Parse a definition from JSON text.
    pub fn from_json_str(text: &str) -> StoreResult<Self> {
        let doc: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| StoreError::Schema(format!("Schema is not valid JSON: {e}")))?;
        Self::from_json(&doc)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValueSpec)> {
        self.entries.iter().map(|(name, spec)| (name.as_str(), spec))
    }
}

/// Normalized spec of one schema entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub tag: TypeTag,
    pub default: Option<Value>,
}

/// A validated schema: every key has a recognized tag and a well-typed default.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: HashMap<String, FieldSpec>,
    order: Vec<String>,
}

impl Schema {
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Always false for a validated schema; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Declared key names, in definition order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

/// Validate a definition and normalize it into a [`Schema`].
pub fn validate(definition: &SchemaDefinition) -> StoreResult<Schema> {
    if definition.is_empty() {
        return Err(StoreError::Schema("Schema must not be empty!".into()));
    }

    let mut fields = HashMap::with_capacity(definition.len());
    let mut order = Vec::with_capacity(definition.len());

    for (name, spec) in definition.iter() {
        if name.is_empty() {
            return Err(StoreError::Schema(format!(
                "Key name \"{name}\" is not a valid name!"
            )));
        }

        let field = match spec {
            ValueSpec::Bare(type_name) => FieldSpec {
                tag: type_name.parse().map_err(|_| {
                    StoreError::Schema(format!(
                        "Key {name} is defined with unknown type {type_name}"
                    ))
                })?,
                default: None,
            },
            ValueSpec::Options { type_name, default } => {
                let tag: TypeTag = type_name.parse().map_err(|_| {
                    StoreError::Schema(format!("Key's {name} definition is not valid!"))
                })?;
                let default = match default {
                    Some(raw) if !raw.is_null() => Some(coerce_default(name, tag, raw)?),
                    _ => None,
                };
                FieldSpec { tag, default }
            }
        };

        fields.insert(name.to_string(), field);
        order.push(name.to_string());
    }

    Ok(Schema { fields, order })
}

fn coerce_default(name: &str, tag: TypeTag, raw: &serde_json::Value) -> StoreResult<Value> {
    let value = Value::from(raw.clone());
    if types::validate(&value, tag) {
        Ok(value)
    } else {
        Err(StoreError::Schema(format!(
            "Default value for key {name} does not match type {tag}!"
        )))
    }
}
