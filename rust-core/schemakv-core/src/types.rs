// SPDX-License-Identifier: PMPL-1.0-or-later
//! Type engine: type tags, native values and the string encoding used for
//! persisted rows.
//!
//! Every stored value is declared with one of five [`TypeTag`]s. Values live
//! in the cache in native form ([`Value`]) and are written to the backing
//! store as strings produced by [`encode`]; [`decode`] turns a persisted
//! string back into a native value for a given tag.
//!
//! Decoding is deliberately lenient for scalars: `bool` is `true` only for the
//! exact literal `"true"`, and unparseable numbers decode to NaN instead of
//! failing. Only malformed `json` payloads are rejected.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Declared type of a schema entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Int,
    Float,
    Bool,
    String,
    Json,
}

impl TypeTag {
    /// All recognized tags.
    pub const ALL: [TypeTag; 5] = [
        TypeTag::Int,
        TypeTag::Float,
        TypeTag::Bool,
        TypeTag::String,
        TypeTag::Json,
    ];

    /// Textual name used in schema definitions.
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Bool => "bool",
            TypeTag::String => "string",
            TypeTag::Json => "json",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| StoreError::Parse(format!("Unknown type {s}")))
    }
}

/// A value in native form.
///
/// `Json` payloads are shared behind an `Arc` and never mutated once stored;
/// readers get a cheap clone of the same payload.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(Arc<serde_json::Value>),
}

impl Value {
    /// Wrap a structured JSON payload.
    pub fn json(payload: serde_json::Value) -> Self {
        Value::Json(Arc::new(payload))
    }

    /// Short name of the native kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Json(_) => "json",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view; whole-valued floats inside the `i64` range convert as well.
    pub fn as_i64(&self) -> Option<i64> {
        // `i64::MAX as f64` rounds up to 2^63, which is itself out of range.
        const LOWER: f64 = i64::MIN as f64;
        const UPPER: f64 = i64::MAX as f64;
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && *f >= LOWER && *f < UPPER => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(payload) => Some(payload),
            _ => None,
        }
    }

    /// Convert any value into a JSON document (NaN and infinities become `null`).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Json(payload) => payload.as_ref().clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            // Numbers compare by magnitude regardless of representation.
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// JSON scalars map onto the matching native variant; everything else is
/// kept as a structured payload.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            other => Value::json(other),
        }
    }
}

/// Decode a persisted string into a native value of type `tag`.
///
/// Only `json` can fail; numeric garbage yields NaN.
pub fn decode(raw: &str, tag: TypeTag) -> StoreResult<Value> {
    match tag {
        TypeTag::Bool => Ok(Value::Bool(raw == "true")),
        TypeTag::Int => Ok(parse_int(raw)),
        TypeTag::Float => Ok(parse_float(raw)),
        TypeTag::Json => serde_json::from_str(raw)
            .map(Value::json)
            .map_err(|e| StoreError::Parse(format!("Invalid json payload: {e}"))),
        TypeTag::String => Ok(Value::String(raw.to_string())),
    }
}

/// [`decode`] with a textual tag; unknown tags fail with a parse error.
pub fn decode_named(raw: &str, tag: &str) -> StoreResult<Value> {
    decode(raw, tag.parse()?)
}

/// Encode a native value into its persisted string form.
pub fn encode(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => encode_float(*f),
        Value::String(s) => s.clone(),
        Value::Json(payload) => payload.to_string(),
    }
}

/// Check whether `value` is acceptable for an entry declared as `tag`.
///
/// `int` and `float` share one numeric check.
pub fn validate(value: &Value, tag: TypeTag) -> bool {
    match tag {
        TypeTag::Bool => matches!(value, Value::Bool(_)),
        TypeTag::Int | TypeTag::Float => matches!(value, Value::Int(_) | Value::Float(_)),
        TypeTag::Json => {
            matches!(value, Value::Json(payload) if payload.is_object() || payload.is_array())
        }
        TypeTag::String => matches!(value, Value::String(_)),
    }
}

/// [`validate`] with a textual tag; unknown tags fail with a parse error.
pub fn validate_named(value: &Value, tag: &str) -> StoreResult<bool> {
    Ok(validate(value, tag.parse()?))
}

fn encode_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        (if f > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else {
        f.to_string()
    }
}

/// Leading-integer parse: optional sign, then digits; anything after the
/// digits is ignored.
fn parse_int(raw: &str) -> Value {
    let s = raw.trim_start();
    let (sign, rest) = split_sign(s);
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return Value::Float(f64::NAN);
    }
    let literal = format!("{sign}{}", &rest[..digits_len]);
    match literal.parse::<i64>() {
        Ok(i) => Value::Int(i),
        // Out of i64 range: keep the magnitude as a float.
        Err(_) => Value::Float(literal.parse::<f64>().unwrap_or(f64::NAN)),
    }
}

/// Longest-prefix decimal parse, accepting `Infinity` as well.
fn parse_float(raw: &str) -> Value {
    let s = raw.trim_start();
    let (sign, rest) = split_sign(s);
    if rest.starts_with("Infinity") {
        let inf = if sign == "-" { f64::NEG_INFINITY } else { f64::INFINITY };
        return Value::Float(inf);
    }

    let bytes = rest.as_bytes();
    let mut end = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    let int_digits = end;
    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = bytes[end + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return Value::Float(f64::NAN);
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = bytes[exp_end.min(bytes.len())..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }

    format!("{sign}{}", &rest[..end])
        .parse::<f64>()
        .map(Value::Float)
        .unwrap_or(Value::Float(f64::NAN))
}

fn split_sign(s: &str) -> (&str, &str) {
    match s.as_bytes().first() {
        Some(b'-') => ("-", &s[1..]),
        Some(b'+') => ("", &s[1..]),
        _ => ("", s),
    }
}
