//! Tagged-union wire schema.
//!
//! Every payload on the wire is one [`Value`]. Serialized through serde as an
//! externally tagged enum, so each encoded value carries exactly one populated
//! slot named after its kind:
//!
//! ```text
//! nullValue | numberValue | stringValue | boolValue | structValue | listValue
//! ```
//!
//! Decoding dispatches on that slot name; there is no runtime shape sniffing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CorrwireError, Result};

/// Maximum nesting of structs and lists accepted by [`verify`].
pub const MAX_NESTING_DEPTH: usize = 100;

/// A wire value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[serde(rename = "nullValue")]
    Null,
    #[serde(rename = "numberValue")]
    Number(f64),
    #[serde(rename = "stringValue")]
    String(String),
    #[serde(rename = "boolValue")]
    Bool(bool),
    #[serde(rename = "structValue")]
    Struct(Struct),
    #[serde(rename = "listValue")]
    List(ListValue),
}

/// String-keyed mapping of wire values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Struct {
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

/// Ordered sequence of wire values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListValue {
    #[serde(default)]
    pub values: Vec<Value>,
}

impl Value {
    /// Name of the populated slot.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "nullValue",
            Value::Number(_) => "numberValue",
            Value::String(_) => "stringValue",
            Value::Bool(_) => "boolValue",
            Value::Struct(_) => "structValue",
            Value::List(_) => "listValue",
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_struct(self) -> Option<Struct> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }
}

impl Struct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, returning the previous value under that key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for Struct {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Value>> for ListValue {
    fn from(values: Vec<Value>) -> Self {
        Self { values }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
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

impl From<Struct> for Value {
    fn from(s: Struct) -> Self {
        Value::Struct(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(ListValue { values })
    }
}

/// Check a value against the schema.
///
/// Numbers must be finite and nesting must stay within
/// [`MAX_NESTING_DEPTH`].
pub fn verify(value: &Value) -> Result<()> {
    // Explicit stack: deeply nested input must not exhaust the call stack.
    let mut stack = vec![(value, 0usize, String::from("$"))];

    while let Some((value, depth, path)) = stack.pop() {
        if depth > MAX_NESTING_DEPTH {
            return Err(CorrwireError::Validation(format!(
                "{}: nesting exceeds {} levels",
                path, MAX_NESTING_DEPTH
            )));
        }

        match value {
            Value::Number(n) if !n.is_finite() => {
                return Err(CorrwireError::Validation(format!(
                    "{}: number {} is not finite",
                    path, n
                )));
            }
            Value::Struct(s) => {
                for (key, field) in &s.fields {
                    stack.push((field, depth + 1, format!("{}.{}", path, key)));
                }
            }
            Value::List(list) => {
                for (i, item) in list.values.iter().enumerate() {
                    stack.push((item, depth + 1, format!("{}[{}]", path, i)));
                }
            }
            _ => {}
        }
    }

    Ok(())
}
