//! Scalar values flowing between entries, expressions and execution engines.
//!
//! [`Value`] is the engine-neutral scalar type. It is what the result
//! unflattener reads out of rows, what conditions bind as variables and what
//! the persistence layer writes back. SQL-backed engines convert it into a
//! `sea_query::Value` when a statement is rendered (see `statement::sql`).
//!
//! ## Conversions
//!
//! - Integer types: `i32`, `i64`, `u32` → [`Value::Int`]
//! - Floating point: `f32`, `f64` → [`Value::Float`]
//! - Boolean: `bool` → [`Value::Bool`]
//! - Text: `&str`, `String` → [`Value::Text`]
//! - Binary: `Vec<u8>` → [`Value::Bytes`]
//! - `Option<T>` for all above types (`None` → [`Value::Null`])

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single scalar value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL `NULL`
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Signed integer value (all integer widths are widened to `i64`)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Text value
    Text(String),
    /// Binary value
    Bytes(Vec<u8>),
}

impl Value {
    /// Whether this value is `NULL`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value carries no information: `NULL` or an empty text.
    ///
    /// The unflattener uses this to decide if an outer-joined relation really
    /// matched a row.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(text) => text.is_empty(),
            Value::Bytes(bytes) => bytes.is_empty(),
            _ => false,
        }
    }

    /// Integer view of this value, if it has one
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Text(text) => text.parse().ok(),
            _ => None,
        }
    }

    /// Float view of this value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Text view of this value, if it is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Truthiness used when a value is evaluated as a condition
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(text) => !text.is_empty(),
            Value::Bytes(bytes) => !bytes.is_empty(),
        }
    }

    /// SQL-style comparison: `NULL` compares to nothing, integers and floats
    /// compare numerically, everything else only within its own kind.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Text(text), number @ (Value::Int(_) | Value::Float(_))) => {
                Value::Float(text.parse().ok()?).compare(number)
            }
            (number @ (Value::Int(_) | Value::Float(_)), Value::Text(text)) => {
                number.compare(&Value::Float(text.parse().ok()?))
            }
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }

    /// Total ordering used for sorting rows; `NULL` sorts first.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .compare(other)
                .unwrap_or_else(|| self.key().cmp(&other.key())),
        }
    }

    /// Canonical string form used to key maps by value (ids, index-on keys).
    ///
    /// Integers and integral floats share a key so `1` and `1.0` group together.
    pub fn key(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => (*f as i64).to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(text) => text.clone(),
            Value::Bytes(bytes) => bytes.iter().map(|byte| format!("{byte:02x}")).collect(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Text(text) => write!(f, "'{}'", text.replace('\'', "''")),
            other => write!(f, "{}", other.key()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<&Value> for sea_query::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => sea_query::Value::String(None),
            Value::Bool(b) => sea_query::Value::Bool(Some(*b)),
            Value::Int(i) => sea_query::Value::BigInt(Some(*i)),
            Value::Float(f) => sea_query::Value::Double(Some(*f)),
            Value::Text(text) => sea_query::Value::String(Some(text.clone())),
            Value::Bytes(bytes) => sea_query::Value::Bytes(Some(bytes.clone())),
        }
    }
}
