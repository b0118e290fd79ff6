//! Flattening of semi-structured activity records into a single table row.
//!
//! Each field is classified as either a scalar or a nested structure; nested
//! fields (objects and arrays) are dropped, everything else becomes a column
//! in input key order. Column names are unique ignoring case, as in MySQL;
//! the first key of a case-insensitive clash wins.

use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Integer(i64),
    /// Only for values that do not fit an `i64`.
    Unsigned(u64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(ScalarValue),
    Nested(Value),
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Scalar(ScalarValue::Null),
            Value::Bool(b) => FieldValue::Scalar(ScalarValue::Bool(b)),
            Value::Number(n) => FieldValue::Scalar(number_to_scalar(&n)),
            Value::String(s) => FieldValue::Scalar(ScalarValue::Text(s)),
            nested @ (Value::Array(_) | Value::Object(_)) => FieldValue::Nested(nested),
        }
    }
}

fn number_to_scalar(n: &Number) -> ScalarValue {
    if let Some(i) = n.as_i64() {
        ScalarValue::Integer(i)
    } else if let Some(u) = n.as_u64() {
        ScalarValue::Unsigned(u)
    } else {
        // a Number that is neither i64 nor u64 is always representable as f64
        ScalarValue::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRow {
    columns: Vec<(String, ScalarValue)>,
    dropped: Vec<String>,
}

impl NormalizedRow {
    pub fn columns(&self) -> &[(String, ScalarValue)] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Names of the fields removed because they held nested structures.
    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotARecord(pub &'static str);

impl std::fmt::Display for NotARecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected a JSON object, got {}", self.0)
    }
}

impl std::error::Error for NotARecord {}

pub fn normalize(record: Map<String, Value>) -> NormalizedRow {
    let mut row = NormalizedRow::default();
    let mut seen = HashSet::new();

    for (name, value) in record {
        match FieldValue::from(value) {
            FieldValue::Scalar(scalar) => {
                if seen.insert(name.to_lowercase()) {
                    row.columns.push((name, scalar));
                } else {
                    warn!("Ignoring field {} that clashes with an earlier column", name);
                }
            }
            FieldValue::Nested(_) => row.dropped.push(name),
        }
    }

    row
}

/// Normalize an arbitrary JSON document; only objects can become a row.
pub fn normalize_json(value: Value) -> Result<NormalizedRow, NotARecord> {
    match value {
        Value::Object(record) => Ok(normalize(record)),
        Value::Array(_) => Err(NotARecord("an array")),
        Value::String(_) => Err(NotARecord("a string")),
        Value::Number(_) => Err(NotARecord("a number")),
        Value::Bool(_) => Err(NotARecord("a boolean")),
        Value::Null => Err(NotARecord("null")),
    }
}
