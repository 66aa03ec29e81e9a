//! Runtime value model: the tagged union flowing through registers.
//!
//! Two outcomes that look similar are kept strictly apart everywhere:
//! `Null` (SQL NULL, a first-class value) and `Empty` (the "no value was
//! produced" marker). `JsonNull` is the JSON null inside documents, which is
//! yet another thing: it compares as unknown but serializes as a value.

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::numeric::NumericKind;

/// One field-ordered record (document row). Field order is the compile-time
/// declaration order and is preserved by serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Set a field, replacing an existing one of the same name in place.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// JSON null inside a document; distinct from SQL NULL.
    JsonNull,
    /// "No value produced" marker; never stored in documents.
    Empty,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(BigDecimal),
    Str(String),
    Timestamp(DateTime<Utc>),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Record(Record),
}

impl Value {
    /// SQL NULL (not JSON null, not EMPTY).
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Any of the "unknown" markers for three-valued comparisons.
    pub fn is_any_null(&self) -> bool {
        matches!(self, Value::Null | Value::JsonNull)
    }

    pub fn is_empty_marker(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_kind().is_some()
    }

    pub fn numeric_kind(&self) -> Option<NumericKind> {
        match self {
            Value::Int(_) => Some(NumericKind::Int),
            Value::Long(_) => Some(NumericKind::Long),
            Value::Float(_) => Some(NumericKind::Float),
            Value::Double(_) => Some(NumericKind::Double),
            Value::Decimal(_) => Some(NumericKind::Decimal),
            _ => None,
        }
    }

    /// Complex values are excluded from ordering: min/max skips them and sort
    /// keys reject them. Binary is deliberately in this set.
    pub fn is_complex(&self) -> bool {
        matches!(
            self,
            Value::Binary(_) | Value::Array(_) | Value::Map(_) | Value::Record(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i as i64),
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Stable name of the value's type for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::JsonNull => "json-null",
            Value::Empty => "empty",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::Str(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
        }
    }

    /// Rough live-heap estimate used by the per-query memory ceiling.
    /// Deliberately coarse; buffering operators only need a stable
    /// order-of-magnitude figure.
    pub fn size_bytes(&self) -> u64 {
        const BASE: u64 = 16;
        match self {
            Value::Null | Value::JsonNull | Value::Empty | Value::Bool(_) => BASE,
            Value::Int(_) | Value::Float(_) => BASE,
            Value::Long(_) | Value::Double(_) | Value::Timestamp(_) => BASE + 8,
            Value::Decimal(d) => BASE + d.digits() as u64 + 8,
            Value::Str(s) => BASE + s.len() as u64,
            Value::Binary(b) => BASE + b.len() as u64,
            Value::Array(items) => BASE + items.iter().map(Value::size_bytes).sum::<u64>(),
            Value::Map(entries) => {
                BASE + entries
                    .iter()
                    .map(|(k, v)| k.len() as u64 + v.size_bytes())
                    .sum::<u64>()
            }
            Value::Record(rec) => {
                BASE + rec
                    .fields()
                    .map(|(n, v)| n.len() as u64 + v.size_bytes())
                    .sum::<u64>()
            }
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_set_replaces_in_place() {
        let mut rec = Record::new();
        rec.set("a", Value::Int(1));
        rec.set("b", Value::Int(2));
        rec.set("a", Value::Int(3));
        assert_eq!(rec.len(), 2);
        assert_eq!(rec.get("a"), Some(&Value::Int(3)));
        // Order preserved
        let names: Vec<_> = rec.fields().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn null_kinds_stay_distinct() {
        assert!(Value::Null.is_null());
        assert!(!Value::JsonNull.is_null());
        assert!(Value::JsonNull.is_any_null());
        assert!(!Value::Empty.is_any_null());
        assert!(Value::Empty.is_empty_marker());
    }
}
