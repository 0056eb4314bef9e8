//! Dynamic value type for wire records and domain values.

use crate::error::{TypeError, TypeResult};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// A wire record: a map from wire field names to values.
pub type Record = BTreeMap<String, Value>;

/// A dynamic value.
///
/// `Value` is used on both sides of the conversion pipeline. Wire records
/// (what the remote API sends and receives) only ever contain the
/// JSON-representable variants; `DateTime` exists on the domain side and
/// is translated by the `datetime`/`timestamp` converters before a value
/// reaches the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// Map keyed by field name. Keys are sorted (BTreeMap) so records
    /// compare and serialize deterministically.
    Map(Record),
    /// Point in time. Domain side only; never wire-representable as-is.
    DateTime(OffsetDateTime),
}

impl Value {
    /// Returns a short name for this value's kind, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Returns true if this is `Value::Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float if this is a `Float` (or a lossless `Int`).
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the text if this is a `Text`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements if this is an `Array`.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the record if this is a `Map`.
    #[must_use]
    pub fn as_map(&self) -> Option<&Record> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the datetime if this is a `DateTime`.
    #[must_use]
    pub fn as_datetime(&self) -> Option<OffsetDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Looks up a field on a `Map` value.
    ///
    /// Returns `None` both when the value is not a map and when the field
    /// is absent. The hydrator uses explicit record access instead; this is
    /// a convenience for tests and criteria handling.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(field))
    }

    /// Renders this value as a flat scalar token.
    ///
    /// Used by the identifier flattener. Maps and arrays have no scalar
    /// token; `Null` renders empty (the "not yet identifiable" marker).
    #[must_use]
    pub fn to_token(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Array(_) | Value::Map(_) => None,
            Value::DateTime(dt) => Some(dt.unix_timestamp().to_string()),
        }
    }

    /// Converts this value into its JSON representation.
    ///
    /// Fails for `DateTime` (and for non-finite floats), which must be run
    /// through a scalar converter first.
    pub fn to_json(&self) -> TypeResult<serde_json::Value> {
        match self {
            Value::Null => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Int(i) => Ok(serde_json::Value::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or(TypeError::NotWireRepresentable { kind: "float" }),
            Value::Text(s) => Ok(serde_json::Value::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Value::to_json)
                .collect::<TypeResult<Vec<_>>>()
                .map(serde_json::Value::Array),
            Value::Map(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), value.to_json()?);
                }
                Ok(serde_json::Value::Object(out))
            }
            Value::DateTime(_) => Err(TypeError::NotWireRepresentable { kind: "datetime" }),
        }
    }

    /// Builds a value from its JSON representation.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
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

impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        let mut record = Record::new();
        record.insert("id".into(), Value::Int(7));
        record.insert("name".into(), Value::Text("alice".into()));
        record.insert("active".into(), Value::Bool(true));
        record.insert(
            "tags".into(),
            Value::Array(vec![Value::Text("a".into()), Value::Text("b".into())]),
        );
        record
    }

    #[test]
    fn accessors_match_variants() {
        assert_eq!(Value::Int(5).as_int(), Some(5));
        assert_eq!(Value::Text("x".into()).as_text(), Some("x"));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(5).as_text(), None);
        assert!(Value::Null.is_null());
    }

    #[test]
    fn json_round_trip() {
        let value = Value::Map(sample_record());
        let json = value.to_json().unwrap();
        let back = Value::from_json(&json);
        assert_eq!(value, back);
    }

    #[test]
    fn datetime_is_not_wire_representable() {
        let value = Value::DateTime(OffsetDateTime::UNIX_EPOCH);
        assert!(value.to_json().is_err());
    }

    #[test]
    fn tokens() {
        assert_eq!(Value::Int(7).to_token().as_deref(), Some("7"));
        assert_eq!(Value::Text("x y".into()).to_token().as_deref(), Some("x y"));
        assert_eq!(Value::Null.to_token().as_deref(), Some(""));
        assert!(Value::Map(Record::new()).to_token().is_none());
    }

    #[test]
    fn map_field_lookup() {
        let value = Value::Map(sample_record());
        assert_eq!(value.get("id"), Some(&Value::Int(7)));
        assert_eq!(value.get("missing"), None);
        assert_eq!(Value::Int(1).get("id"), None);
    }
}
