//! Built-in scalar converters.

use crate::error::{TypeError, TypeResult};
use crate::value::Value;
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Per-field converter options, taken from the field mapping.
pub type TypeOptions = BTreeMap<String, Value>;

/// Option key selecting a custom datetime format description.
pub const DATETIME_FORMAT_OPTION: &str = "format";

/// Converter between domain values and wire values for one scalar type.
///
/// Converters are registered by name in a `TypeRegistry` and looked up via
/// the field mapping's declared type. For the plain scalar types the two
/// directions are involutive: `from_wire(to_wire(x)) == x`.
pub trait ScalarType: std::fmt::Debug + Send + Sync {
    /// The registry name of this converter.
    fn name(&self) -> &'static str;

    /// Converts a domain value into its wire representation.
    fn to_wire(&self, value: &Value, options: &TypeOptions) -> TypeResult<Value>;

    /// Converts a wire value into its domain representation.
    fn from_wire(&self, value: &Value, options: &TypeOptions) -> TypeResult<Value>;
}

/// `string`: text on both sides; numbers and booleans are stringified.
#[derive(Debug, Default)]
pub struct StringType;

impl ScalarType for StringType {
    fn name(&self) -> &'static str {
        "string"
    }

    fn to_wire(&self, value: &Value, _options: &TypeOptions) -> TypeResult<Value> {
        coerce_text(self.name(), value)
    }

    fn from_wire(&self, value: &Value, _options: &TypeOptions) -> TypeResult<Value> {
        coerce_text(self.name(), value)
    }
}

/// `int`: integer on both sides; numeric text is parsed.
#[derive(Debug, Default)]
pub struct IntType;

impl ScalarType for IntType {
    fn name(&self) -> &'static str {
        "int"
    }

    fn to_wire(&self, value: &Value, _options: &TypeOptions) -> TypeResult<Value> {
        coerce_int(self.name(), value)
    }

    fn from_wire(&self, value: &Value, _options: &TypeOptions) -> TypeResult<Value> {
        coerce_int(self.name(), value)
    }
}

/// `float`: float on both sides; integers widen, numeric text is parsed.
#[derive(Debug, Default)]
pub struct FloatType;

impl ScalarType for FloatType {
    fn name(&self) -> &'static str {
        "float"
    }

    fn to_wire(&self, value: &Value, _options: &TypeOptions) -> TypeResult<Value> {
        coerce_float(self.name(), value)
    }

    fn from_wire(&self, value: &Value, _options: &TypeOptions) -> TypeResult<Value> {
        coerce_float(self.name(), value)
    }
}

/// `bool`: boolean on both sides; 0/1 integers are accepted.
#[derive(Debug, Default)]
pub struct BoolType;

impl ScalarType for BoolType {
    fn name(&self) -> &'static str {
        "bool"
    }

    fn to_wire(&self, value: &Value, _options: &TypeOptions) -> TypeResult<Value> {
        coerce_bool(self.name(), value)
    }

    fn from_wire(&self, value: &Value, _options: &TypeOptions) -> TypeResult<Value> {
        coerce_bool(self.name(), value)
    }
}

/// `array`: passed through unchanged in both directions.
#[derive(Debug, Default)]
pub struct ArrayType;

impl ScalarType for ArrayType {
    fn name(&self) -> &'static str {
        "array"
    }

    fn to_wire(&self, value: &Value, _options: &TypeOptions) -> TypeResult<Value> {
        match value {
            Value::Null | Value::Array(_) => Ok(value.clone()),
            other => Err(TypeError::conversion(
                self.name(),
                other.kind(),
                "expected an array",
            )),
        }
    }

    fn from_wire(&self, value: &Value, options: &TypeOptions) -> TypeResult<Value> {
        self.to_wire(value, options)
    }
}

/// `datetime`: formatted text on the wire, `Value::DateTime` in the domain.
///
/// The format is taken from the `format` option (a `time` format
/// description such as `[year]-[month]-[day] [hour]:[minute]:[second]`);
/// without one, RFC 3339 is used. Conversion is format-preserving: parsing
/// a wire value and formatting it back yields the original text as long as
/// the format covers every emitted component.
#[derive(Debug, Default)]
pub struct DateTimeType;

impl ScalarType for DateTimeType {
    fn name(&self) -> &'static str {
        "datetime"
    }

    fn to_wire(&self, value: &Value, options: &TypeOptions) -> TypeResult<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::DateTime(dt) => Ok(Value::Text(format_datetime(*dt, options)?)),
            // Already formatted; trust the caller.
            Value::Text(s) => Ok(Value::Text(s.clone())),
            other => Err(TypeError::conversion(
                self.name(),
                other.kind(),
                "expected a datetime",
            )),
        }
    }

    fn from_wire(&self, value: &Value, options: &TypeOptions) -> TypeResult<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Text(s) => Ok(Value::DateTime(parse_datetime(s, options)?)),
            Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
            other => Err(TypeError::conversion(
                self.name(),
                other.kind(),
                "expected datetime text",
            )),
        }
    }
}

/// `timestamp`: unix seconds on the wire, `Value::DateTime` in the domain.
#[derive(Debug, Default)]
pub struct TimestampType;

impl ScalarType for TimestampType {
    fn name(&self) -> &'static str {
        "timestamp"
    }

    fn to_wire(&self, value: &Value, _options: &TypeOptions) -> TypeResult<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::DateTime(dt) => Ok(Value::Int(dt.unix_timestamp())),
            Value::Int(i) => Ok(Value::Int(*i)),
            other => Err(TypeError::conversion(
                self.name(),
                other.kind(),
                "expected a datetime or unix seconds",
            )),
        }
    }

    fn from_wire(&self, value: &Value, _options: &TypeOptions) -> TypeResult<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Int(i) => OffsetDateTime::from_unix_timestamp(*i)
                .map(Value::DateTime)
                .map_err(|e| TypeError::conversion(self.name(), "int", e.to_string())),
            Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
            other => Err(TypeError::conversion(
                self.name(),
                other.kind(),
                "expected unix seconds",
            )),
        }
    }
}

fn coerce_text(type_name: &str, value: &Value) -> TypeResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Text(s) => Ok(Value::Text(s.clone())),
        Value::Int(i) => Ok(Value::Text(i.to_string())),
        Value::Float(f) => Ok(Value::Text(f.to_string())),
        Value::Bool(b) => Ok(Value::Text(b.to_string())),
        other => Err(TypeError::conversion(
            type_name,
            other.kind(),
            "expected text",
        )),
    }
}

fn coerce_int(type_name: &str, value: &Value) -> TypeResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Text(s) => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| TypeError::conversion(type_name, "text", e.to_string())),
        other => Err(TypeError::conversion(
            type_name,
            other.kind(),
            "expected an integer",
        )),
    }
}

fn coerce_float(type_name: &str, value: &Value) -> TypeResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Float(f) => Ok(Value::Float(*f)),
        #[allow(clippy::cast_precision_loss)]
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Text(s) => s
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| TypeError::conversion(type_name, "text", e.to_string())),
        other => Err(TypeError::conversion(
            type_name,
            other.kind(),
            "expected a float",
        )),
    }
}

fn coerce_bool(type_name: &str, value: &Value) -> TypeResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Int(0) => Ok(Value::Bool(false)),
        Value::Int(1) => Ok(Value::Bool(true)),
        other => Err(TypeError::conversion(
            type_name,
            other.kind(),
            "expected a boolean",
        )),
    }
}

fn format_datetime(dt: OffsetDateTime, options: &TypeOptions) -> TypeResult<String> {
    match options.get(DATETIME_FORMAT_OPTION).and_then(Value::as_text) {
        Some(format) => {
            let description = time::format_description::parse(format)
                .map_err(|e| TypeError::invalid_format(e.to_string()))?;
            dt.format(&description)
                .map_err(|e| TypeError::invalid_format(e.to_string()))
        }
        None => dt
            .format(&Rfc3339)
            .map_err(|e| TypeError::invalid_format(e.to_string())),
    }
}

fn parse_datetime(text: &str, options: &TypeOptions) -> TypeResult<OffsetDateTime> {
    match options.get(DATETIME_FORMAT_OPTION).and_then(Value::as_text) {
        Some(format) => {
            let description = time::format_description::parse(format)
                .map_err(|e| TypeError::invalid_format(e.to_string()))?;
            // Formats without an offset component parse as primitive
            // datetimes and are taken to be UTC.
            match OffsetDateTime::parse(text, &description) {
                Ok(dt) => Ok(dt),
                Err(_) => PrimitiveDateTime::parse(text, &description)
                    .map(PrimitiveDateTime::assume_utc)
                    .map_err(|e| TypeError::invalid_format(e.to_string())),
            }
        }
        None => OffsetDateTime::parse(text, &Rfc3339)
            .map_err(|e| TypeError::invalid_format(e.to_string())),
    }
}
