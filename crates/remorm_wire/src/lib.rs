//! # RemORM Wire
//!
//! Dynamic values and scalar type conversion for RemORM.
//!
//! This crate provides:
//! - `Value`, the dynamic value type used for wire records and domain values
//! - `ScalarType`, the converter contract between domain and wire values
//! - `TypeRegistry`, the pluggable registry of named scalar converters
//! - JSON interop used by the cache layer
//!
//! A *wire record* is a `Value::Map` keyed by wire field names, exactly as
//! the remote API sends and receives it. Domain values may additionally be
//! `Value::DateTime`; converters translate those to wire-representable
//! values before anything leaves the process.
//!
//! ## Usage
//!
//! ```
//! use remorm_wire::{TypeRegistry, TypeOptions, Value};
//!
//! let registry = TypeRegistry::with_builtins();
//! let int = registry.get("int").unwrap();
//!
//! let wire = int.to_wire(&Value::Int(42), &TypeOptions::new()).unwrap();
//! assert_eq!(wire, Value::Int(42));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod registry;
mod types;
mod value;

pub use error::{TypeError, TypeResult};
pub use registry::TypeRegistry;
pub use types::{
    ArrayType, BoolType, DateTimeType, FloatType, IntType, ScalarType, StringType, TimestampType,
    TypeOptions, DATETIME_FORMAT_OPTION,
};
pub use value::{Record, Value};
