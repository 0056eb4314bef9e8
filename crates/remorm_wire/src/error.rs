//! Error types for value and type conversion.

use thiserror::Error;

/// Result type for type conversion operations.
pub type TypeResult<T> = Result<T, TypeError>;

/// Errors raised by the type registry and scalar converters.
#[derive(Debug, Error)]
pub enum TypeError {
    /// No converter is registered under the requested name.
    #[error("unknown scalar type: {name}")]
    UnknownType {
        /// The requested type name.
        name: String,
    },

    /// A converter is already registered under this name.
    #[error("scalar type already registered: {name}")]
    AlreadyRegistered {
        /// The duplicated type name.
        name: String,
    },

    /// A value could not be converted by the named converter.
    #[error("cannot convert {kind} value with type '{type_name}': {message}")]
    Conversion {
        /// Converter name.
        type_name: String,
        /// Kind of the offending value.
        kind: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// A value has no wire (JSON) representation.
    #[error("value of kind {kind} is not wire-representable")]
    NotWireRepresentable {
        /// Kind of the offending value.
        kind: &'static str,
    },

    /// A datetime format option is invalid or the text does not match it.
    #[error("invalid datetime format: {message}")]
    InvalidFormat {
        /// Description of the failure.
        message: String,
    },
}

impl TypeError {
    /// Creates an unknown-type error.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownType { name: name.into() }
    }

    /// Creates an already-registered error.
    pub fn already_registered(name: impl Into<String>) -> Self {
        Self::AlreadyRegistered { name: name.into() }
    }

    /// Creates a conversion error.
    pub fn conversion(
        type_name: impl Into<String>,
        kind: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Conversion {
            type_name: type_name.into(),
            kind,
            message: message.into(),
        }
    }

    /// Creates an invalid-format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }
}
