//! Registry of named scalar converters.

use crate::error::{TypeError, TypeResult};
use crate::types::{
    ArrayType, BoolType, DateTimeType, FloatType, IntType, ScalarType, StringType, TimestampType,
};
use std::collections::HashMap;
use std::sync::Arc;

/// The pluggable registry of scalar converters.
///
/// Converters are resolved by the type name declared on a field mapping.
/// Registering a duplicate name or resolving an unknown one is a
/// configuration error and fails loudly.
pub struct TypeRegistry {
    types: HashMap<&'static str, Arc<dyn ScalarType>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Creates a registry with the seven built-in converters installed.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        // Built-in names are unique, registration cannot fail here.
        let builtins: Vec<Arc<dyn ScalarType>> = vec![
            Arc::new(StringType),
            Arc::new(IntType),
            Arc::new(FloatType),
            Arc::new(BoolType),
            Arc::new(ArrayType),
            Arc::new(DateTimeType),
            Arc::new(TimestampType),
        ];
        for converter in builtins {
            let _ = registry.register(converter);
        }
        registry
    }

    /// Registers a converter under its own name.
    ///
    /// Fails with `TypeError::AlreadyRegistered` if the name is taken.
    pub fn register(&mut self, converter: Arc<dyn ScalarType>) -> TypeResult<()> {
        let name = converter.name();
        if self.types.contains_key(name) {
            return Err(TypeError::already_registered(name));
        }
        self.types.insert(name, converter);
        Ok(())
    }

    /// Resolves a converter by name.
    pub fn get(&self, name: &str) -> TypeResult<Arc<dyn ScalarType>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| TypeError::unknown(name))
    }

    /// Returns true if a converter is registered under this name.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_resolvable() {
        let registry = TypeRegistry::with_builtins();
        for name in ["string", "int", "float", "bool", "array", "datetime", "timestamp"] {
            assert!(registry.has(name), "missing builtin {name}");
        }
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = TypeRegistry::with_builtins();
        let err = registry.get("decimal").unwrap_err();
        assert!(matches!(err, TypeError::UnknownType { .. }));
    }

    #[test]
    fn redeclaring_a_type_is_an_error() {
        let mut registry = TypeRegistry::with_builtins();
        let err = registry.register(Arc::new(IntType)).unwrap_err();
        assert!(matches!(err, TypeError::AlreadyRegistered { .. }));
    }
}
