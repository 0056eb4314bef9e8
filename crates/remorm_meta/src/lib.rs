//! # RemORM Meta
//!
//! Entity metadata for RemORM.
//!
//! This crate provides:
//! - `FieldMapping` / `AssociationMapping`, the per-member mapping model
//! - `ClassDescription` and `MappingDriver`, the declarative input
//! - `EntityMetadata`, the frozen per-class runtime description
//! - `MetadataFactory`, which builds and caches metadata, resolving
//!   inheritance, aliases and discriminator maps
//!
//! Metadata is built once per class for the lifetime of the factory and
//! shared as `Arc<EntityMetadata>`. Mapping problems are configuration
//! errors: they surface as `MappingError` at build time and are never
//! retried.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod describe;
mod error;
mod factory;
mod mapping;
mod metadata;

pub use describe::{ClassDescription, ClassKind, MappingDriver, StaticDriver};
pub use error::{MappingError, MappingResult};
pub use factory::MetadataFactory;
pub use mapping::{
    ApiConfig, AssociationKind, AssociationMapping, CacheConfig, FetchMode, FieldMapping,
    IdGeneration,
};
pub use metadata::{Discriminator, EntityMetadata};

/// Returns the short name of a class: the part after the last `\` or `::`.
#[must_use]
pub fn short_class_name(class: &str) -> &str {
    let after_backslash = class.rsplit('\\').next().unwrap_or(class);
    after_backslash.rsplit("::").next().unwrap_or(after_backslash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names() {
        assert_eq!(short_class_name("User"), "User");
        assert_eq!(short_class_name("App\\Entity\\User"), "User");
        assert_eq!(short_class_name("app::entity::User"), "User");
    }
}
