//! Per-member mapping model.

use remorm_rpc::{EntityMethods, SortOrder};
use remorm_wire::{TypeOptions, Value};
use std::time::Duration;

/// Identifier generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdGeneration {
    /// Identifier is assigned by the caller before the first flush.
    #[default]
    Natural,
    /// Identifier is assigned by the remote service on create.
    Remote,
}

/// Mapping of one scalar field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    /// Domain field name.
    pub name: String,
    /// Wire field name.
    pub wire_name: String,
    /// Scalar type name, resolved through the type registry.
    pub type_name: String,
    /// Whether a missing wire value hydrates to null instead of failing.
    pub nullable: bool,
    /// Converter options (e.g. a datetime format).
    pub options: TypeOptions,
}

impl FieldMapping {
    /// Creates a non-nullable field mapping.
    pub fn new(
        name: impl Into<String>,
        wire_name: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            wire_name: wire_name.into(),
            type_name: type_name.into(),
            nullable: false,
            options: TypeOptions::new(),
        }
    }

    /// Marks the field nullable.
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Adds a converter option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// Association cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// Single-valued, unique on both sides.
    OneToOne,
    /// Single-valued, many records point at one target.
    ManyToOne,
    /// Collection-valued inverse of a many-to-one.
    OneToMany,
}

impl AssociationKind {
    /// Returns true for single-valued associations.
    #[must_use]
    pub fn is_single(&self) -> bool {
        matches!(self, AssociationKind::OneToOne | AssociationKind::ManyToOne)
    }
}

/// Fetch mode for lazy associations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Load the whole target on first non-identifier access.
    #[default]
    Lazy,
    /// Serve count/contains/slice directly from the remote side without
    /// materializing the collection.
    ExtraLazy,
}

/// Mapping of one association.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationMapping {
    /// Domain field name.
    pub name: String,
    /// Wire field name carrying the target identifier (owning side only).
    pub wire_name: Option<String>,
    /// Cardinality.
    pub kind: AssociationKind,
    /// Target class name (may be an alias).
    pub target_class: String,
    /// Whether this side owns the wire representation.
    pub owning: bool,
    /// Whether a missing wire value hydrates to null instead of failing.
    pub nullable: bool,
    /// Whether persisting the source cascades to the target.
    pub cascade_persist: bool,
    /// Whether elements removed from the collection are deleted remotely.
    pub orphan_removal: bool,
    /// Fetch mode.
    pub fetch: FetchMode,
    /// Field on the target that owns the association (inverse side).
    pub mapped_by: Option<String>,
    /// Field on the target that mirrors the association (owning side).
    pub inversed_by: Option<String>,
    /// Ordering applied when the collection initializes.
    pub order_by: Vec<(String, SortOrder)>,
    /// Target field used to key the collection.
    pub index_by: Option<String>,
}

impl AssociationMapping {
    fn new(
        name: impl Into<String>,
        kind: AssociationKind,
        target_class: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            wire_name: None,
            kind,
            target_class: target_class.into(),
            owning: kind != AssociationKind::OneToMany,
            nullable: false,
            cascade_persist: false,
            orphan_removal: false,
            fetch: FetchMode::default(),
            mapped_by: None,
            inversed_by: None,
            order_by: Vec::new(),
            index_by: None,
        }
    }

    /// Creates an owning one-to-one association.
    pub fn one_to_one(
        name: impl Into<String>,
        wire_name: impl Into<String>,
        target_class: impl Into<String>,
    ) -> Self {
        Self {
            wire_name: Some(wire_name.into()),
            ..Self::new(name, AssociationKind::OneToOne, target_class)
        }
    }

    /// Creates an owning many-to-one association.
    pub fn many_to_one(
        name: impl Into<String>,
        wire_name: impl Into<String>,
        target_class: impl Into<String>,
    ) -> Self {
        Self {
            wire_name: Some(wire_name.into()),
            ..Self::new(name, AssociationKind::ManyToOne, target_class)
        }
    }

    /// Creates a one-to-many association, inverse of `mapped_by` on the
    /// target class.
    pub fn one_to_many(
        name: impl Into<String>,
        target_class: impl Into<String>,
        mapped_by: impl Into<String>,
    ) -> Self {
        Self {
            mapped_by: Some(mapped_by.into()),
            owning: false,
            ..Self::new(name, AssociationKind::OneToMany, target_class)
        }
    }

    /// Marks a one-to-one association as the inverse side of `mapped_by`.
    #[must_use]
    pub fn mapped_by(mut self, field: impl Into<String>) -> Self {
        self.mapped_by = Some(field.into());
        self.owning = false;
        self
    }

    /// Records the inverse field on the target class.
    #[must_use]
    pub fn inversed_by(mut self, field: impl Into<String>) -> Self {
        self.inversed_by = Some(field.into());
        self
    }

    /// Marks the association nullable.
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Enables cascade-persist.
    #[must_use]
    pub fn cascade_persist(mut self) -> Self {
        self.cascade_persist = true;
        self
    }

    /// Enables orphan removal.
    #[must_use]
    pub fn orphan_removal(mut self) -> Self {
        self.orphan_removal = true;
        self
    }

    /// Sets the fetch mode.
    #[must_use]
    pub fn fetch(mut self, fetch: FetchMode) -> Self {
        self.fetch = fetch;
        self
    }

    /// Appends an ordering clause.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push((field.into(), order));
        self
    }

    /// Sets the indexing field.
    #[must_use]
    pub fn index_by(mut self, field: impl Into<String>) -> Self {
        self.index_by = Some(field.into());
        self
    }
}

/// Remote API configuration for one class.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Declared client name; `None` selects the registry default.
    pub client_name: Option<String>,
    /// Declared API factory alias; `None` selects the stock RPC API.
    pub api_alias: Option<String>,
    /// Method-name resolution for the six verbs.
    pub methods: EntityMethods,
}

impl ApiConfig {
    /// Creates a config resolving methods under `entity_path`.
    pub fn new(entity_path: impl Into<String>) -> Self {
        Self {
            client_name: None,
            api_alias: None,
            methods: EntityMethods::new(entity_path),
        }
    }

    /// Sets the declared client name.
    #[must_use]
    pub fn client(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Sets the declared API alias.
    #[must_use]
    pub fn api_alias(mut self, alias: impl Into<String>) -> Self {
        self.api_alias = Some(alias.into());
        self
    }

    /// Replaces the method configuration.
    #[must_use]
    pub fn methods(mut self, methods: EntityMethods) -> Self {
        self.methods = methods;
        self
    }
}

/// Read-through cache configuration for one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Whether find-by-id results are cached.
    pub enabled: bool,
    /// Time-to-live for cached records.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// Creates an enabled config with the given TTL.
    #[must_use]
    pub fn enabled(ttl: Duration) -> Self {
        Self { enabled: true, ttl }
    }

    /// Creates a disabled config.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn many_to_one_is_owning() {
        let assoc = AssociationMapping::many_to_one("author", "authorId", "User");
        assert!(assoc.owning);
        assert!(assoc.kind.is_single());
        assert_eq!(assoc.wire_name.as_deref(), Some("authorId"));
    }

    #[test]
    fn one_to_many_is_inverse() {
        let assoc = AssociationMapping::one_to_many("comments", "Comment", "post");
        assert!(!assoc.owning);
        assert!(!assoc.kind.is_single());
        assert_eq!(assoc.mapped_by.as_deref(), Some("post"));
    }

    #[test]
    fn one_to_one_inverse_side() {
        let assoc =
            AssociationMapping::one_to_one("profile", "profileId", "Profile").mapped_by("user");
        assert!(!assoc.owning);
    }

    #[test]
    fn field_builder() {
        let field = FieldMapping::new("created", "created_at", "datetime")
            .nullable(true)
            .option("format", Value::Text("[year]-[month]-[day]".into()));
        assert!(field.nullable);
        assert!(field.options.contains_key("format"));
    }
}
