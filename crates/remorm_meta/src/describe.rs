//! Declarative class descriptions and the mapping driver contract.

use crate::mapping::{
    ApiConfig, AssociationMapping, CacheConfig, FieldMapping, IdGeneration,
};
use std::collections::{BTreeMap, HashMap};

/// Kind of a mapped class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassKind {
    /// A queryable entity with an identity of its own.
    #[default]
    Entity,
    /// A superclass contributing mappings but carrying no identity.
    MappedSuperclass,
}

/// Declarative description of one mapped class, as produced by a mapping
/// driver.
///
/// Descriptions are plain data; the `MetadataFactory` turns them into
/// frozen `EntityMetadata`, resolving inheritance and discriminators.
#[derive(Debug, Clone)]
pub struct ClassDescription {
    /// Class name.
    pub class_name: String,
    /// Class kind.
    pub kind: ClassKind,
    /// Parent class name, if any.
    pub parent: Option<String>,
    /// Whether the class is abstract (never instantiated directly).
    pub is_abstract: bool,
    /// Scalar field mappings.
    pub fields: Vec<FieldMapping>,
    /// Association mappings.
    pub associations: Vec<AssociationMapping>,
    /// Ordered identifier member names.
    pub identifier: Vec<String>,
    /// Identifier generation strategy.
    pub id_generation: IdGeneration,
    /// Discriminator wire field for polymorphic hierarchies.
    pub discriminator_field: Option<String>,
    /// This class's discriminator tag.
    pub discriminator_value: Option<String>,
    /// Discriminator map: tag → class name (or alias).
    pub discriminator_map: BTreeMap<String, String>,
    /// Remote API configuration.
    pub api: Option<ApiConfig>,
    /// Cache configuration.
    pub cache: CacheConfig,
    /// Opaque marker selecting a custom repository wrapper.
    pub repository: Option<String>,
}

impl ClassDescription {
    fn new(class_name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            class_name: class_name.into(),
            kind,
            parent: None,
            is_abstract: false,
            fields: Vec::new(),
            associations: Vec::new(),
            identifier: Vec::new(),
            id_generation: IdGeneration::default(),
            discriminator_field: None,
            discriminator_value: None,
            discriminator_map: BTreeMap::new(),
            api: None,
            cache: CacheConfig::default(),
            repository: None,
        }
    }

    /// Creates an entity description.
    pub fn entity(class_name: impl Into<String>) -> Self {
        Self::new(class_name, ClassKind::Entity)
    }

    /// Creates a mapped-superclass description.
    pub fn mapped_superclass(class_name: impl Into<String>) -> Self {
        Self::new(class_name, ClassKind::MappedSuperclass)
    }

    /// Sets the parent class.
    #[must_use]
    pub fn parent(mut self, class: impl Into<String>) -> Self {
        self.parent = Some(class.into());
        self
    }

    /// Marks the class abstract.
    #[must_use]
    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Adds a scalar field.
    #[must_use]
    pub fn field(mut self, field: FieldMapping) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds an association.
    #[must_use]
    pub fn association(mut self, association: AssociationMapping) -> Self {
        self.associations.push(association);
        self
    }

    /// Appends an identifier member (declaration order is significant).
    #[must_use]
    pub fn id_field(mut self, name: impl Into<String>) -> Self {
        self.identifier.push(name.into());
        self
    }

    /// Sets the identifier generation strategy.
    #[must_use]
    pub fn id_generation(mut self, strategy: IdGeneration) -> Self {
        self.id_generation = strategy;
        self
    }

    /// Declares the discriminator wire field.
    #[must_use]
    pub fn discriminator_field(mut self, wire_field: impl Into<String>) -> Self {
        self.discriminator_field = Some(wire_field.into());
        self
    }

    /// Declares this class's discriminator tag.
    #[must_use]
    pub fn discriminator_value(mut self, tag: impl Into<String>) -> Self {
        self.discriminator_value = Some(tag.into());
        self
    }

    /// Adds a discriminator map entry (tag → class name or alias).
    #[must_use]
    pub fn discriminator_entry(
        mut self,
        tag: impl Into<String>,
        class: impl Into<String>,
    ) -> Self {
        self.discriminator_map.insert(tag.into(), class.into());
        self
    }

    /// Sets the API configuration.
    #[must_use]
    pub fn api(mut self, api: ApiConfig) -> Self {
        self.api = Some(api);
        self
    }

    /// Sets the cache configuration.
    #[must_use]
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the custom repository marker.
    #[must_use]
    pub fn repository(mut self, marker: impl Into<String>) -> Self {
        self.repository = Some(marker.into());
        self
    }
}

/// Produces class descriptions by class name.
///
/// The YAML/annotation loaders live outside this engine; they feed a
/// driver implementation. `known_classes` must enumerate every described
/// class so discriminator maps can be auto-derived for roots that omit
/// them.
pub trait MappingDriver: Send + Sync {
    /// Returns the description for a class, if one exists.
    fn describe(&self, class: &str) -> Option<ClassDescription>;

    /// Returns every class this driver can describe.
    fn known_classes(&self) -> Vec<String>;
}

/// An in-memory driver over pre-built descriptions.
#[derive(Default)]
pub struct StaticDriver {
    descriptions: HashMap<String, ClassDescription>,
}

impl StaticDriver {
    /// Creates an empty driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a description, keyed by its class name.
    pub fn add(&mut self, description: ClassDescription) {
        self.descriptions
            .insert(description.class_name.clone(), description);
    }

    /// Adds a description, builder style.
    #[must_use]
    pub fn with(mut self, description: ClassDescription) -> Self {
        self.add(description);
        self
    }
}

impl MappingDriver for StaticDriver {
    fn describe(&self, class: &str) -> Option<ClassDescription> {
        self.descriptions.get(class).cloned()
    }

    fn known_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.descriptions.keys().cloned().collect();
        classes.sort();
        classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_members() {
        let description = ClassDescription::entity("User")
            .field(FieldMapping::new("id", "id", "string"))
            .field(FieldMapping::new("name", "name", "string"))
            .id_field("id");

        assert_eq!(description.fields.len(), 2);
        assert_eq!(description.identifier, vec!["id"]);
        assert_eq!(description.kind, ClassKind::Entity);
    }

    #[test]
    fn static_driver_lookup() {
        let driver = StaticDriver::new().with(ClassDescription::entity("User"));
        assert!(driver.describe("User").is_some());
        assert!(driver.describe("Ghost").is_none());
        assert_eq!(driver.known_classes(), vec!["User"]);
    }
}
