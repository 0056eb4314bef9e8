//! Frozen per-class metadata.

use crate::describe::ClassKind;
use crate::error::{MappingError, MappingResult};
use crate::mapping::{
    ApiConfig, AssociationMapping, CacheConfig, FieldMapping, IdGeneration,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Discriminator configuration of a polymorphic hierarchy.
#[derive(Debug, Clone)]
pub struct Discriminator {
    /// Wire field carrying the tag.
    pub field: String,
    /// This class's own tag; `None` for abstract classes.
    pub value: Option<String>,
    /// Tag → class name, shared across the hierarchy.
    pub map: BTreeMap<String, String>,
}

/// Frozen runtime description of one mapped class.
///
/// Built by the `MetadataFactory` once per class and shared for the
/// lifetime of the factory. All mapping invariants (bijective wire names,
/// identifier membership, discriminator uniqueness) are enforced here,
/// before the metadata can reach the engine.
#[derive(Debug, Clone)]
pub struct EntityMetadata {
    class_name: String,
    parent: Option<String>,
    root_class: String,
    kind: ClassKind,
    is_abstract: bool,
    identifier: Vec<String>,
    id_generation: IdGeneration,
    fields: BTreeMap<String, FieldMapping>,
    associations: BTreeMap<String, AssociationMapping>,
    discriminator: Option<Discriminator>,
    api: ApiConfig,
    cache: CacheConfig,
    repository: Option<String>,
    declared_by: HashMap<String, String>,
}

/// All the pieces the factory assembles before freezing.
pub(crate) struct MetadataParts {
    pub class_name: String,
    pub parent: Option<String>,
    pub root_class: String,
    pub kind: ClassKind,
    pub is_abstract: bool,
    pub identifier: Vec<String>,
    pub id_generation: IdGeneration,
    pub fields: BTreeMap<String, FieldMapping>,
    pub associations: BTreeMap<String, AssociationMapping>,
    pub discriminator: Option<Discriminator>,
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub repository: Option<String>,
    pub declared_by: HashMap<String, String>,
}

impl EntityMetadata {
    pub(crate) fn freeze(parts: MetadataParts) -> MappingResult<Self> {
        let meta = Self {
            class_name: parts.class_name,
            parent: parts.parent,
            root_class: parts.root_class,
            kind: parts.kind,
            is_abstract: parts.is_abstract,
            identifier: parts.identifier,
            id_generation: parts.id_generation,
            fields: parts.fields,
            associations: parts.associations,
            discriminator: parts.discriminator,
            api: parts.api,
            cache: parts.cache,
            repository: parts.repository,
            declared_by: parts.declared_by,
        };
        meta.validate()?;
        Ok(meta)
    }

    fn validate(&self) -> MappingResult<()> {
        // Domain names and wire names must be bijective within the class.
        let mut wire_names = HashSet::new();
        for field in self.fields.values() {
            if !wire_names.insert(field.wire_name.as_str()) {
                return Err(MappingError::conflict(
                    &self.class_name,
                    format!("duplicate wire name '{}'", field.wire_name),
                ));
            }
        }
        for assoc in self.associations.values() {
            if self.fields.contains_key(&assoc.name) {
                return Err(MappingError::conflict(
                    &self.class_name,
                    format!("'{}' is mapped both as field and association", assoc.name),
                ));
            }
            if let Some(wire_name) = &assoc.wire_name {
                if !wire_names.insert(wire_name.as_str()) {
                    return Err(MappingError::conflict(
                        &self.class_name,
                        format!("duplicate wire name '{wire_name}'"),
                    ));
                }
            }
        }

        // Identifier members must be mapped, and never collection-valued.
        for id_field in &self.identifier {
            if self.fields.contains_key(id_field) {
                continue;
            }
            match self.associations.get(id_field) {
                Some(assoc) if assoc.kind.is_single() => {}
                Some(_) => {
                    return Err(MappingError::conflict(
                        &self.class_name,
                        format!("identifier '{id_field}' is a to-many association"),
                    ));
                }
                None => {
                    return Err(MappingError::conflict(
                        &self.class_name,
                        format!("identifier '{id_field}' is not a mapped member"),
                    ));
                }
            }
        }

        if self.kind == ClassKind::Entity && !self.is_abstract && self.identifier.is_empty() {
            return Err(MappingError::conflict(
                &self.class_name,
                "entity has no identifier",
            ));
        }

        Ok(())
    }

    /// Returns the class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the parent class name, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Returns the root entity class of the inheritance tree.
    ///
    /// Identity-map keys are scoped by root class, so a subclass instance
    /// and its root-typed lookup resolve to the same slot.
    #[must_use]
    pub fn root_class(&self) -> &str {
        &self.root_class
    }

    /// Returns the class kind.
    #[must_use]
    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    /// Returns true if the class is abstract.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Returns the ordered identifier member names.
    #[must_use]
    pub fn identifier(&self) -> &[String] {
        &self.identifier
    }

    /// Returns true if the identifier spans more than one member.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.identifier.len() > 1
    }

    /// Returns true if `name` is an identifier member.
    #[must_use]
    pub fn is_identifier(&self, name: &str) -> bool {
        self.identifier.iter().any(|id| id == name)
    }

    /// Returns the identifier generation strategy.
    #[must_use]
    pub fn id_generation(&self) -> IdGeneration {
        self.id_generation
    }

    /// Returns the field mapping for a domain name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.get(name)
    }

    /// Iterates fields in domain-name order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.values()
    }

    /// Returns the association mapping for a domain name.
    #[must_use]
    pub fn association(&self, name: &str) -> Option<&AssociationMapping> {
        self.associations.get(name)
    }

    /// Iterates associations in domain-name order.
    pub fn associations(&self) -> impl Iterator<Item = &AssociationMapping> {
        self.associations.values()
    }

    /// Returns the wire name of a mapped member.
    #[must_use]
    pub fn wire_name_of(&self, name: &str) -> Option<&str> {
        if let Some(field) = self.fields.get(name) {
            return Some(&field.wire_name);
        }
        self.associations
            .get(name)
            .and_then(|assoc| assoc.wire_name.as_deref())
    }

    /// Returns the field mapped to a wire name.
    #[must_use]
    pub fn field_by_wire(&self, wire_name: &str) -> Option<&FieldMapping> {
        self.fields.values().find(|f| f.wire_name == wire_name)
    }

    /// Returns the discriminator configuration, if the hierarchy is
    /// polymorphic.
    #[must_use]
    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    /// Returns the API configuration.
    #[must_use]
    pub fn api(&self) -> &ApiConfig {
        &self.api
    }

    /// Returns the cache configuration.
    #[must_use]
    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    /// Returns the custom repository marker.
    #[must_use]
    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    /// Returns the class that declared a member (differs from
    /// `class_name` for inherited members).
    #[must_use]
    pub fn declared_by(&self, member: &str) -> Option<&str> {
        self.declared_by.get(member).map(String::as_str)
    }
}
