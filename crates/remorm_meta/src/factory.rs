//! Metadata factory: builds and caches frozen metadata.

use crate::describe::{ClassKind, MappingDriver};
use crate::error::{MappingError, MappingResult};
use crate::mapping::ApiConfig;
use crate::metadata::{Discriminator, EntityMetadata};
use crate::metadata::MetadataParts;
use crate::short_class_name;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Builds `EntityMetadata` lazily and caches it by class name.
///
/// Building resolves inheritance (parent members are copied and marked
/// with their declaring class before the driver's own declarations are
/// applied), discriminator maps (auto-derived at the root when absent)
/// and aliases. All failures are `MappingError`s and abort startup.
pub struct MetadataFactory {
    driver: Box<dyn MappingDriver>,
    aliases: RwLock<HashMap<String, String>>,
    cache: RwLock<HashMap<String, Arc<EntityMetadata>>>,
}

impl MetadataFactory {
    /// Creates a factory over a mapping driver.
    pub fn new(driver: Box<dyn MappingDriver>) -> Self {
        Self {
            driver,
            aliases: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a class alias.
    pub fn add_alias(&self, alias: impl Into<String>, class: impl Into<String>) {
        self.aliases.write().insert(alias.into(), class.into());
    }

    /// Resolves a name through the alias table, transitively.
    #[must_use]
    pub fn resolve_alias(&self, name: &str) -> String {
        let aliases = self.aliases.read();
        let mut current = name.to_string();
        let mut hops = 0;
        while let Some(next) = aliases.get(&current) {
            current = next.clone();
            hops += 1;
            // Alias cycles are a configuration bug; stop rather than spin.
            if hops > aliases.len() {
                break;
            }
        }
        current
    }

    /// Returns the metadata for a class, building it on first use.
    ///
    /// Idempotent; the built metadata is cached for the factory lifetime.
    pub fn metadata_for(&self, class: &str) -> MappingResult<Arc<EntityMetadata>> {
        let canonical = self.resolve_alias(class);
        if let Some(meta) = self.cache.read().get(&canonical) {
            return Ok(Arc::clone(meta));
        }
        let meta = Arc::new(self.build(&canonical)?);
        self.cache
            .write()
            .insert(canonical, Arc::clone(&meta));
        Ok(meta)
    }

    /// Returns the sorted discriminator tags of `class` and its concrete
    /// descendants.
    ///
    /// Empty when the class is not part of a polymorphic hierarchy. Used
    /// by the search dehydrator to scope polymorphic queries.
    pub fn discriminator_values_under(&self, class: &str) -> MappingResult<Vec<String>> {
        let meta = self.metadata_for(class)?;
        let Some(disc) = meta.discriminator() else {
            return Ok(Vec::new());
        };

        let mut values = Vec::new();
        for (tag, target) in &disc.map {
            let target_meta = self.metadata_for(target)?;
            if target_meta.is_abstract() {
                continue;
            }
            if self.is_self_or_descendant(target_meta.class_name(), meta.class_name())? {
                values.push(tag.clone());
            }
        }
        values.sort();
        values.dedup();
        Ok(values)
    }

    /// Resolves the concrete class for a discriminator tag.
    pub fn class_for_tag(&self, meta: &EntityMetadata, tag: &str) -> MappingResult<String> {
        let disc = meta.discriminator().ok_or_else(|| {
            MappingError::conflict(meta.class_name(), "class has no discriminator")
        })?;
        let target = disc.map.get(tag).ok_or_else(|| {
            MappingError::conflict(
                meta.class_name(),
                format!("unknown discriminator tag '{tag}'"),
            )
        })?;
        Ok(self.resolve_alias(target))
    }

    fn is_self_or_descendant(&self, candidate: &str, ancestor: &str) -> MappingResult<bool> {
        let mut current = candidate.to_string();
        loop {
            if current == ancestor {
                return Ok(true);
            }
            match self.metadata_for(&current)?.parent() {
                Some(parent) => current = self.resolve_alias(parent),
                None => return Ok(false),
            }
        }
    }

    fn build(&self, class: &str) -> MappingResult<EntityMetadata> {
        let desc = self
            .driver
            .describe(class)
            .ok_or_else(|| MappingError::not_found(class))?;

        let parent_meta = match &desc.parent {
            Some(parent) => Some(self.metadata_for(parent)?),
            None => None,
        };

        let mut fields = BTreeMap::new();
        let mut associations = BTreeMap::new();
        let mut declared_by = HashMap::new();
        let mut identifier = Vec::new();
        let mut id_generation = desc.id_generation;
        let mut inherited_disc_field = None;
        let mut inherited_disc_map = BTreeMap::new();
        let mut api = None;
        let mut repository = desc.repository.clone();

        // Copy the parent's mappings first, remembering where each member
        // was declared.
        if let Some(parent) = &parent_meta {
            for field in parent.fields() {
                let origin = parent
                    .declared_by(&field.name)
                    .unwrap_or(parent.class_name())
                    .to_string();
                declared_by.insert(field.name.clone(), origin);
                fields.insert(field.name.clone(), field.clone());
            }
            for assoc in parent.associations() {
                let origin = parent
                    .declared_by(&assoc.name)
                    .unwrap_or(parent.class_name())
                    .to_string();
                declared_by.insert(assoc.name.clone(), origin);
                associations.insert(assoc.name.clone(), assoc.clone());
            }
            identifier = parent.identifier().to_vec();
            id_generation = parent.id_generation();
            if let Some(disc) = parent.discriminator() {
                inherited_disc_field = Some(disc.field.clone());
                inherited_disc_map = disc.map.clone();
            }
            api = Some(parent.api().clone());
            if repository.is_none() {
                repository = parent.repository().map(String::from);
            }
        }

        // The driver's own declarations never overwrite an identical
        // inherited mapping; a conflicting re-declaration is fatal.
        for field in &desc.fields {
            match fields.get(&field.name) {
                Some(existing) if existing == field => {}
                Some(_) => {
                    return Err(MappingError::conflict(
                        class,
                        format!("conflicting re-declaration of field '{}'", field.name),
                    ));
                }
                None => {
                    declared_by.insert(field.name.clone(), class.to_string());
                    fields.insert(field.name.clone(), field.clone());
                }
            }
        }
        for assoc in &desc.associations {
            match associations.get(&assoc.name) {
                Some(existing) if existing == assoc => {}
                Some(_) => {
                    return Err(MappingError::conflict(
                        class,
                        format!("conflicting re-declaration of association '{}'", assoc.name),
                    ));
                }
                None => {
                    declared_by.insert(assoc.name.clone(), class.to_string());
                    associations.insert(assoc.name.clone(), assoc.clone());
                }
            }
        }

        if !desc.identifier.is_empty() {
            if identifier.is_empty() {
                identifier = desc.identifier.clone();
                id_generation = desc.id_generation;
            } else if identifier != desc.identifier {
                return Err(MappingError::conflict(
                    class,
                    "identifier re-declared differently from parent",
                ));
            }
        }

        let disc_field = desc
            .discriminator_field
            .clone()
            .or(inherited_disc_field.clone());

        let mut disc_map = if desc.discriminator_map.is_empty() {
            inherited_disc_map
        } else if inherited_disc_map.is_empty() || inherited_disc_map == desc.discriminator_map {
            desc.discriminator_map.clone()
        } else {
            return Err(MappingError::conflict(
                class,
                "discriminator map re-declared differently from parent",
            ));
        };

        // Auto-derive the map at the hierarchy root when absent:
        // concrete-subclass short name → class.
        let is_root_of_hierarchy = inherited_disc_field.is_none() && disc_field.is_some();
        if is_root_of_hierarchy && disc_map.is_empty() {
            disc_map = self.derive_discriminator_map(class, desc.is_abstract)?;
        }

        let disc_value = match &disc_field {
            None => None,
            Some(_) => {
                let resolved = self.resolve_discriminator_value(class, &desc, &disc_map)?;
                if resolved.is_none() && !desc.is_abstract {
                    return Err(MappingError::conflict(
                        class,
                        "no discriminator value resolves to this concrete class",
                    ));
                }
                resolved
            }
        };

        let discriminator = disc_field.map(|field| Discriminator {
            field,
            value: disc_value,
            map: disc_map,
        });

        let root_class = match &parent_meta {
            Some(parent) if parent.kind() == ClassKind::Entity => {
                parent.root_class().to_string()
            }
            _ => class.to_string(),
        };

        let api = desc
            .api
            .clone()
            .or(api)
            .unwrap_or_else(|| ApiConfig::new(short_class_name(class).to_lowercase()));

        EntityMetadata::freeze(MetadataParts {
            class_name: class.to_string(),
            parent: desc.parent.clone(),
            root_class,
            kind: desc.kind,
            is_abstract: desc.is_abstract,
            identifier,
            id_generation,
            fields,
            associations,
            discriminator,
            api,
            cache: desc.cache,
            repository,
            declared_by,
        })
    }

    /// Scans the driver's classes for concrete descendants of `root`,
    /// using description parent chains only (subclass metadata cannot be
    /// built before the root's own build finishes).
    fn derive_discriminator_map(
        &self,
        root: &str,
        root_is_abstract: bool,
    ) -> MappingResult<BTreeMap<String, String>> {
        let mut concrete = Vec::new();
        if !root_is_abstract {
            concrete.push(root.to_string());
        }
        for candidate in self.driver.known_classes() {
            if candidate == root {
                continue;
            }
            let Some(candidate_desc) = self.driver.describe(&candidate) else {
                continue;
            };
            if candidate_desc.is_abstract {
                continue;
            }
            if self.describes_descendant_of(&candidate, root) {
                concrete.push(candidate);
            }
        }

        let mut map = BTreeMap::new();
        for class in concrete {
            let tag = short_class_name(&class).to_string();
            if let Some(existing) = map.insert(tag.clone(), class.clone()) {
                return Err(MappingError::conflict(
                    root,
                    format!(
                        "duplicate discriminator short name '{tag}' for {existing} and {class}"
                    ),
                ));
            }
        }
        Ok(map)
    }

    fn describes_descendant_of(&self, candidate: &str, ancestor: &str) -> bool {
        let mut current = candidate.to_string();
        loop {
            let Some(desc) = self.driver.describe(&current) else {
                return false;
            };
            match desc.parent {
                Some(parent) => {
                    let parent = self.resolve_alias(&parent);
                    if parent == ancestor {
                        return true;
                    }
                    current = parent;
                }
                None => return false,
            }
        }
    }

    fn resolve_discriminator_value(
        &self,
        class: &str,
        desc: &crate::describe::ClassDescription,
        map: &BTreeMap<String, String>,
    ) -> MappingResult<Option<String>> {
        if let Some(value) = &desc.discriminator_value {
            return Ok(Some(value.clone()));
        }
        let mut matches = map
            .iter()
            .filter(|(_, target)| self.resolve_alias(target) == class)
            .map(|(tag, _)| tag.clone());
        let first = matches.next();
        if matches.next().is_some() {
            return Err(MappingError::conflict(
                class,
                "multiple discriminator tags resolve to this class",
            ));
        }
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::{ClassDescription, StaticDriver};
    use crate::mapping::{AssociationMapping, FieldMapping, IdGeneration};

    fn content_hierarchy() -> StaticDriver {
        StaticDriver::new()
            .with(
                ClassDescription::entity("Content")
                    .abstract_class()
                    .discriminator_field("type")
                    .discriminator_entry("article", "Article")
                    .discriminator_entry("video", "Video")
                    .field(FieldMapping::new("id", "id", "int"))
                    .field(FieldMapping::new("title", "title", "string"))
                    .id_field("id")
                    .id_generation(IdGeneration::Remote),
            )
            .with(
                ClassDescription::entity("Article")
                    .parent("Content")
                    .field(FieldMapping::new("body", "body", "string")),
            )
            .with(
                ClassDescription::entity("Video")
                    .parent("Content")
                    .field(FieldMapping::new("duration", "duration", "int")),
            )
    }

    #[test]
    fn missing_class_is_not_found() {
        let factory = MetadataFactory::new(Box::new(StaticDriver::new()));
        assert!(matches!(
            factory.metadata_for("Ghost"),
            Err(MappingError::NotFound { .. })
        ));
    }

    #[test]
    fn metadata_is_cached() {
        let factory = MetadataFactory::new(Box::new(content_hierarchy()));
        let first = factory.metadata_for("Article").unwrap();
        let second = factory.metadata_for("Article").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn subclass_inherits_identifier_and_fields() {
        let factory = MetadataFactory::new(Box::new(content_hierarchy()));
        let article = factory.metadata_for("Article").unwrap();

        assert_eq!(article.identifier(), &["id".to_string()]);
        assert_eq!(article.id_generation(), IdGeneration::Remote);
        assert!(article.field("title").is_some());
        assert!(article.field("body").is_some());
        assert_eq!(article.declared_by("title"), Some("Content"));
        assert_eq!(article.declared_by("body"), Some("Article"));
        assert_eq!(article.root_class(), "Content");
    }

    #[test]
    fn discriminator_values_resolve_per_class() {
        let factory = MetadataFactory::new(Box::new(content_hierarchy()));
        let article = factory.metadata_for("Article").unwrap();
        let video = factory.metadata_for("Video").unwrap();
        let content = factory.metadata_for("Content").unwrap();

        assert_eq!(
            article.discriminator().unwrap().value.as_deref(),
            Some("article")
        );
        assert_eq!(video.discriminator().unwrap().value.as_deref(), Some("video"));
        assert_eq!(content.discriminator().unwrap().value, None);
    }

    #[test]
    fn discriminator_values_under_root_are_sorted() {
        let factory = MetadataFactory::new(Box::new(content_hierarchy()));
        let values = factory.discriminator_values_under("Content").unwrap();
        assert_eq!(values, vec!["article".to_string(), "video".to_string()]);

        // A concrete subclass sees only its own subtree.
        let values = factory.discriminator_values_under("Video").unwrap();
        assert_eq!(values, vec!["video".to_string()]);
    }

    #[test]
    fn auto_derived_discriminator_map() {
        let driver = StaticDriver::new()
            .with(
                ClassDescription::entity("Shape")
                    .abstract_class()
                    .discriminator_field("kind")
                    .field(FieldMapping::new("id", "id", "int"))
                    .id_field("id"),
            )
            .with(ClassDescription::entity("Circle").parent("Shape"))
            .with(ClassDescription::entity("Square").parent("Shape"));

        let factory = MetadataFactory::new(Box::new(driver));
        let shape = factory.metadata_for("Shape").unwrap();
        let map = &shape.discriminator().unwrap().map;
        assert_eq!(map.get("Circle").map(String::as_str), Some("Circle"));
        assert_eq!(map.get("Square").map(String::as_str), Some("Square"));
    }

    #[test]
    fn conflicting_redeclaration_is_fatal() {
        let driver = StaticDriver::new()
            .with(
                ClassDescription::entity("Base")
                    .field(FieldMapping::new("id", "id", "int"))
                    .field(FieldMapping::new("name", "name", "string"))
                    .id_field("id"),
            )
            .with(
                ClassDescription::entity("Child")
                    .parent("Base")
                    // Same domain name, different wire name.
                    .field(FieldMapping::new("name", "fullName", "string")),
            );

        let factory = MetadataFactory::new(Box::new(driver));
        assert!(matches!(
            factory.metadata_for("Child"),
            Err(MappingError::Conflict { .. })
        ));
    }

    #[test]
    fn identical_redeclaration_keeps_inherited_origin() {
        let driver = StaticDriver::new()
            .with(
                ClassDescription::entity("Base")
                    .field(FieldMapping::new("id", "id", "int"))
                    .id_field("id"),
            )
            .with(
                ClassDescription::entity("Child")
                    .parent("Base")
                    .field(FieldMapping::new("id", "id", "int")),
            );

        let factory = MetadataFactory::new(Box::new(driver));
        let child = factory.metadata_for("Child").unwrap();
        assert_eq!(child.declared_by("id"), Some("Base"));
    }

    #[test]
    fn alias_resolution() {
        let factory = MetadataFactory::new(Box::new(content_hierarchy()));
        factory.add_alias("content", "Content");
        factory.add_alias("the-content", "content");

        let meta = factory.metadata_for("the-content").unwrap();
        assert_eq!(meta.class_name(), "Content");
    }

    #[test]
    fn mapped_superclass_child_is_its_own_root() {
        let driver = StaticDriver::new()
            .with(
                ClassDescription::mapped_superclass("Timestamped")
                    .field(FieldMapping::new("created", "created_at", "timestamp")),
            )
            .with(
                ClassDescription::entity("Note")
                    .parent("Timestamped")
                    .field(FieldMapping::new("id", "id", "int"))
                    .id_field("id"),
            );

        let factory = MetadataFactory::new(Box::new(driver));
        let note = factory.metadata_for("Note").unwrap();
        assert_eq!(note.root_class(), "Note");
        assert!(note.field("created").is_some());
    }

    #[test]
    fn to_many_identifier_is_rejected() {
        let driver = StaticDriver::new().with(
            ClassDescription::entity("Bad")
                .association(AssociationMapping::one_to_many("items", "Item", "bad"))
                .id_field("items"),
        );
        let factory = MetadataFactory::new(Box::new(driver));
        assert!(matches!(
            factory.metadata_for("Bad"),
            Err(MappingError::Conflict { .. })
        ));
    }
}
