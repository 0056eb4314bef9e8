//! The identity map.

use crate::error::{CoreError, CoreResult};
use crate::proxy::EntityRef;
use std::collections::HashMap;

/// At most one in-memory entity per (root class, flattened identifier).
///
/// Keys are scoped by the root of the inheritance tree so a subclass
/// instance and a root-typed lookup land in the same slot.
#[derive(Default)]
pub struct IdentityMap {
    entries: HashMap<(String, String), EntityRef>,
}

impl IdentityMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the entity registered under a root class and flattened
    /// identifier.
    #[must_use]
    pub fn get(&self, root_class: &str, id_hash: &str) -> Option<EntityRef> {
        self.entries
            .get(&(root_class.to_owned(), id_hash.to_owned()))
            .cloned()
    }

    /// Registers an entity under its root class and flattened
    /// identifier.
    ///
    /// Registering a different entity under an occupied slot is a
    /// lifecycle bug and is rejected.
    pub fn insert(
        &mut self,
        root_class: &str,
        id_hash: &str,
        entity: EntityRef,
    ) -> CoreResult<()> {
        let key = (root_class.to_owned(), id_hash.to_owned());
        if let Some(existing) = self.entries.get(&key) {
            if existing.same_entity(&entity) {
                return Ok(());
            }
            return Err(CoreError::invalid_state(
                root_class,
                format!("identity '{id_hash}' is already managed"),
            ));
        }
        self.entries.insert(key, entity);
        Ok(())
    }

    /// Drops the entry for a root class and flattened identifier.
    pub fn remove(&mut self, root_class: &str, id_hash: &str) -> Option<EntityRef> {
        self.entries
            .remove(&(root_class.to_owned(), id_hash.to_owned()))
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remorm_wire::Value;

    fn slot(class: &str, id: i64) -> EntityRef {
        EntityRef::from_instance(
            class,
            class,
            vec![("id".to_owned(), Value::Int(id))],
            Box::new(()),
        )
    }

    #[test]
    fn same_key_resolves_to_same_slot() {
        let mut map = IdentityMap::new();
        let entity = slot("User", 1);
        map.insert("User", "1", entity.clone()).unwrap();

        let found = map.get("User", "1").unwrap();
        assert!(found.same_entity(&entity));
    }

    #[test]
    fn reinserting_the_same_slot_is_a_noop() {
        let mut map = IdentityMap::new();
        let entity = slot("User", 1);
        map.insert("User", "1", entity.clone()).unwrap();
        map.insert("User", "1", entity).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn conflicting_slot_is_rejected() {
        let mut map = IdentityMap::new();
        map.insert("User", "1", slot("User", 1)).unwrap();
        let err = map.insert("User", "1", slot("User", 1)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }

    #[test]
    fn keys_are_scoped_by_root_class() {
        let mut map = IdentityMap::new();
        map.insert("User", "1", slot("User", 1)).unwrap();
        map.insert("Post", "1", slot("Post", 1)).unwrap();
        assert_eq!(map.len(), 2);
        map.remove("User", "1");
        assert!(map.get("User", "1").is_none());
        assert!(map.get("Post", "1").is_some());
    }
}
