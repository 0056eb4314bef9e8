//! Entity trait, accessor tables, and the accessor registry.
//!
//! The engine never reflects over user structs. Each mapped struct
//! registers an [`AccessorTable`] of getter/setter closures keyed by the
//! domain member names from its metadata, and the engine reads and
//! writes instances exclusively through those closures.

use crate::collection::LazyCollection;
use crate::error::{CoreError, CoreResult};
use crate::proxy::EntityRef;
use remorm_wire::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A struct managed by the engine.
///
/// `CLASS` is the mapped class name the metadata factory knows the type
/// under; it may use `\` or `::` separators, both of which shorten to
/// the final segment for discriminator tags.
pub trait Entity: Any {
    /// Mapped class name of this type.
    const CLASS: &'static str;
}

/// Value of an association member as seen through an accessor.
#[derive(Clone)]
pub enum AssocValue {
    /// Single-valued association with no target.
    Null,
    /// Single-valued association pointing at a (possibly lazy) target.
    Ref(EntityRef),
    /// Collection-valued association.
    Collection(LazyCollection),
}

impl AssocValue {
    /// Returns the target reference of a single-valued association.
    #[must_use]
    pub fn as_single(&self) -> Option<&EntityRef> {
        match self {
            AssocValue::Ref(target) => Some(target),
            _ => None,
        }
    }

    /// Returns the collection of a collection-valued association.
    #[must_use]
    pub fn as_collection(&self) -> Option<&LazyCollection> {
        match self {
            AssocValue::Collection(collection) => Some(collection),
            _ => None,
        }
    }
}

impl std::fmt::Debug for AssocValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssocValue::Null => write!(f, "Null"),
            AssocValue::Ref(target) => write!(f, "Ref({})", target.class_name()),
            AssocValue::Collection(_) => write!(f, "Collection"),
        }
    }
}

type FieldGetter = Box<dyn Fn(&dyn Any) -> CoreResult<Value> + Send + Sync>;
type FieldSetter = Box<dyn Fn(&mut dyn Any, Value) -> CoreResult<()> + Send + Sync>;
type AssocGetter = Box<dyn Fn(&dyn Any) -> CoreResult<AssocValue> + Send + Sync>;
type AssocSetter = Box<dyn Fn(&mut dyn Any, AssocValue) -> CoreResult<()> + Send + Sync>;
type Instantiator = Box<dyn Fn() -> Box<dyn Any> + Send + Sync>;

/// Getter/setter closures for one mapped class.
pub struct AccessorTable {
    class: String,
    instantiate: Instantiator,
    field_getters: HashMap<String, FieldGetter>,
    field_setters: HashMap<String, FieldSetter>,
    assoc_getters: HashMap<String, AssocGetter>,
    assoc_setters: HashMap<String, AssocSetter>,
}

impl AccessorTable {
    /// Starts a builder for `T`.
    #[must_use]
    pub fn builder<T: Entity + Default>() -> AccessorTableBuilder<T> {
        AccessorTableBuilder {
            table: AccessorTable {
                class: T::CLASS.to_owned(),
                instantiate: Box::new(|| Box::new(T::default())),
                field_getters: HashMap::new(),
                field_setters: HashMap::new(),
                assoc_getters: HashMap::new(),
                assoc_setters: HashMap::new(),
            },
            _marker: std::marker::PhantomData,
        }
    }

    /// Returns the mapped class name.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Creates a default instance of the mapped struct.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn Any> {
        (self.instantiate)()
    }

    /// Reads a scalar field from an instance.
    pub fn get_field(&self, instance: &dyn Any, name: &str) -> CoreResult<Value> {
        let getter = self.field_getters.get(name).ok_or_else(|| {
            CoreError::accessor(&self.class, format!("no getter for field '{name}'"))
        })?;
        getter(instance)
    }

    /// Writes a scalar field on an instance.
    pub fn set_field(&self, instance: &mut dyn Any, name: &str, value: Value) -> CoreResult<()> {
        let setter = self.field_setters.get(name).ok_or_else(|| {
            CoreError::accessor(&self.class, format!("no setter for field '{name}'"))
        })?;
        setter(instance, value)
    }

    /// Reads an association from an instance.
    pub fn get_assoc(&self, instance: &dyn Any, name: &str) -> CoreResult<AssocValue> {
        let getter = self.assoc_getters.get(name).ok_or_else(|| {
            CoreError::accessor(&self.class, format!("no getter for association '{name}'"))
        })?;
        getter(instance)
    }

    /// Writes an association on an instance.
    pub fn set_assoc(
        &self,
        instance: &mut dyn Any,
        name: &str,
        value: AssocValue,
    ) -> CoreResult<()> {
        let setter = self.assoc_setters.get(name).ok_or_else(|| {
            CoreError::accessor(&self.class, format!("no setter for association '{name}'"))
        })?;
        setter(instance, value)
    }

    /// Returns true if a field accessor exists for `name`.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field_getters.contains_key(name)
    }

    /// Returns true if an association accessor exists for `name`.
    #[must_use]
    pub fn has_assoc(&self, name: &str) -> bool {
        self.assoc_getters.contains_key(name)
    }
}

impl std::fmt::Debug for AccessorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessorTable")
            .field("class", &self.class)
            .field("fields", &self.field_getters.len())
            .field("associations", &self.assoc_getters.len())
            .finish()
    }
}

fn downcast<T: Entity>(instance: &dyn Any) -> CoreResult<&T> {
    instance
        .downcast_ref::<T>()
        .ok_or_else(|| CoreError::accessor(T::CLASS, "instance has the wrong concrete type"))
}

fn downcast_mut<T: Entity>(instance: &mut dyn Any) -> CoreResult<&mut T> {
    instance
        .downcast_mut::<T>()
        .ok_or_else(|| CoreError::accessor(T::CLASS, "instance has the wrong concrete type"))
}

/// Typed builder for an [`AccessorTable`].
pub struct AccessorTableBuilder<T> {
    table: AccessorTable,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Entity + Default> AccessorTableBuilder<T> {
    /// Registers accessors for a scalar field.
    #[must_use]
    pub fn field<G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
        S: Fn(&mut T, Value) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.table.field_getters.insert(
            name.to_owned(),
            Box::new(move |instance| Ok(get(downcast::<T>(instance)?))),
        );
        self.table.field_setters.insert(
            name.to_owned(),
            Box::new(move |instance, value| set(downcast_mut::<T>(instance)?, value)),
        );
        self
    }

    /// Registers accessors for an association.
    #[must_use]
    pub fn association<G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        G: Fn(&T) -> AssocValue + Send + Sync + 'static,
        S: Fn(&mut T, AssocValue) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.table.assoc_getters.insert(
            name.to_owned(),
            Box::new(move |instance| Ok(get(downcast::<T>(instance)?))),
        );
        self.table.assoc_setters.insert(
            name.to_owned(),
            Box::new(move |instance, value| set(downcast_mut::<T>(instance)?, value)),
        );
        self
    }

    /// Finishes the table.
    #[must_use]
    pub fn build(self) -> AccessorTable {
        self.table
    }
}

/// Accessor tables keyed by class name.
///
/// The registry is built once at engine setup and shared by every unit
/// of work created from the same configuration.
#[derive(Default)]
pub struct EntityRegistry {
    tables: HashMap<String, Arc<AccessorTable>>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, keyed by its class name.
    pub fn register(&mut self, table: AccessorTable) {
        self.tables.insert(table.class.clone(), Arc::new(table));
    }

    /// Adds a table, builder style.
    #[must_use]
    pub fn with(mut self, table: AccessorTable) -> Self {
        self.register(table);
        self
    }

    /// Returns the table for a class.
    pub fn get(&self, class: &str) -> CoreResult<Arc<AccessorTable>> {
        self.tables
            .get(class)
            .cloned()
            .ok_or_else(|| CoreError::not_registered(class))
    }

    /// Returns true if a table is registered for `class`.
    #[must_use]
    pub fn has(&self, class: &str) -> bool {
        self.tables.contains_key(class)
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("classes", &self.tables.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Gadget {
        id: Option<String>,
        weight: i64,
    }

    impl Entity for Gadget {
        const CLASS: &'static str = "Gadget";
    }

    fn gadget_table() -> AccessorTable {
        AccessorTable::builder::<Gadget>()
            .field(
                "id",
                |g| Value::from(g.id.clone()),
                |g, v| {
                    g.id = v.as_text().map(str::to_owned);
                    Ok(())
                },
            )
            .field(
                "weight",
                |g| Value::Int(g.weight),
                |g, v| {
                    g.weight = v.as_int().unwrap_or_default();
                    Ok(())
                },
            )
            .build()
    }

    #[test]
    fn round_trips_fields_through_closures() {
        let table = gadget_table();
        let mut instance = table.instantiate();

        table
            .set_field(instance.as_mut(), "id", Value::from("g-1"))
            .unwrap();
        table
            .set_field(instance.as_mut(), "weight", Value::Int(12))
            .unwrap();

        assert_eq!(
            table.get_field(instance.as_ref(), "id").unwrap(),
            Value::from("g-1")
        );
        assert_eq!(
            table.get_field(instance.as_ref(), "weight").unwrap(),
            Value::Int(12)
        );
    }

    #[test]
    fn unknown_member_is_an_error() {
        let table = gadget_table();
        let instance = table.instantiate();
        let err = table.get_field(instance.as_ref(), "ghost").unwrap_err();
        assert!(matches!(err, CoreError::Accessor { .. }));
    }

    #[test]
    fn wrong_concrete_type_is_an_error() {
        #[derive(Default)]
        struct Other;
        impl Entity for Other {
            const CLASS: &'static str = "Other";
        }

        let table = gadget_table();
        let other: Box<dyn Any> = Box::new(Other);
        let err = table.get_field(other.as_ref(), "id").unwrap_err();
        assert!(matches!(err, CoreError::Accessor { .. }));
    }

    #[test]
    fn registry_lookup() {
        let registry = EntityRegistry::new().with(gadget_table());
        assert!(registry.has("Gadget"));
        assert!(registry.get("Gadget").is_ok());
        assert!(matches!(
            registry.get("Ghost").unwrap_err(),
            CoreError::NotRegistered { .. }
        ));
    }
}
