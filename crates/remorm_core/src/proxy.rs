//! Lazy entity references.
//!
//! An [`EntityRef`] is a shared handle to one entity slot: class name,
//! identifier values, and (once loaded or constructed) the concrete
//! instance. Identifier reads never trigger a load; any other access to
//! an uninitialized reference performs exactly one remote fetch through
//! the owning unit of work.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::uow::EntityState;
use remorm_wire::Value;
use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Loads the target record of an uninitialized reference.
pub(crate) trait ProxyLoader {
    /// Fetches the remote record and attaches the hydrated instance to
    /// `proxy`.
    fn load_proxy(&self, proxy: &EntityRef) -> CoreResult<()>;
}

struct ProxyInner {
    class: String,
    root_class: String,
    /// Identifier members in metadata order. Association-valued members
    /// hold the target's scalar identifier value.
    id: Vec<(String, Value)>,
    initialized: bool,
    /// Lifecycle state; lives here so it cannot outlive the entity.
    state: EntityState,
    instance: Option<Box<dyn Any>>,
    loader: Weak<dyn ProxyLoader>,
}

/// Shared handle to one entity slot.
///
/// Cloning is shallow; all clones observe the same instance and
/// initialization state. Two handles denote the same entity exactly
/// when [`EntityRef::same_entity`] holds.
pub struct EntityRef {
    inner: Rc<RefCell<ProxyInner>>,
}

impl Clone for EntityRef {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl EntityRef {
    pub(crate) fn uninitialized(
        class: impl Into<String>,
        root_class: impl Into<String>,
        id: Vec<(String, Value)>,
        loader: Weak<dyn ProxyLoader>,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ProxyInner {
                class: class.into(),
                root_class: root_class.into(),
                id,
                initialized: false,
                state: EntityState::New,
                instance: None,
                loader,
            })),
        }
    }

    pub(crate) fn from_instance(
        class: impl Into<String>,
        root_class: impl Into<String>,
        id: Vec<(String, Value)>,
        instance: Box<dyn Any>,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ProxyInner {
                class: class.into(),
                root_class: root_class.into(),
                id,
                initialized: true,
                state: EntityState::New,
                instance: Some(instance),
                loader: Weak::<Never>::new(),
            })),
        }
    }

    /// Returns the concrete class name.
    #[must_use]
    pub fn class_name(&self) -> String {
        self.inner.borrow().class.clone()
    }

    /// Returns the root class of the inheritance tree.
    #[must_use]
    pub fn root_class(&self) -> String {
        self.inner.borrow().root_class.clone()
    }

    /// Returns the identifier members in metadata order.
    ///
    /// Never triggers a load.
    #[must_use]
    pub fn id(&self) -> Vec<(String, Value)> {
        self.inner.borrow().id.clone()
    }

    /// Returns the flattened identifier, or `None` while any member is
    /// still unassigned.
    #[must_use]
    pub fn id_hash(&self) -> Option<String> {
        let inner = self.inner.borrow();
        if inner.id.is_empty() {
            return None;
        }
        let mut tokens = Vec::with_capacity(inner.id.len());
        for (_, value) in &inner.id {
            match value.to_token() {
                Some(token) if !token.is_empty() => tokens.push(token),
                _ => return None,
            }
        }
        Some(tokens.join(" "))
    }

    /// Returns true once every identifier member has a value.
    #[must_use]
    pub fn has_id(&self) -> bool {
        self.id_hash().is_some()
    }

    pub(crate) fn set_id(&self, id: Vec<(String, Value)>) {
        self.inner.borrow_mut().id = id;
    }

    /// Narrows the class once the discriminator names a subclass.
    pub(crate) fn set_class(&self, class: impl Into<String>) {
        self.inner.borrow_mut().class = class.into();
    }

    pub(crate) fn set_loader(&self, loader: Weak<dyn ProxyLoader>) {
        self.inner.borrow_mut().loader = loader;
    }

    pub(crate) fn state(&self) -> EntityState {
        self.inner.borrow().state
    }

    pub(crate) fn set_state(&self, state: EntityState) {
        self.inner.borrow_mut().state = state;
    }

    /// Returns true once the instance has been loaded or constructed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.borrow().initialized
    }

    /// Loads the instance if it is not loaded yet.
    pub fn initialize(&self) -> CoreResult<()> {
        let loader = {
            let inner = self.inner.borrow();
            if inner.initialized {
                return Ok(());
            }
            inner.loader.clone()
        };
        let loader = loader.upgrade().ok_or(CoreError::EngineGone)?;
        loader.load_proxy(self)
    }

    pub(crate) fn attach_instance(&self, instance: Box<dyn Any>) {
        let mut inner = self.inner.borrow_mut();
        inner.instance = Some(instance);
        inner.initialized = true;
    }

    /// Runs `f` against the loaded instance, loading it first if needed.
    pub fn with_instance<R>(&self, f: impl FnOnce(&dyn Any) -> CoreResult<R>) -> CoreResult<R> {
        self.initialize()?;
        let inner = self.inner.borrow();
        let instance = inner
            .instance
            .as_ref()
            .ok_or_else(|| CoreError::invalid_state(&inner.class, "reference has no instance"))?;
        f(instance.as_ref())
    }

    /// Runs `f` against the loaded instance mutably, loading it first if
    /// needed.
    pub fn with_instance_mut<R>(
        &self,
        f: impl FnOnce(&mut dyn Any) -> CoreResult<R>,
    ) -> CoreResult<R> {
        self.initialize()?;
        let mut inner = self.inner.borrow_mut();
        let class = inner.class.clone();
        let instance = inner
            .instance
            .as_mut()
            .ok_or_else(|| CoreError::invalid_state(class, "reference has no instance"))?;
        f(instance.as_mut())
    }

    /// Runs `f` against the instance without triggering a load.
    pub(crate) fn with_raw_instance<R>(
        &self,
        f: impl FnOnce(&dyn Any) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let inner = self.inner.borrow();
        let instance = inner
            .instance
            .as_ref()
            .ok_or_else(|| CoreError::invalid_state(&inner.class, "reference is uninitialized"))?;
        f(instance.as_ref())
    }

    /// Stable key for per-entity bookkeeping, valid while any handle is
    /// alive.
    #[must_use]
    pub fn ptr_key(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    /// Returns true if both handles denote the same entity slot.
    #[must_use]
    pub fn same_entity(&self, other: &EntityRef) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakEntityRef {
        WeakEntityRef {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Wraps the handle in a typed facade, checking the concrete class.
    pub fn typed<T: Entity>(&self) -> CoreResult<Ref<T>> {
        let class = self.class_name();
        if class != T::CLASS {
            return Err(CoreError::accessor(
                class,
                format!("reference is not of class '{}'", T::CLASS),
            ));
        }
        Ok(Ref {
            raw: self.clone(),
            _marker: std::marker::PhantomData,
        })
    }
}

impl std::fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("EntityRef")
            .field("class", &inner.class)
            .field("id", &inner.id)
            .field("initialized", &inner.initialized)
            .finish()
    }
}

/// Non-owning handle to an entity slot.
///
/// Collections hold their owner weakly; the owner's instance holds the
/// collection, and a strong back-reference would leak the pair.
pub(crate) struct WeakEntityRef {
    inner: Weak<RefCell<ProxyInner>>,
}

impl Clone for WeakEntityRef {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl WeakEntityRef {
    pub(crate) fn upgrade(&self) -> Option<EntityRef> {
        self.inner.upgrade().map(|inner| EntityRef { inner })
    }
}

/// Placeholder loader type for references created around an instance.
struct Never;

impl ProxyLoader for Never {
    fn load_proxy(&self, _proxy: &EntityRef) -> CoreResult<()> {
        Err(CoreError::EngineGone)
    }
}

/// Typed facade over an [`EntityRef`].
pub struct Ref<T: Entity> {
    raw: EntityRef,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Entity> Ref<T> {
    /// Returns the untyped handle.
    #[must_use]
    pub fn raw(&self) -> &EntityRef {
        &self.raw
    }

    /// Returns the identifier members without triggering a load.
    #[must_use]
    pub fn id(&self) -> Vec<(String, Value)> {
        self.raw.id()
    }

    /// Reads through the loaded instance.
    pub fn get<R>(&self, f: impl FnOnce(&T) -> R) -> CoreResult<R> {
        self.raw.with_instance(|instance| {
            let typed = instance
                .downcast_ref::<T>()
                .ok_or_else(|| CoreError::accessor(T::CLASS, "instance has the wrong type"))?;
            Ok(f(typed))
        })
    }

    /// Mutates the loaded instance.
    pub fn set<R>(&self, f: impl FnOnce(&mut T) -> R) -> CoreResult<R> {
        self.raw.with_instance_mut(|instance| {
            let typed = instance
                .downcast_mut::<T>()
                .ok_or_else(|| CoreError::accessor(T::CLASS, "instance has the wrong type"))?;
            Ok(f(typed))
        })
    }

    /// Clones the instance out of the engine, forcing a load first.
    pub fn detached_copy(&self) -> CoreResult<T>
    where
        T: Clone,
    {
        self.get(Clone::clone)
    }
}

impl<T: Entity> std::fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ref<{}>({:?})", T::CLASS, self.raw.id())
    }
}
