//! The entity manager and repositories.
//!
//! The manager is the caller-facing assembly of the engine: metadata
//! factory, accessor registry, type registry, client and API registries,
//! and an optional record cache, wrapped around one unit of work.
//! Everything is single-threaded by design; one manager per thread of
//! work, sharing the `Arc`-held services.

use crate::cache::{CacheBackend, KeyStrategy};
use crate::entity::{Entity, EntityRegistry};
use crate::error::{CoreError, CoreResult};
use crate::flatten::{self, IdMap};
use crate::proxy::{EntityRef, Ref};
use crate::uow::{EngineServices, EntityState, UnitOfWork, UowCore};
use remorm_meta::MetadataFactory;
use remorm_rpc::{ApiRegistry, ClientRegistry};
use remorm_wire::{Record, TypeRegistry, Value};
use std::rc::Rc;
use std::sync::Arc;

/// Builder for an [`EntityManager`].
pub struct EntityManagerBuilder {
    factory: Option<Arc<MetadataFactory>>,
    registry: Option<Arc<EntityRegistry>>,
    types: Arc<TypeRegistry>,
    clients: Option<Arc<ClientRegistry>>,
    apis: Arc<ApiRegistry>,
    cache: Option<Arc<dyn CacheBackend>>,
    key_strategy: KeyStrategy,
}

impl EntityManagerBuilder {
    fn new() -> Self {
        Self {
            factory: None,
            registry: None,
            types: Arc::new(TypeRegistry::with_builtins()),
            clients: None,
            apis: Arc::new(ApiRegistry::new()),
            cache: None,
            key_strategy: KeyStrategy::default(),
        }
    }

    /// Sets the metadata factory. Required.
    #[must_use]
    pub fn metadata(mut self, factory: Arc<MetadataFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Sets the accessor registry. Required.
    #[must_use]
    pub fn accessors(mut self, registry: Arc<EntityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replaces the scalar type registry (defaults to the builtins).
    #[must_use]
    pub fn types(mut self, types: Arc<TypeRegistry>) -> Self {
        self.types = types;
        self
    }

    /// Sets the RPC client registry. Required.
    #[must_use]
    pub fn clients(mut self, clients: Arc<ClientRegistry>) -> Self {
        self.clients = Some(clients);
        self
    }

    /// Replaces the API factory registry (defaults to an empty one, so
    /// every class gets the stock RPC API).
    #[must_use]
    pub fn apis(mut self, apis: Arc<ApiRegistry>) -> Self {
        self.apis = apis;
        self
    }

    /// Enables the read-through record cache.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the cache key strategy.
    #[must_use]
    pub fn key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    /// Assembles the manager.
    pub fn build(self) -> CoreResult<EntityManager> {
        let factory = self.factory.ok_or_else(|| {
            CoreError::invalid_state("<engine>", "a metadata factory is required")
        })?;
        let registry = self.registry.ok_or_else(|| {
            CoreError::invalid_state("<engine>", "an accessor registry is required")
        })?;
        let clients = self.clients.ok_or_else(|| {
            CoreError::invalid_state("<engine>", "a client registry is required")
        })?;
        let core = UowCore::new(EngineServices {
            factory,
            registry,
            types: self.types,
            clients,
            apis: self.apis,
            cache: self.cache,
            key_strategy: self.key_strategy,
        });
        Ok(EntityManager { core })
    }
}

/// Caller-facing entry point of the engine.
pub struct EntityManager {
    core: Rc<UowCore>,
}

impl EntityManager {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> EntityManagerBuilder {
        EntityManagerBuilder::new()
    }

    /// The unit of work behind this manager.
    #[must_use]
    pub fn unit_of_work(&self) -> UnitOfWork {
        UnitOfWork::from_core(Rc::clone(&self.core))
    }

    /// Finds one entity by simple identifier.
    ///
    /// Identity map first, then cache, then the remote API. A missing
    /// remote record yields `None`.
    pub fn find<T: Entity>(&self, id: impl Into<Value>) -> CoreResult<Option<Ref<T>>> {
        match self.find_in(T::CLASS, id)? {
            Some(entity) => Ok(Some(entity.typed()?)),
            None => Ok(None),
        }
    }

    /// Finds one entity of a named class by simple identifier.
    pub fn find_in(&self, class: &str, id: impl Into<Value>) -> CoreResult<Option<EntityRef>> {
        let meta = self.core.meta(class)?;
        let id_map = flatten::single_id(&meta, id.into())?;
        self.find_by_id(class, &id_map)
    }

    /// Finds one entity by (possibly composite) identifier.
    pub fn find_by_id(&self, class: &str, id: &IdMap) -> CoreResult<Option<EntityRef>> {
        if let Some(managed) = self.core.try_get_by_id(class, id)? {
            if self.core.state_of(&managed) == EntityState::Removed {
                return Ok(None);
            }
            return Ok(Some(managed));
        }
        let meta = self.core.meta(class)?;
        let members = flatten::flatten(&meta, id)?;
        self.core.persister(meta.class_name())?.load_by_id(&members)
    }

    /// Returns a lazy handle for a known identifier, loading nothing.
    pub fn get_reference(&self, class: &str, id: &IdMap) -> CoreResult<EntityRef> {
        self.core.reference_for(class, id)
    }

    /// Returns a lazy typed handle for a known simple identifier.
    pub fn reference<T: Entity>(&self, id: impl Into<Value>) -> CoreResult<Ref<T>> {
        let meta = self.core.meta(T::CLASS)?;
        let id_map = flatten::single_id(&meta, id.into())?;
        self.core.reference_for(T::CLASS, &id_map)?.typed()
    }

    /// Hands a caller-built instance to the engine.
    pub fn persist<T: Entity>(&self, instance: T) -> CoreResult<Ref<T>> {
        self.core.persist_instance(instance)
    }

    /// Schedules a managed entity for deletion at the next flush.
    pub fn remove(&self, entity: &EntityRef) -> CoreResult<()> {
        self.core.remove(entity)
    }

    /// Stops tracking one entity.
    pub fn detach(&self, entity: &EntityRef) {
        self.core.detach(entity);
    }

    /// Stops tracking everything.
    pub fn clear(&self) {
        self.core.clear();
    }

    /// Writes every accumulated change.
    pub fn flush(&self) -> CoreResult<()> {
        self.core.flush(None)
    }

    /// The repository for a class.
    pub fn repository(&self, class: &str) -> CoreResult<Repository> {
        let meta = self.core.meta(class)?;
        Ok(Repository {
            core: Rc::clone(&self.core),
            class: meta.class_name().to_owned(),
        })
    }
}

impl std::fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager").finish_non_exhaustive()
    }
}

/// Query surface for one class.
pub struct Repository {
    core: Rc<UowCore>,
    class: String,
}

impl Repository {
    /// The class this repository serves.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Finds one entity by simple identifier.
    pub fn find(&self, id: impl Into<Value>) -> CoreResult<Option<EntityRef>> {
        let meta = self.core.meta(&self.class)?;
        let id_map = flatten::single_id(&meta, id.into())?;
        if let Some(managed) = self.core.try_get_by_id(&self.class, &id_map)? {
            if self.core.state_of(&managed) == EntityState::Removed {
                return Ok(None);
            }
            return Ok(Some(managed));
        }
        let members = flatten::flatten(&meta, &id_map)?;
        self.core.persister(&self.class)?.load_by_id(&members)
    }

    /// Loads every record of the class.
    pub fn find_all(&self) -> CoreResult<Vec<EntityRef>> {
        self.find_by(&Record::new(), &[], None, None)
    }

    /// Searches by domain-keyed equality criteria.
    ///
    /// Array values express IN filters. Polymorphic classes filter by
    /// their discriminator tags automatically.
    pub fn find_by(
        &self,
        criteria: &Record,
        order: &[(String, remorm_rpc::SortOrder)],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> CoreResult<Vec<EntityRef>> {
        self.core
            .persister(&self.class)?
            .load_all(criteria, order, limit, offset)
    }

    /// Returns the first match, if any.
    pub fn find_one_by(&self, criteria: &Record) -> CoreResult<Option<EntityRef>> {
        Ok(self.find_by(criteria, &[], Some(1), None)?.into_iter().next())
    }

    /// Counts matching records remotely.
    pub fn count(&self, criteria: &Record) -> CoreResult<i64> {
        self.core.persister(&self.class)?.count(criteria)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("class", &self.class)
            .finish()
    }
}
