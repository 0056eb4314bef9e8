//! The unit of work.
//!
//! One unit of work tracks every entity it has seen, keyed by identity,
//! and writes accumulated changes back in one ordered flush: creates
//! first, then the deferred reference patches those creates unlocked,
//! then field patches, deletes, and collection synchronization last.
//! There is no remote transaction; a failing step aborts the flush and
//! leaves earlier steps applied. Work the aborted flush never reached
//! stays queued, so a later flush retries it.

use crate::cache::{CacheBackend, KeyStrategy};
use crate::collection::{CollectionLoader, LazyCollection};
use crate::entity::{AssocValue, Entity, EntityRegistry};
use crate::error::{CoreError, CoreResult};
use crate::flatten::{self, IdMap};
use crate::identity::IdentityMap;
use crate::persister::EntityPersister;
use crate::proxy::{EntityRef, ProxyLoader, Ref};
use remorm_meta::{AssociationKind, EntityMetadata, IdGeneration, MetadataFactory};
use remorm_rpc::{ApiRegistry, ClientRegistry};
use remorm_wire::{Record, TypeRegistry, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle state of one entity within a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Known to the caller only; the engine has not seen it.
    New,
    /// Tracked; changes are written at the next flush.
    Managed,
    /// Scheduled for remote deletion at the next flush.
    Removed,
    /// No longer tracked; changes are ignored.
    Detached,
}

/// Shared engine services, immutable for the life of a unit of work.
#[derive(Clone)]
pub(crate) struct EngineServices {
    pub factory: Arc<MetadataFactory>,
    pub registry: Arc<EntityRegistry>,
    pub types: Arc<TypeRegistry>,
    pub clients: Arc<ClientRegistry>,
    pub apis: Arc<ApiRegistry>,
    pub cache: Option<Arc<dyn CacheBackend>>,
    pub key_strategy: KeyStrategy,
}

/// A create that had to emit null for a not-yet-saved target; patched
/// once the target has its identifier.
struct Deferral {
    source: EntityRef,
    wire_name: String,
    target: EntityRef,
}

pub(crate) struct UowCore {
    pub(crate) services: EngineServices,
    pub(crate) this: Weak<UowCore>,
    identity: RefCell<IdentityMap>,
    tracked: RefCell<Vec<EntityRef>>,
    snapshots: RefCell<HashMap<usize, Record>>,
    pending_inserts: RefCell<Vec<EntityRef>>,
    pending_removals: RefCell<Vec<EntityRef>>,
    persisters: RefCell<HashMap<String, Rc<EntityPersister>>>,
}

impl UowCore {
    pub(crate) fn new(services: EngineServices) -> Rc<Self> {
        Rc::new_cyclic(|weak| Self {
            services,
            this: weak.clone(),
            identity: RefCell::new(IdentityMap::new()),
            tracked: RefCell::new(Vec::new()),
            snapshots: RefCell::new(HashMap::new()),
            pending_inserts: RefCell::new(Vec::new()),
            pending_removals: RefCell::new(Vec::new()),
            persisters: RefCell::new(HashMap::new()),
        })
    }

    pub(crate) fn meta(&self, class: &str) -> CoreResult<Arc<EntityMetadata>> {
        Ok(self.services.factory.metadata_for(class)?)
    }

    pub(crate) fn proxy_loader(&self) -> Weak<dyn ProxyLoader> {
        self.this.clone()
    }

    pub(crate) fn collection_loader(&self) -> Weak<dyn CollectionLoader> {
        self.this.clone()
    }

    /// The memoized persister for a class; one per class and unit of
    /// work.
    pub(crate) fn persister(&self, class: &str) -> CoreResult<Rc<EntityPersister>> {
        let meta = self.meta(class)?;
        let canonical = meta.class_name().to_owned();
        if let Some(existing) = self.persisters.borrow().get(&canonical) {
            return Ok(Rc::clone(existing));
        }
        let api_config = meta.api();
        let client = self
            .services
            .clients
            .resolve(api_config.client_name.as_deref())
            .map_err(|err| CoreError::remote("<client resolution>", err))?;
        let api = self
            .services
            .apis
            .build(
                api_config.api_alias.as_deref(),
                client,
                api_config.methods.clone(),
            )
            .map_err(|err| CoreError::remote("<api resolution>", err))?;
        let persister = Rc::new(EntityPersister::new(
            Arc::clone(&meta),
            api,
            self.this.clone(),
            self.services.cache.clone(),
            self.services.key_strategy,
        ));
        self.persisters
            .borrow_mut()
            .insert(canonical, Rc::clone(&persister));
        Ok(persister)
    }

    pub(crate) fn state_of(&self, entity: &EntityRef) -> EntityState {
        entity.state()
    }

    // State lives on the proxy itself; a pointer-keyed map here would
    // survive the entity and taint whatever allocation reuses its slot.
    fn set_state(&self, entity: &EntityRef, state: EntityState) {
        entity.set_state(state);
    }

    fn track(&self, entity: &EntityRef, state: EntityState) {
        let key = entity.ptr_key();
        let mut tracked = self.tracked.borrow_mut();
        if !tracked.iter().any(|e| e.ptr_key() == key) {
            tracked.push(entity.clone());
        }
        drop(tracked);
        self.set_state(entity, state);
    }

    pub(crate) fn record_snapshot(&self, entity: &EntityRef, record: Record) {
        self.snapshots.borrow_mut().insert(entity.ptr_key(), record);
    }

    pub(crate) fn snapshot_of(&self, entity: &EntityRef) -> Option<Record> {
        self.snapshots.borrow().get(&entity.ptr_key()).cloned()
    }

    pub(crate) fn register_identity(&self, entity: &EntityRef) -> CoreResult<()> {
        if let Some(hash) = entity.id_hash() {
            self.identity
                .borrow_mut()
                .insert(&entity.root_class(), &hash, entity.clone())?;
        }
        Ok(())
    }

    /// Looks up a managed entity by flattened identifier.
    pub(crate) fn try_get_by_hash(&self, root_class: &str, id_hash: &str) -> Option<EntityRef> {
        self.identity.borrow().get(root_class, id_hash)
    }

    /// Looks up a managed entity by caller-supplied identifier.
    pub(crate) fn try_get_by_id(
        &self,
        class: &str,
        id: &IdMap,
    ) -> CoreResult<Option<EntityRef>> {
        let meta = self.meta(class)?;
        let members = flatten::flatten(&meta, id)?;
        match flatten::hash_of(&members) {
            Some(hash) => Ok(self.try_get_by_hash(meta.root_class(), &hash)),
            None => Ok(None),
        }
    }

    /// Returns a handle for a known identifier without loading.
    ///
    /// An identity-map hit returns the managed entity; otherwise an
    /// uninitialized reference is registered and returned.
    pub(crate) fn reference_for(&self, class: &str, id: &IdMap) -> CoreResult<EntityRef> {
        let meta = self.meta(class)?;
        let members = flatten::flatten(&meta, id)?;
        let hash = flatten::hash_of(&members).ok_or_else(|| {
            CoreError::invalid_state(meta.class_name(), "reference needs a full identifier")
        })?;
        if let Some(existing) = self.try_get_by_hash(meta.root_class(), &hash) {
            return Ok(existing);
        }
        let proxy = EntityRef::uninitialized(
            meta.class_name(),
            meta.root_class(),
            members,
            self.proxy_loader(),
        );
        self.identity
            .borrow_mut()
            .insert(meta.root_class(), &hash, proxy.clone())?;
        self.track(&proxy, EntityState::Managed);
        Ok(proxy)
    }

    /// Turns one wire record into a managed entity.
    ///
    /// Resolves the concrete class through the discriminator, then keys
    /// into the identity map. A hit on an initialized entity wins over
    /// the incoming record: in-memory state is never silently
    /// overwritten by a later read. A hit on an uninitialized reference
    /// hydrates it in place.
    pub(crate) fn get_or_create_entity(
        &self,
        class: &str,
        record: &Record,
    ) -> CoreResult<EntityRef> {
        let meta = self.meta(class)?;
        let concrete = self.resolve_concrete_class(&meta, record)?;
        let members = self.id_members_from_record(&concrete, record)?;
        let hash = flatten::hash_of(&members).ok_or_else(|| {
            CoreError::hydration(concrete.class_name(), "record carries no identifier")
        })?;

        if let Some(existing) = self.try_get_by_hash(concrete.root_class(), &hash) {
            if existing.is_initialized() {
                debug!(class = concrete.class_name(), id = %hash, "identity hit, keeping in-memory state");
                return Ok(existing);
            }
            self.hydrate_into(&concrete, record, &existing)?;
            existing.set_id(members);
            self.record_snapshot(&existing, record.clone());
            self.track(&existing, EntityState::Managed);
            return Ok(existing);
        }

        let entity = EntityRef::uninitialized(
            concrete.class_name(),
            concrete.root_class(),
            members,
            self.proxy_loader(),
        );
        // Register before hydrating so records that reference themselves
        // resolve to this slot instead of spawning a second proxy.
        self.identity
            .borrow_mut()
            .insert(concrete.root_class(), &hash, entity.clone())?;
        self.track(&entity, EntityState::Managed);
        self.hydrate_into(&concrete, record, &entity)?;
        self.record_snapshot(&entity, record.clone());
        Ok(entity)
    }

    /// Hands a caller-built instance to the engine.
    pub(crate) fn persist_instance<T: Entity>(&self, instance: T) -> CoreResult<Ref<T>> {
        let meta = self.meta(T::CLASS)?;
        let table = self.services.registry.get(meta.class_name())?;
        let boxed: Box<dyn std::any::Any> = Box::new(instance);
        let entity =
            EntityRef::from_instance(meta.class_name(), meta.root_class(), Vec::new(), boxed);
        entity.set_loader(self.proxy_loader());
        let members = entity
            .with_raw_instance(|inst| self.identifier_of_instance(&meta, &table, inst))?;
        entity.set_id(members);
        self.persist_ref(&entity)?;
        entity.typed()
    }

    /// Schedules an entity for insertion and cascades over configured
    /// associations.
    pub(crate) fn persist_ref(&self, entity: &EntityRef) -> CoreResult<()> {
        match self.state_of(entity) {
            EntityState::Managed => return Ok(()),
            EntityState::Removed => {
                // Re-persisting a removal cancels it.
                self.pending_removals
                    .borrow_mut()
                    .retain(|e| !e.same_entity(entity));
                self.set_state(entity, EntityState::Managed);
                return Ok(());
            }
            EntityState::Detached => {
                return Err(CoreError::invalid_state(
                    entity.class_name(),
                    "cannot persist a detached entity",
                ));
            }
            EntityState::New => {}
        }
        if !entity.is_initialized() {
            return Err(CoreError::invalid_state(
                entity.class_name(),
                "cannot persist an unloaded reference",
            ));
        }

        entity.set_loader(self.proxy_loader());
        self.track(entity, EntityState::Managed);
        self.register_identity(entity)?;
        self.pending_inserts.borrow_mut().push(entity.clone());

        // Cascade after this entity is marked managed, so cycles
        // terminate.
        let meta = self.meta(&entity.class_name())?;
        let table = self.services.registry.get(meta.class_name())?;
        for assoc in meta.associations() {
            if !assoc.cascade_persist {
                continue;
            }
            let value = entity.with_raw_instance(|inst| table.get_assoc(inst, &assoc.name))?;
            match value {
                AssocValue::Null => {}
                AssocValue::Ref(target) => {
                    if self.state_of(&target) == EntityState::New && target.is_initialized() {
                        self.persist_ref(&target)?;
                    }
                }
                AssocValue::Collection(collection) => {
                    for element in collection.local_elements() {
                        if self.state_of(&element) == EntityState::New
                            && element.is_initialized()
                        {
                            self.persist_ref(&element)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Schedules a managed entity for remote deletion.
    pub(crate) fn remove(&self, entity: &EntityRef) -> CoreResult<()> {
        match self.state_of(entity) {
            EntityState::Managed => {
                // An entity that was never flushed just drops out.
                let mut inserts = self.pending_inserts.borrow_mut();
                let was_pending = inserts.iter().any(|e| e.same_entity(entity));
                inserts.retain(|e| !e.same_entity(entity));
                drop(inserts);
                if was_pending {
                    self.detach(entity);
                } else {
                    self.set_state(entity, EntityState::Removed);
                    self.pending_removals.borrow_mut().push(entity.clone());
                }
                Ok(())
            }
            EntityState::Removed => Ok(()),
            state => Err(CoreError::invalid_state(
                entity.class_name(),
                format!("cannot remove an entity in state {state:?}"),
            )),
        }
    }

    /// Stops tracking one entity.
    pub(crate) fn detach(&self, entity: &EntityRef) {
        let key = entity.ptr_key();
        self.tracked.borrow_mut().retain(|e| e.ptr_key() != key);
        self.snapshots.borrow_mut().remove(&key);
        self.pending_inserts
            .borrow_mut()
            .retain(|e| !e.same_entity(entity));
        self.pending_removals
            .borrow_mut()
            .retain(|e| !e.same_entity(entity));
        if let Some(hash) = entity.id_hash() {
            let root = entity.root_class();
            let mut identity = self.identity.borrow_mut();
            if identity
                .get(&root, &hash)
                .is_some_and(|e| e.same_entity(entity))
            {
                identity.remove(&root, &hash);
            }
        }
        self.set_state(entity, EntityState::Detached);
    }

    /// Stops tracking everything.
    pub(crate) fn clear(&self) {
        let tracked: Vec<EntityRef> = self.tracked.borrow().clone();
        for entity in &tracked {
            self.set_state(entity, EntityState::Detached);
        }
        self.tracked.borrow_mut().clear();
        self.identity.borrow_mut().clear();
        self.snapshots.borrow_mut().clear();
        self.pending_inserts.borrow_mut().clear();
        self.pending_removals.borrow_mut().clear();
    }

    /// Number of tracked entities.
    pub(crate) fn managed_count(&self) -> usize {
        self.identity.borrow().len()
    }

    /// Writes accumulated changes, optionally narrowed to one entity.
    pub(crate) fn flush(&self, only: Option<&EntityRef>) -> CoreResult<()> {
        let matches = |entity: &EntityRef| match only {
            Some(filter) => filter.same_entity(entity),
            None => true,
        };

        // Step 1: creates, in persist order.
        let inserts: Vec<EntityRef> = {
            let mut pending = self.pending_inserts.borrow_mut();
            let (take, keep): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|e| matches(e));
            *pending = keep;
            take
        };
        let mut deferrals: Vec<Deferral> = Vec::new();
        for (attempted, entity) in inserts.iter().enumerate() {
            if let Err(err) = self.insert_one(entity, &mut deferrals) {
                // The failed create and everything after it stay queued,
                // so a later flush picks them up again.
                self.requeue(&self.pending_inserts, &inserts[attempted..]);
                return Err(CoreError::commit(entity.class_name(), "create", err));
            }
        }

        // Step 2: patches deferred on identifiers generated in step 1.
        for deferral in deferrals {
            self.apply_deferral(&deferral).map_err(|err| {
                CoreError::commit(deferral.source.class_name(), "deferred update", err)
            })?;
        }

        // Step 3: field patches from snapshot diffs.
        let tracked: Vec<EntityRef> = self.tracked.borrow().clone();
        for entity in tracked.iter().filter(|e| matches(e)) {
            if self.state_of(entity) != EntityState::Managed || !entity.is_initialized() {
                continue;
            }
            self.update_one(entity)
                .map_err(|err| CoreError::commit(entity.class_name(), "update", err))?;
        }

        // Step 4: deletes.
        let removals: Vec<EntityRef> = {
            let mut pending = self.pending_removals.borrow_mut();
            let (take, keep): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|e| matches(e));
            *pending = keep;
            take
        };
        for (attempted, entity) in removals.iter().enumerate() {
            if let Err(err) = self.delete_one(entity) {
                self.requeue(&self.pending_removals, &removals[attempted..]);
                return Err(CoreError::commit(entity.class_name(), "remove", err));
            }
        }

        // Step 5: collection synchronization.
        for entity in tracked.iter().filter(|e| matches(e)) {
            if self.state_of(entity) != EntityState::Managed || !entity.is_initialized() {
                continue;
            }
            self.sync_collections(entity)
                .map_err(|err| CoreError::commit(entity.class_name(), "collection sync", err))?;
        }
        Ok(())
    }

    /// Puts unattempted flush work back at the head of its queue.
    fn requeue(&self, queue: &RefCell<Vec<EntityRef>>, entries: &[EntityRef]) {
        let mut pending = queue.borrow_mut();
        let mut restored = entries.to_vec();
        restored.extend(pending.drain(..));
        *pending = restored;
    }

    fn insert_one(&self, entity: &EntityRef, deferrals: &mut Vec<Deferral>) -> CoreResult<()> {
        let meta = self.meta(&entity.class_name())?;
        let persister = self.persister(meta.class_name())?;
        let (payload, deferred) = self.create_payload(&meta, entity)?;
        let generated = persister.insert(&payload)?;

        if meta.id_generation() == IdGeneration::Remote {
            let id_value = generated.ok_or_else(|| {
                CoreError::hydration(meta.class_name(), "remote create returned no identifier")
            })?;
            self.write_back_generated_id(&meta, entity, id_value)?;
        } else if !entity.has_id() {
            return Err(CoreError::invalid_state(
                meta.class_name(),
                "natural identifier must be assigned before flush",
            ));
        }
        self.register_identity(entity)?;

        for (wire_name, target) in deferred {
            deferrals.push(Deferral {
                source: entity.clone(),
                wire_name,
                target,
            });
        }

        // The post-create wire image becomes the baseline for diffs.
        let (snapshot, _) = self.dehydrate_full(&meta, entity)?;
        self.record_snapshot(entity, snapshot);
        Ok(())
    }

    fn write_back_generated_id(
        &self,
        meta: &EntityMetadata,
        entity: &EntityRef,
        wire_value: Value,
    ) -> CoreResult<()> {
        let member = meta.identifier().first().cloned().ok_or_else(|| {
            CoreError::invalid_state(meta.class_name(), "generated identifier without members")
        })?;
        let field = meta.field(&member).ok_or_else(|| {
            CoreError::invalid_state(
                meta.class_name(),
                "generated identifier must be a scalar field",
            )
        })?;
        let converter = self.services.types.get(&field.type_name)?;
        let domain_value = converter.from_wire(&wire_value, &field.options)?;
        let table = self.services.registry.get(meta.class_name())?;
        entity.with_instance_mut(|inst| {
            table.set_field(inst, &member, domain_value.clone())
        })?;
        entity.set_id(vec![(member, domain_value)]);
        Ok(())
    }

    fn apply_deferral(&self, deferral: &Deferral) -> CoreResult<()> {
        if !deferral.target.has_id() {
            warn!(
                class = deferral.source.class_name(),
                field = deferral.wire_name,
                "deferred reference target still has no identifier, leaving null"
            );
            return Ok(());
        }
        let meta = self.meta(&deferral.source.class_name())?;
        let persister = self.persister(meta.class_name())?;
        let target_value =
            flatten::target_id_value(&meta, &deferral.wire_name, &deferral.target)?;
        let mut patch = Record::new();
        patch.insert(deferral.wire_name.clone(), target_value);
        persister.patch(&deferral.source.id(), &patch)?;

        if let Some(mut snapshot) = self.snapshot_of(&deferral.source) {
            snapshot.extend(patch);
            self.record_snapshot(&deferral.source, snapshot);
        }
        Ok(())
    }

    fn update_one(&self, entity: &EntityRef) -> CoreResult<()> {
        let Some(snapshot) = self.snapshot_of(entity) else {
            return Ok(());
        };
        let meta = self.meta(&entity.class_name())?;
        let (current, deferred) = self.dehydrate_full(&meta, entity)?;
        if !deferred.is_empty() {
            warn!(
                class = meta.class_name(),
                "patching null for references to unsaved entities"
            );
        }

        let mut patch = Record::new();
        for (wire_name, value) in &current {
            // A key absent from the snapshot record is a null on the
            // wire.
            let baseline = snapshot.get(wire_name).unwrap_or(&Value::Null);
            if baseline != value {
                patch.insert(wire_name.clone(), value.clone());
            }
        }
        if patch.is_empty() {
            return Ok(());
        }
        let persister = self.persister(meta.class_name())?;
        persister.patch(&entity.id(), &patch)?;
        self.record_snapshot(entity, current);
        Ok(())
    }

    fn sync_collections(&self, entity: &EntityRef) -> CoreResult<()> {
        let meta = self.meta(&entity.class_name())?;
        let table = self.services.registry.get(meta.class_name())?;
        for assoc in meta.associations() {
            if assoc.kind != AssociationKind::OneToMany {
                continue;
            }
            let value = entity.with_raw_instance(|inst| table.get_assoc(inst, &assoc.name))?;
            let AssocValue::Collection(collection) = value else {
                continue;
            };
            if !collection.is_dirty() {
                continue;
            }
            let mapped_by = assoc.mapped_by.clone().ok_or_else(|| {
                CoreError::invalid_state(
                    meta.class_name(),
                    format!("collection '{}' has no owning side", assoc.name),
                )
            })?;

            let (adds, removes) = if collection.is_initialized() {
                let (elements, snapshot) = collection.diff_state();
                let adds: Vec<EntityRef> = elements
                    .iter()
                    .filter(|e| !snapshot.iter().any(|s| s.same_entity(e) || same_hash(s, e)))
                    .cloned()
                    .collect();
                let removes: Vec<EntityRef> = snapshot
                    .iter()
                    .filter(|s| !elements.iter().any(|e| e.same_entity(s) || same_hash(s, e)))
                    .cloned()
                    .collect();
                (adds, removes)
            } else {
                collection.take_pending()
            };

            let target_persister = self.persister(&assoc.target_class)?;
            let target_meta = self.meta(&assoc.target_class)?;
            let owner_value = flatten::target_id_value(&target_meta, &mapped_by, entity)?;
            let owning_wire = target_meta
                .association(&mapped_by)
                .and_then(|a| a.wire_name.clone())
                .ok_or_else(|| {
                    CoreError::invalid_state(
                        target_meta.class_name(),
                        format!("'{mapped_by}' is not an owning association"),
                    )
                })?;

            for added in &adds {
                if !added.has_id() {
                    warn!(
                        class = target_meta.class_name(),
                        "skipping collection add for an unsaved element"
                    );
                    continue;
                }
                // Skip elements whose owning side already points here.
                if self
                    .snapshot_of(added)
                    .and_then(|s| s.get(&owning_wire).cloned())
                    .is_some_and(|v| v == owner_value)
                {
                    continue;
                }
                let mut patch = Record::new();
                patch.insert(owning_wire.clone(), owner_value.clone());
                target_persister.patch(&added.id(), &patch)?;
                if let Some(mut snapshot) = self.snapshot_of(added) {
                    snapshot.insert(owning_wire.clone(), owner_value.clone());
                    self.record_snapshot(added, snapshot);
                }
            }

            for removed in &removes {
                if !removed.has_id() {
                    continue;
                }
                if assoc.orphan_removal {
                    target_persister.delete(&removed.id())?;
                    self.forget(removed);
                } else {
                    let mut patch = Record::new();
                    patch.insert(owning_wire.clone(), Value::Null);
                    target_persister.patch(&removed.id(), &patch)?;
                    if let Some(mut snapshot) = self.snapshot_of(removed) {
                        snapshot.insert(owning_wire.clone(), Value::Null);
                        self.record_snapshot(removed, snapshot);
                    }
                }
            }

            collection.mark_synchronized();
        }
        Ok(())
    }

    fn delete_one(&self, entity: &EntityRef) -> CoreResult<()> {
        let meta = self.meta(&entity.class_name())?;
        let persister = self.persister(meta.class_name())?;
        persister.delete(&entity.id())?;
        self.forget(entity);
        Ok(())
    }

    /// Drops an entity whose remote record no longer exists.
    fn forget(&self, entity: &EntityRef) {
        let key = entity.ptr_key();
        self.tracked.borrow_mut().retain(|e| e.ptr_key() != key);
        self.snapshots.borrow_mut().remove(&key);
        if let Some(hash) = entity.id_hash() {
            self.identity.borrow_mut().remove(&entity.root_class(), &hash);
        }
        self.set_state(entity, EntityState::Detached);
    }
}

fn same_hash(a: &EntityRef, b: &EntityRef) -> bool {
    match (a.id_hash(), b.id_hash()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

impl ProxyLoader for UowCore {
    fn load_proxy(&self, proxy: &EntityRef) -> CoreResult<()> {
        let class = proxy.class_name();
        let meta = self.meta(&class)?;
        let persister = self.persister(meta.class_name())?;
        let members = proxy.id();
        let record = persister.fetch_record(&members)?.ok_or_else(|| {
            let id = flatten::hash_of(&members).unwrap_or_default();
            CoreError::fetch(meta.class_name(), id)
        })?;
        let concrete = self.resolve_concrete_class(&meta, &record)?;
        self.hydrate_into(&concrete, &record, proxy)?;
        self.record_snapshot(proxy, record);
        self.track(proxy, EntityState::Managed);
        Ok(())
    }
}

impl CollectionLoader for UowCore {
    fn load_collection(&self, collection: &LazyCollection) -> CoreResult<Vec<EntityRef>> {
        let (persister, criteria, order) = self.collection_query(collection)?;
        persister.load_all(&criteria, &order, None, None)
    }

    fn remote_count(&self, collection: &LazyCollection) -> CoreResult<i64> {
        let (persister, criteria, _) = self.collection_query(collection)?;
        persister.count(&criteria)
    }

    fn remote_contains(
        &self,
        collection: &LazyCollection,
        element: &EntityRef,
    ) -> CoreResult<bool> {
        let (persister, mut criteria, _) = self.collection_query(collection)?;
        let target_meta = persister.metadata();
        let member = target_meta.identifier().first().cloned().ok_or_else(|| {
            CoreError::invalid_state(target_meta.class_name(), "membership needs an identifier")
        })?;
        let value = flatten::target_id_value(&target_meta, &member, element)?;
        criteria.insert(member, value);
        Ok(persister.count(&criteria)? > 0)
    }

    fn remote_slice(
        &self,
        collection: &LazyCollection,
        offset: u64,
        limit: u64,
    ) -> CoreResult<Vec<EntityRef>> {
        let (persister, criteria, order) = self.collection_query(collection)?;
        persister.load_all(&criteria, &order, Some(limit), Some(offset))
    }
}

impl UowCore {
    fn collection_query(
        &self,
        collection: &LazyCollection,
    ) -> CoreResult<(
        Rc<EntityPersister>,
        Record,
        Vec<(String, remorm_rpc::SortOrder)>,
    )> {
        let owner = collection.owner()?;
        let owner_meta = self.meta(&owner.class_name())?;
        let assoc_name = collection.assoc_name();
        let assoc = owner_meta.association(&assoc_name).ok_or_else(|| {
            CoreError::invalid_state(
                owner_meta.class_name(),
                format!("unknown association '{assoc_name}'"),
            )
        })?;
        let mapped_by = assoc.mapped_by.clone().ok_or_else(|| {
            CoreError::invalid_state(
                owner_meta.class_name(),
                format!("collection '{assoc_name}' has no owning side"),
            )
        })?;
        let persister = self.persister(&assoc.target_class)?;
        let target_meta = persister.metadata();
        let owner_value = flatten::target_id_value(&target_meta, &mapped_by, &owner)?;

        let mut criteria = collection.extra_criteria();
        criteria.insert(mapped_by, owner_value);
        Ok((persister, criteria, assoc.order_by.clone()))
    }
}

/// Caller-facing handle over one unit of work.
pub struct UnitOfWork {
    core: Rc<UowCore>,
}

impl UnitOfWork {
    pub(crate) fn from_core(core: Rc<UowCore>) -> Self {
        Self { core }
    }

    /// Hands a caller-built instance to the engine; it will be created
    /// remotely at the next flush.
    pub fn persist<T: Entity>(&self, instance: T) -> CoreResult<Ref<T>> {
        self.core.persist_instance(instance)
    }

    /// Schedules an already-wrapped entity for insertion.
    pub fn persist_ref(&self, entity: &EntityRef) -> CoreResult<()> {
        self.core.persist_ref(entity)
    }

    /// Schedules a managed entity for remote deletion at the next
    /// flush.
    pub fn remove(&self, entity: &EntityRef) -> CoreResult<()> {
        self.core.remove(entity)
    }

    /// Stops tracking one entity without touching the remote side.
    pub fn detach(&self, entity: &EntityRef) {
        self.core.detach(entity);
    }

    /// Stops tracking everything without touching the remote side.
    pub fn clear(&self) {
        self.core.clear();
    }

    /// Lifecycle state of an entity as this unit of work sees it.
    #[must_use]
    pub fn state_of(&self, entity: &EntityRef) -> EntityState {
        self.core.state_of(entity)
    }

    /// Number of identity-mapped entities.
    #[must_use]
    pub fn managed_count(&self) -> usize {
        self.core.managed_count()
    }

    /// Writes every accumulated change in order.
    pub fn flush(&self) -> CoreResult<()> {
        self.core.flush(None)
    }

    /// Writes accumulated changes for one entity only.
    pub fn flush_entity(&self, entity: &EntityRef) -> CoreResult<()> {
        self.core.flush(Some(entity))
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("managed", &self.core.managed_count())
            .finish()
    }
}
