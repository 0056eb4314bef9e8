//! Per-class persistence.
//!
//! One persister per class and unit of work. It owns the CRUD API bound
//! by the class's API configuration and translates between identifiers,
//! domain criteria, and wire records. Find-by-id reads go through the
//! class's cache when one is configured; writes invalidate it.

use crate::cache::{CacheBackend, KeyStrategy};
use crate::error::{CoreError, CoreResult};
use crate::flatten;
use crate::proxy::EntityRef;
use crate::uow::UowCore;
use remorm_meta::EntityMetadata;
use remorm_rpc::{CrudApi, SearchQuery, SortOrder, Verb};
use remorm_wire::{Record, Value};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tracing::{debug, warn};

/// CRUD gateway for one mapped class.
pub struct EntityPersister {
    meta: Arc<EntityMetadata>,
    api: Box<dyn CrudApi>,
    uow: Weak<UowCore>,
    cache: Option<Arc<dyn CacheBackend>>,
    key_strategy: KeyStrategy,
}

impl EntityPersister {
    pub(crate) fn new(
        meta: Arc<EntityMetadata>,
        api: Box<dyn CrudApi>,
        uow: Weak<UowCore>,
        cache: Option<Arc<dyn CacheBackend>>,
        key_strategy: KeyStrategy,
    ) -> Self {
        Self {
            meta,
            api,
            uow,
            cache,
            key_strategy,
        }
    }

    /// Metadata of the persisted class.
    #[must_use]
    pub fn metadata(&self) -> Arc<EntityMetadata> {
        Arc::clone(&self.meta)
    }

    fn uow(&self) -> CoreResult<Rc<UowCore>> {
        self.uow.upgrade().ok_or(CoreError::EngineGone)
    }

    fn method(&self, verb: Verb) -> String {
        self.meta.api().methods.resolve(verb)
    }

    fn cache_backend(&self) -> Option<&Arc<dyn CacheBackend>> {
        if self.meta.cache().enabled {
            self.cache.as_ref()
        } else {
            None
        }
    }

    fn cache_key(&self, id_hash: &str) -> String {
        self.key_strategy.key(self.meta.class_name(), id_hash)
    }

    /// Fetches the wire record for an identifier, consulting the cache
    /// first.
    pub(crate) fn fetch_record(
        &self,
        members: &[(String, Value)],
    ) -> CoreResult<Option<Record>> {
        let Some(hash) = flatten::hash_of(members) else {
            return Ok(None);
        };

        if let Some(backend) = self.cache_backend() {
            let key = self.cache_key(&hash);
            if let Some(payload) = backend.get(&key) {
                match decode_cached(&payload) {
                    Some(record) => {
                        debug!(class = self.meta.class_name(), id = %hash, "cache hit");
                        return Ok(Some(record));
                    }
                    None => {
                        warn!(class = self.meta.class_name(), id = %hash, "dropping undecodable cache entry");
                        backend.delete(&key);
                    }
                }
            }
        }

        let criteria = self.uow()?.id_criteria(&self.meta, members)?;
        let found = self
            .api
            .find(&criteria)
            .map_err(|err| CoreError::remote(self.method(Verb::Find), err))?;

        if let (Some(record), Some(backend)) = (&found, self.cache_backend()) {
            if let Some(payload) = encode_cached(record) {
                backend.set(&self.cache_key(&hash), payload, self.meta.cache().ttl);
            }
        }
        Ok(found)
    }

    /// Loads one entity by identifier.
    pub fn load_by_id(&self, members: &[(String, Value)]) -> CoreResult<Option<EntityRef>> {
        match self.fetch_record(members)? {
            Some(record) => Ok(Some(
                self.uow()?
                    .get_or_create_entity(self.meta.class_name(), &record)?,
            )),
            None => Ok(None),
        }
    }

    /// Searches by domain-keyed criteria.
    pub fn load_all(
        &self,
        criteria: &Record,
        order: &[(String, SortOrder)],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> CoreResult<Vec<EntityRef>> {
        let uow = self.uow()?;
        let query = SearchQuery {
            criteria: uow.dehydrate_criteria(&self.meta, criteria)?,
            order_by: self.wire_order(order)?,
            limit,
            offset,
        };
        let records = self
            .api
            .search(&query)
            .map_err(|err| CoreError::remote(self.method(Verb::Search), err))?;
        let mut entities = Vec::with_capacity(records.len());
        for record in &records {
            entities.push(uow.get_or_create_entity(self.meta.class_name(), record)?);
        }
        Ok(entities)
    }

    /// Counts matching records remotely.
    pub fn count(&self, criteria: &Record) -> CoreResult<i64> {
        let wire = self.uow()?.dehydrate_criteria(&self.meta, criteria)?;
        self.api
            .count(&wire)
            .map_err(|err| CoreError::remote(self.method(Verb::Count), err))
    }

    /// Creates one record; returns the generated identifier, if any.
    pub(crate) fn insert(&self, payload: &Record) -> CoreResult<Option<Value>> {
        self.api
            .create(payload)
            .map_err(|err| CoreError::remote(self.method(Verb::Create), err))
    }

    /// Patches the record behind an identifier. Empty patches issue no
    /// call.
    pub(crate) fn patch(
        &self,
        members: &[(String, Value)],
        patch: &Record,
    ) -> CoreResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let criteria = self.uow()?.id_criteria(&self.meta, members)?;
        self.api
            .patch(&criteria, patch)
            .map_err(|err| CoreError::remote(self.method(Verb::Patch), err))?;
        self.invalidate(members);
        Ok(())
    }

    /// Deletes the record behind an identifier.
    pub(crate) fn delete(&self, members: &[(String, Value)]) -> CoreResult<()> {
        let criteria = self.uow()?.id_criteria(&self.meta, members)?;
        self.api
            .remove(&criteria)
            .map_err(|err| CoreError::remote(self.method(Verb::Remove), err))?;
        self.invalidate(members);
        Ok(())
    }

    fn invalidate(&self, members: &[(String, Value)]) {
        if let (Some(backend), Some(hash)) = (self.cache_backend(), flatten::hash_of(members)) {
            backend.delete(&self.cache_key(&hash));
        }
    }

    fn wire_order(&self, order: &[(String, SortOrder)]) -> CoreResult<Vec<(String, SortOrder)>> {
        order
            .iter()
            .map(|(name, dir)| {
                self.meta
                    .wire_name_of(name)
                    .map(|wire| (wire.to_owned(), *dir))
                    .ok_or_else(|| {
                        CoreError::hydration(
                            self.meta.class_name(),
                            format!("cannot order by unmapped member '{name}'"),
                        )
                    })
            })
            .collect()
    }
}

impl std::fmt::Debug for EntityPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityPersister")
            .field("class", &self.meta.class_name())
            .field("cached", &self.meta.cache().enabled)
            .finish()
    }
}

fn encode_cached(record: &Record) -> Option<String> {
    let json = Value::Map(record.clone()).to_json().ok()?;
    serde_json::to_string(&json).ok()
}

fn decode_cached(payload: &str) -> Option<Record> {
    let json: serde_json::Value = serde_json::from_str(payload).ok()?;
    match Value::from_json(&json) {
        Value::Map(record) => Some(record),
        _ => None,
    }
}
