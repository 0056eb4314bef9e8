//! Lazy collections for to-many associations.
//!
//! A collection starts uninitialized. `add` and `remove` buffer their
//! elements so a flush can apply them without ever loading the remote
//! contents; reads either trigger the one deferred load or, under the
//! extra-lazy fetch mode, answer count/contains/slice straight from the
//! remote side.

use crate::error::{CoreError, CoreResult};
use crate::proxy::{EntityRef, WeakEntityRef};
use remorm_wire::Record;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Serves collection reads and writes that reach the remote side.
pub(crate) trait CollectionLoader {
    /// Loads the full remote contents.
    fn load_collection(&self, collection: &LazyCollection) -> CoreResult<Vec<EntityRef>>;

    /// Counts remote elements without materializing them.
    fn remote_count(&self, collection: &LazyCollection) -> CoreResult<i64>;

    /// Checks remote membership of one element.
    fn remote_contains(
        &self,
        collection: &LazyCollection,
        element: &EntityRef,
    ) -> CoreResult<bool>;

    /// Loads one remote page.
    fn remote_slice(
        &self,
        collection: &LazyCollection,
        offset: u64,
        limit: u64,
    ) -> CoreResult<Vec<EntityRef>>;
}

struct CollectionInner {
    owner: WeakEntityRef,
    assoc_name: String,
    extra_lazy: bool,
    extra_criteria: Record,
    initialized: bool,
    dirty: bool,
    elements: Vec<EntityRef>,
    /// Contents as of the last synchronization.
    snapshot: Vec<EntityRef>,
    pending_add: Vec<EntityRef>,
    pending_remove: Vec<EntityRef>,
    loader: Weak<dyn CollectionLoader>,
}

/// Shared handle to one to-many association's contents.
///
/// Cloning is shallow; the handle inside the owning instance and any
/// handle the engine holds observe the same state.
pub struct LazyCollection {
    inner: Rc<RefCell<CollectionInner>>,
}

impl Clone for LazyCollection {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

fn same_element(a: &EntityRef, b: &EntityRef) -> bool {
    if a.same_entity(b) {
        return true;
    }
    match (a.id_hash(), b.id_hash()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

impl LazyCollection {
    pub(crate) fn uninitialized(
        owner: &EntityRef,
        assoc_name: impl Into<String>,
        extra_lazy: bool,
        loader: Weak<dyn CollectionLoader>,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(CollectionInner {
                owner: owner.downgrade(),
                assoc_name: assoc_name.into(),
                extra_lazy,
                extra_criteria: Record::new(),
                initialized: false,
                dirty: false,
                elements: Vec::new(),
                snapshot: Vec::new(),
                pending_add: Vec::new(),
                pending_remove: Vec::new(),
                loader,
            })),
        }
    }

    pub(crate) fn owner(&self) -> CoreResult<EntityRef> {
        self.inner
            .borrow()
            .owner
            .upgrade()
            .ok_or(CoreError::EngineGone)
    }

    pub(crate) fn assoc_name(&self) -> String {
        self.inner.borrow().assoc_name.clone()
    }

    pub(crate) fn extra_criteria(&self) -> Record {
        self.inner.borrow().extra_criteria.clone()
    }

    /// Returns true once the remote contents have been loaded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.borrow().initialized
    }

    /// Returns true while unsynchronized changes are pending.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.borrow().dirty
    }

    /// Loads the remote contents if they are not loaded yet, merging any
    /// buffered adds and removes on top.
    pub fn initialize(&self) -> CoreResult<()> {
        let loader = {
            let inner = self.inner.borrow();
            if inner.initialized {
                return Ok(());
            }
            inner.loader.clone()
        };
        let loader = loader.upgrade().ok_or(CoreError::EngineGone)?;
        let loaded = loader.load_collection(self)?;

        let mut inner = self.inner.borrow_mut();
        inner.snapshot = loaded.clone();
        let pending_add = std::mem::take(&mut inner.pending_add);
        let pending_remove = std::mem::take(&mut inner.pending_remove);
        inner.elements = loaded;
        for added in pending_add {
            if !inner.elements.iter().any(|e| same_element(e, &added)) {
                inner.elements.push(added);
            }
        }
        for removed in &pending_remove {
            inner.elements.retain(|e| !same_element(e, removed));
        }
        inner.initialized = true;
        Ok(())
    }

    /// Adds an element.
    ///
    /// On an uninitialized collection the add is buffered and no load
    /// happens.
    pub fn add(&self, element: EntityRef) {
        let mut inner = self.inner.borrow_mut();
        inner.dirty = true;
        if inner.initialized {
            if !inner.elements.iter().any(|e| same_element(e, &element)) {
                inner.elements.push(element);
            }
        } else {
            inner.pending_remove.retain(|e| !same_element(e, &element));
            if !inner.pending_add.iter().any(|e| same_element(e, &element)) {
                inner.pending_add.push(element);
            }
        }
    }

    /// Removes an element; buffered on an uninitialized collection.
    ///
    /// Returns true if the element was present locally (always true for
    /// a buffered removal, which cannot check).
    pub fn remove(&self, element: &EntityRef) -> bool {
        let mut inner = self.inner.borrow_mut();
        inner.dirty = true;
        if inner.initialized {
            let before = inner.elements.len();
            inner.elements.retain(|e| !same_element(e, element));
            inner.elements.len() != before
        } else {
            inner.pending_add.retain(|e| !same_element(e, element));
            if !inner
                .pending_remove
                .iter()
                .any(|e| same_element(e, element))
            {
                inner.pending_remove.push(element.clone());
            }
            true
        }
    }

    /// Number of elements.
    ///
    /// Extra-lazy collections answer from the remote side, adjusted by
    /// the pending buffers; others load first.
    pub fn count(&self) -> CoreResult<i64> {
        {
            let inner = self.inner.borrow();
            if inner.initialized {
                return Ok(inner.elements.len() as i64);
            }
            if inner.extra_lazy {
                let loader = inner.loader.upgrade().ok_or(CoreError::EngineGone)?;
                let adds = inner.pending_add.len() as i64;
                let removes = inner.pending_remove.len() as i64;
                drop(inner);
                let remote = loader.remote_count(self)?;
                return Ok(remote + adds - removes);
            }
        }
        self.initialize()?;
        Ok(self.inner.borrow().elements.len() as i64)
    }

    /// Membership test.
    pub fn contains(&self, element: &EntityRef) -> CoreResult<bool> {
        {
            let inner = self.inner.borrow();
            if inner.initialized {
                return Ok(inner.elements.iter().any(|e| same_element(e, element)));
            }
            if inner.extra_lazy {
                if inner.pending_add.iter().any(|e| same_element(e, element)) {
                    return Ok(true);
                }
                if inner
                    .pending_remove
                    .iter()
                    .any(|e| same_element(e, element))
                {
                    return Ok(false);
                }
                let loader = inner.loader.upgrade().ok_or(CoreError::EngineGone)?;
                drop(inner);
                return loader.remote_contains(self, element);
            }
        }
        self.initialize()?;
        Ok(self
            .inner
            .borrow()
            .elements
            .iter()
            .any(|e| same_element(e, element)))
    }

    /// One page of elements.
    ///
    /// Extra-lazy collections page on the remote side without loading
    /// or merging buffered changes.
    pub fn slice(&self, offset: u64, limit: u64) -> CoreResult<Vec<EntityRef>> {
        {
            let inner = self.inner.borrow();
            if !inner.initialized && inner.extra_lazy {
                let loader = inner.loader.upgrade().ok_or(CoreError::EngineGone)?;
                drop(inner);
                return loader.remote_slice(self, offset, limit);
            }
        }
        self.initialize()?;
        let inner = self.inner.borrow();
        Ok(inner
            .elements
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    /// The element at `index`, loading first if needed.
    pub fn get(&self, index: usize) -> CoreResult<Option<EntityRef>> {
        self.initialize()?;
        Ok(self.inner.borrow().elements.get(index).cloned())
    }

    /// All elements, loading first if needed.
    pub fn items(&self) -> CoreResult<Vec<EntityRef>> {
        self.initialize()?;
        Ok(self.inner.borrow().elements.clone())
    }

    /// Empties the collection, loading first so every current element is
    /// seen and scheduled for removal at the next flush.
    pub fn clear(&self) -> CoreResult<()> {
        self.initialize()?;
        let mut inner = self.inner.borrow_mut();
        if !inner.elements.is_empty() {
            inner.dirty = true;
        }
        inner.elements.clear();
        Ok(())
    }

    /// Derives an uninitialized collection filtered by extra criteria,
    /// served by the same loader.
    ///
    /// The derived collection is a read view; changes made to it are
    /// never synchronized.
    #[must_use]
    pub fn matching(&self, criteria: Record) -> LazyCollection {
        let inner = self.inner.borrow();
        let mut merged = inner.extra_criteria.clone();
        merged.extend(criteria);
        LazyCollection {
            inner: Rc::new(RefCell::new(CollectionInner {
                owner: inner.owner.clone(),
                assoc_name: inner.assoc_name.clone(),
                extra_lazy: inner.extra_lazy,
                extra_criteria: merged,
                initialized: false,
                dirty: false,
                elements: Vec::new(),
                snapshot: Vec::new(),
                pending_add: Vec::new(),
                pending_remove: Vec::new(),
                loader: inner.loader.clone(),
            })),
        }
    }

    /// Locally visible elements, buffered adds included, without
    /// loading.
    pub(crate) fn local_elements(&self) -> Vec<EntityRef> {
        let inner = self.inner.borrow();
        let mut elements = inner.elements.clone();
        for pending in &inner.pending_add {
            if !elements.iter().any(|e| same_element(e, pending)) {
                elements.push(pending.clone());
            }
        }
        elements
    }

    /// Buffered changes for flush synchronization: elements to attach
    /// and elements to detach. Clears the buffers.
    pub(crate) fn take_pending(&self) -> (Vec<EntityRef>, Vec<EntityRef>) {
        let mut inner = self.inner.borrow_mut();
        (
            std::mem::take(&mut inner.pending_add),
            std::mem::take(&mut inner.pending_remove),
        )
    }

    /// Current elements paired with the contents of the last
    /// synchronization, for diffing at flush.
    pub(crate) fn diff_state(&self) -> (Vec<EntityRef>, Vec<EntityRef>) {
        let inner = self.inner.borrow();
        (inner.elements.clone(), inner.snapshot.clone())
    }

    /// Records the post-flush contents as the new snapshot.
    pub(crate) fn mark_synchronized(&self) {
        let mut inner = self.inner.borrow_mut();
        let snapshot = inner.elements.clone();
        inner.snapshot = snapshot;
        inner.dirty = false;
    }
}

impl std::fmt::Debug for LazyCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("LazyCollection")
            .field("assoc", &inner.assoc_name)
            .field("initialized", &inner.initialized)
            .field("dirty", &inner.dirty)
            .finish()
    }
}
