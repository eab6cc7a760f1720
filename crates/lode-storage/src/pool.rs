use std::any::Any;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard};

use lode_core::{Guid, Handle, MetaHandle, SlotIndex, TypeId};
use lode_reflect::Reflect;

use crate::maps::{RefCountMap, VersionMap};
use crate::raw_pool::RawPool;
use crate::StorageError;

struct PoolInner<T> {
    raw: RawPool<T>,
    versions: VersionMap,
    ref_counts: RefCountMap,
    guid_to_handle: HashMap<Guid, Handle<T>>,
    handle_to_guid: HashMap<Handle<T>, Guid>,
}

/// Typed, thread-safe object pool.
///
/// Slots are never reordered; a handle stays valid until the object it names
/// is destroyed, which bumps the slot version. Every live slot carries a
/// refcount of at least one and exactly one GUID binding.
///
/// One mutex guards the free-list, maps, versions and refcounts together, so
/// compound operations (release down to zero, for instance) run in a single
/// lock scope and never re-enter.
pub struct Pool<T> {
    type_id: TypeId,
    inner: Mutex<PoolInner<T>>,
}

/// Lock-holding reference to a pooled object, returned by [`Pool::get`].
pub struct PoolRef<'a, T> {
    guard: MutexGuard<'a, PoolInner<T>>,
    index: usize,
}

impl<T> Deref for PoolRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.raw.get(self.index)
    }
}

impl<T: Any + Send + Sync + Clone> Pool<T> {
    pub(crate) fn new(
        type_id: TypeId,
        forced_alignment: Option<usize>,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            type_id,
            inner: Mutex::new(PoolInner {
                raw: RawPool::new(forced_alignment)?,
                versions: VersionMap::default(),
                ref_counts: RefCountMap::default(),
                guid_to_handle: HashMap::new(),
                handle_to_guid: HashMap::new(),
            }),
        })
    }

    /// Id of the type this pool stores.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner<T>> {
        self.inner.lock().unwrap()
    }

    fn validate(inner: &PoolInner<T>, handle: Handle<T>) -> bool {
        !handle.is_null() && inner.versions.validate(handle.idx as usize, handle.ver)
    }

    /// Allocates a slot, moves the value in, sets the refcount to one and
    /// binds the GUID in both directions.
    pub fn add(&self, value: T, guid: Guid) -> Result<Handle<T>, StorageError> {
        if !guid.is_valid() {
            return Err(StorageError::InvalidGuid);
        }
        let mut inner = self.lock();
        if inner.guid_to_handle.contains_key(&guid) {
            return Err(StorageError::GuidAlreadyBound(guid));
        }
        let index = inner.raw.create(value);
        let version = inner.versions.assign(index);
        let handle = Handle::new(index as SlotIndex, version);
        inner.ref_counts.add_ref(index);
        inner.guid_to_handle.insert(guid, handle);
        inner.handle_to_guid.insert(handle, guid);
        Ok(handle)
    }

    /// Validated access; the returned guard holds the pool lock.
    pub fn get(&self, handle: Handle<T>) -> Result<PoolRef<'_, T>, StorageError> {
        let guard = self.lock();
        if !Self::validate(&guard, handle) {
            return Err(StorageError::InvalidHandle);
        }
        Ok(PoolRef {
            guard,
            index: handle.idx as usize,
        })
    }

    /// Non-failing access variant.
    pub fn try_get(&self, handle: Handle<T>) -> Option<PoolRef<'_, T>> {
        self.get(handle).ok()
    }

    /// Runs `mutator` on the object under the pool lock, for atomic
    /// read-modify-write.
    pub fn modify<R>(
        &self,
        handle: Handle<T>,
        mutator: impl FnOnce(&mut T) -> R,
    ) -> Result<R, StorageError> {
        let mut inner = self.lock();
        if !Self::validate(&inner, handle) {
            return Err(StorageError::InvalidHandle);
        }
        Ok(mutator(inner.raw.get_mut(handle.idx as usize)))
    }

    /// Increments the refcount; fails on invalid handles.
    pub fn retain(&self, handle: Handle<T>) -> Result<usize, StorageError> {
        let mut inner = self.lock();
        if !Self::validate(&inner, handle) {
            return Err(StorageError::InvalidHandle);
        }
        Ok(inner.ref_counts.add_ref(handle.idx as usize))
    }

    fn teardown(inner: &mut PoolInner<T>, handle: Handle<T>) {
        let index = handle.idx as usize;
        if let Some(guid) = inner.handle_to_guid.remove(&handle) {
            inner.guid_to_handle.remove(&guid);
        }
        inner.versions.bump(index);
        inner.ref_counts.reset(index);
        inner.raw.destroy(index);
    }

    /// Decrements the refcount, destroying the object when it reaches zero.
    pub fn release(&self, handle: Handle<T>) -> Result<usize, StorageError> {
        let mut inner = self.lock();
        if !Self::validate(&inner, handle) {
            return Err(StorageError::InvalidHandle);
        }
        let count = inner.ref_counts.release(handle.idx as usize);
        if count == 0 {
            Self::teardown(&mut inner, handle);
        }
        Ok(count)
    }

    /// Destroys the object immediately, regardless of its refcount.
    pub fn remove_now(&self, handle: Handle<T>) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if !Self::validate(&inner, handle) {
            return Err(StorageError::InvalidHandle);
        }
        Self::teardown(&mut inner, handle);
        Ok(())
    }

    /// Current refcount; zero for invalid handles.
    pub fn ref_count(&self, handle: Handle<T>) -> usize {
        let inner = self.lock();
        if !Self::validate(&inner, handle) {
            return 0;
        }
        inner.ref_counts.count(handle.idx as usize)
    }

    /// Returns `true` iff the handle addresses a live slot.
    pub fn is_valid(&self, handle: Handle<T>) -> bool {
        Self::validate(&self.lock(), handle)
    }

    /// Looks up the live handle bound to a GUID.
    pub fn handle_for_guid(&self, guid: Guid) -> Option<Handle<T>> {
        let inner = self.lock();
        inner
            .guid_to_handle
            .get(&guid)
            .copied()
            .filter(|handle| Self::validate(&inner, *handle))
    }

    /// Looks up the GUID bound to a live handle.
    pub fn guid_for_handle(&self, handle: Handle<T>) -> Option<Guid> {
        let inner = self.lock();
        if !Self::validate(&inner, handle) {
            return None;
        }
        inner.handle_to_guid.get(&handle).copied()
    }

    /// Number of free slots.
    pub fn count_free(&self) -> usize {
        self.lock().raw.count_free()
    }

    /// Capacity in slots. Grows geometrically, never shrinks.
    pub fn capacity(&self) -> usize {
        self.lock().raw.capacity()
    }

    /// Stored element size; at least one machine word.
    pub fn element_size(&self) -> usize {
        self.lock().raw.element_size()
    }

    /// Allocation alignment of the slots.
    pub fn alignment(&self) -> usize {
        self.lock().raw.alignment()
    }

    /// Number of live objects.
    pub fn live_count(&self) -> usize {
        self.lock().guid_to_handle.len()
    }

    /// Destroys every object and releases the allocation. Versions and
    /// refcounts reset with it.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.raw.clear();
        inner.versions = VersionMap::default();
        inner.ref_counts = RefCountMap::default();
        inner.guid_to_handle.clear();
        inner.handle_to_guid.clear();
    }

    /// Visits all live objects.
    pub fn visit<F: FnMut(&T)>(&self, visitor: F) {
        self.lock().raw.visit_used(visitor);
    }

    /// Visits all live objects mutably.
    pub fn visit_mut<F: FnMut(&mut T)>(&self, visitor: F) {
        self.lock().raw.visit_used_mut(visitor);
    }

    fn validate_meta(&self, handle: MetaHandle) -> Result<Handle<T>, StorageError> {
        handle
            .cast::<T>(self.type_id)
            .ok_or(StorageError::HandleTypeMismatch)
    }
}

/// Type-erased pool interface used by [`crate::Storage`].
pub(crate) trait PoolOps: Send + Sync {
    fn type_id(&self) -> TypeId;
    fn add_boxed(&self, value: Box<dyn Reflect>, guid: Guid) -> Result<MetaHandle, StorageError>;
    fn clone_value(&self, handle: MetaHandle) -> Result<Box<dyn Reflect>, StorageError>;
    fn with_value(
        &self,
        handle: MetaHandle,
        visitor: &mut dyn FnMut(&dyn Reflect),
    ) -> Result<(), StorageError>;
    fn with_value_mut(
        &self,
        handle: MetaHandle,
        visitor: &mut dyn FnMut(&mut dyn Reflect),
    ) -> Result<(), StorageError>;
    fn retain_meta(&self, handle: MetaHandle) -> Result<usize, StorageError>;
    fn release_meta(&self, handle: MetaHandle) -> Result<usize, StorageError>;
    fn remove_now_meta(&self, handle: MetaHandle) -> Result<(), StorageError>;
    fn is_valid_meta(&self, handle: MetaHandle) -> bool;
    fn handle_for_guid_meta(&self, guid: Guid) -> Option<MetaHandle>;
    fn guid_for_handle_meta(&self, handle: MetaHandle) -> Option<Guid>;
    fn element_size(&self) -> usize;
    fn count_free(&self) -> usize;
    fn capacity(&self) -> usize;
    fn live_count(&self) -> usize;
    fn clear(&self);
    fn visit_reflect(&self, visitor: &mut dyn FnMut(&dyn Reflect));
    fn visit_reflect_mut(&self, visitor: &mut dyn FnMut(&mut dyn Reflect));
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync + Clone> PoolOps for Pool<T> {
    fn type_id(&self) -> TypeId {
        self.type_id
    }

    fn add_boxed(&self, value: Box<dyn Reflect>, guid: Guid) -> Result<MetaHandle, StorageError> {
        let value = value
            .into_any()
            .downcast::<T>()
            .map_err(|_value| StorageError::HandleTypeMismatch)?;
        let handle = self.add(*value, guid)?;
        Ok(MetaHandle::from_handle(handle, self.type_id))
    }

    fn clone_value(&self, handle: MetaHandle) -> Result<Box<dyn Reflect>, StorageError> {
        let handle = self.validate_meta(handle)?;
        let value = self.get(handle)?;
        Ok(Box::new(value.clone()))
    }

    fn with_value(
        &self,
        handle: MetaHandle,
        visitor: &mut dyn FnMut(&dyn Reflect),
    ) -> Result<(), StorageError> {
        let handle = self.validate_meta(handle)?;
        let value = self.get(handle)?;
        visitor(&*value);
        Ok(())
    }

    fn with_value_mut(
        &self,
        handle: MetaHandle,
        visitor: &mut dyn FnMut(&mut dyn Reflect),
    ) -> Result<(), StorageError> {
        let handle = self.validate_meta(handle)?;
        self.modify(handle, |value| visitor(value))
    }

    fn retain_meta(&self, handle: MetaHandle) -> Result<usize, StorageError> {
        self.retain(self.validate_meta(handle)?)
    }

    fn release_meta(&self, handle: MetaHandle) -> Result<usize, StorageError> {
        self.release(self.validate_meta(handle)?)
    }

    fn remove_now_meta(&self, handle: MetaHandle) -> Result<(), StorageError> {
        self.remove_now(self.validate_meta(handle)?)
    }

    fn is_valid_meta(&self, handle: MetaHandle) -> bool {
        self.validate_meta(handle)
            .map(|handle| self.is_valid(handle))
            .unwrap_or(false)
    }

    fn handle_for_guid_meta(&self, guid: Guid) -> Option<MetaHandle> {
        self.handle_for_guid(guid)
            .map(|handle| MetaHandle::from_handle(handle, self.type_id))
    }

    fn guid_for_handle_meta(&self, handle: MetaHandle) -> Option<Guid> {
        self.validate_meta(handle)
            .ok()
            .and_then(|handle| self.guid_for_handle(handle))
    }

    fn element_size(&self) -> usize {
        Pool::element_size(self)
    }

    fn count_free(&self) -> usize {
        Pool::count_free(self)
    }

    fn capacity(&self) -> usize {
        Pool::capacity(self)
    }

    fn live_count(&self) -> usize {
        Pool::live_count(self)
    }

    fn clear(&self) {
        Pool::clear(self);
    }

    fn visit_reflect(&self, visitor: &mut dyn FnMut(&dyn Reflect)) {
        self.visit(|value: &T| visitor(value));
    }

    fn visit_reflect_mut(&self, visitor: &mut dyn FnMut(&mut dyn Reflect)) {
        self.visit_mut(|value: &mut T| visitor(value));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
