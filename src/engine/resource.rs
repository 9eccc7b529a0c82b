//! Resource storage.
//!
//! Resources are singletons stored on the world, keyed by the same
//! [`ComponentId`] space as components so that system access analysis covers
//! them uniformly. Each value carries `added` and `changed` ticks.

use std::any::Any;
use std::cell::UnsafeCell;

use crate::engine::change::Tick;
use crate::engine::sparse_set::SparseSet;
use crate::engine::types::ComponentId;


/// One stored resource with its change ticks.
pub struct ResourceData {
    value: UnsafeCell<Box<dyn Any + Send + Sync>>,
    added: UnsafeCell<Tick>,
    changed: UnsafeCell<Tick>,
    type_name: &'static str,
}

// SAFETY: interior mutation only happens through the raw accessors, whose
// callers hold exclusive access to this resource id per the access rules.
unsafe impl Sync for ResourceData {}

impl ResourceData {
    fn new(value: Box<dyn Any + Send + Sync>, tick: Tick, type_name: &'static str) -> Self {
        Self {
            value: UnsafeCell::new(value),
            added: UnsafeCell::new(tick),
            changed: UnsafeCell::new(tick),
            type_name,
        }
    }

    /// Type name of the stored value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Typed shared access.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        // SAFETY: shared read; writers require exclusive access to this id.
        unsafe { (&*self.value.get()).downcast_ref::<T>() }
    }

    /// `(added, changed)` ticks.
    pub fn ticks(&self) -> (Tick, Tick) {
        // SAFETY: shared read of plain ticks.
        unsafe { (*self.added.get(), *self.changed.get()) }
    }

    /// Typed shared access with tick references.
    pub(crate) fn get_with_ticks<T: 'static>(&self) -> Option<(&T, &Tick, &Tick)> {
        // SAFETY: shared reads; writers require exclusive access to this id.
        unsafe {
            let value = (&*self.value.get()).downcast_ref::<T>()?;
            Some((value, &*self.added.get(), &*self.changed.get()))
        }
    }

    /// Typed exclusive access with tick references, through a shared borrow.
    ///
    /// # Safety
    /// The caller must hold exclusive access to this resource for the
    /// returned lifetime.
    pub(crate) unsafe fn get_with_ticks_unchecked<T: 'static>(
        &self,
    ) -> Option<(&mut T, &Tick, &mut Tick)> {
        // SAFETY: forwarded to the caller.
        unsafe {
            let value = (&mut *self.value.get()).downcast_mut::<T>()?;
            Some((value, &*self.added.get(), &mut *self.changed.get()))
        }
    }

    fn replace(&mut self, value: Box<dyn Any + Send + Sync>, tick: Tick) {
        *self.value.get_mut() = value;
        *self.changed.get_mut() = tick;
    }

    fn into_inner(self) -> Box<dyn Any + Send + Sync> {
        self.value.into_inner()
    }

    fn check_change_ticks(&mut self, change_tick: Tick) {
        self.added.get_mut().check_tick(change_tick);
        self.changed.get_mut().check_tick(change_tick);
    }
}

/// All resources of a world.
#[derive(Default)]
pub struct Resources {
    resources: SparseSet<ComponentId, ResourceData>,
}

impl Resources {
    /// Resource `id`, if present.
    #[inline]
    pub fn get(&self, id: ComponentId) -> Option<&ResourceData> {
        self.resources.get(id)
    }

    /// Returns `true` if resource `id` is present.
    #[inline]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.resources.contains(id)
    }

    /// Inserts or replaces resource `id`. Replacing marks it changed.
    pub(crate) fn insert<T: Send + Sync + 'static>(&mut self, id: ComponentId, value: T, tick: Tick) {
        let value: Box<dyn Any + Send + Sync> = Box::new(value);
        match self.resources.get_mut(id) {
            Some(data) => data.replace(value, tick),
            None => {
                self.resources.insert(id, ResourceData::new(value, tick, std::any::type_name::<T>()))
            }
        }
    }

    /// Removes resource `id` and returns it downcast to `T`.
    pub(crate) fn remove<T: 'static>(&mut self, id: ComponentId) -> Option<T> {
        let data = self.resources.remove(id)?;
        data.into_inner().downcast::<T>().ok().map(|value| *value)
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if no resource is stored.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub(crate) fn check_change_ticks(&mut self, change_tick: Tick) {
        for data in self.resources.values_mut() {
            data.check_change_ticks(change_tick);
        }
    }
}
