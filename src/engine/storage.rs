//! Type-erased column storage.
//!
//! This module implements the single-component column used by both tables
//! and sparse sets, and the [`Storages`] aggregate owned by the world.
//!
//! # Storage model
//!
//! A [`Column`] stores one component type densely:
//!
//! ```text
//! data:          Box<dyn ErasedVec>   (a Vec<T> behind a type-erased interface)
//! added_ticks:   Vec<Tick>            (parallel to data)
//! changed_ticks: Vec<Tick>            (parallel to data)
//! ```
//!
//! Rows are addressed by a single linear index. Removal is swap-remove, so
//! the last row fills the gap and order is not preserved.
//!
//! # Type erasure
//!
//! [`ErasedVec`] lets tables hold heterogeneous columns behind trait objects.
//! Values cross the erased boundary as `Box<dyn Any + Send>` and are
//! downcast back to their concrete type on entry. A mismatch means the
//! registry handed out inconsistent ids and is treated as an internal
//! invariant violation.
//!
//! # Safety and invariants
//!
//! Column contents sit behind `UnsafeCell` so that queries can hand out
//! disjoint `&mut T` for different rows, and different columns of the same
//! table, while only holding a shared reference to the table. Callers of the
//! raw pointer accessors must uphold the access rules computed by
//! [`Access`](crate::engine::access::Access): no two live borrows of the same
//! row may overlap unless both are shared.

use std::any::{type_name, Any};
use std::cell::UnsafeCell;

use crate::engine::change::Tick;
use crate::engine::resource::Resources;
use crate::engine::sparse_set::SparseSets;
use crate::engine::table::Tables;


/// Dynamically-typed interface over a `Vec<T>`.
pub trait ErasedVec: Any + Send + Sync {
    /// Number of stored values.
    fn len(&self) -> usize;

    /// Returns `true` if empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated capacity.
    fn capacity(&self) -> usize;

    /// Reserves room for exactly `additional` more values.
    fn reserve_exact(&mut self, additional: usize);

    /// Appends a boxed value, returning it back if its type is wrong.
    fn push_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>>;

    /// Overwrites `row` with a boxed value, returning it back if its type is wrong.
    fn replace_boxed(&mut self, row: usize, value: Box<dyn Any + Send>)
        -> Result<(), Box<dyn Any + Send>>;

    /// Swap-removes `row` and returns the value boxed.
    fn swap_remove_boxed(&mut self, row: usize) -> Box<dyn Any + Send>;

    /// Swap-removes `row` and drops the value.
    fn swap_remove_and_drop(&mut self, row: usize);

    /// Swap-removes `row` and appends the value to `destination`.
    ///
    /// Returns `false` if `destination` stores a different type.
    fn swap_remove_into(&mut self, row: usize, destination: &mut dyn ErasedVec) -> bool;

    /// Drops every value.
    fn clear(&mut self);

    /// Returns `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns `&mut dyn Any` for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Human-readable element type name.
    fn element_type_name(&self) -> &'static str;
}

/// Concrete [`ErasedVec`] for element type `T`.
pub struct TypedVec<T> {
    values: UnsafeCell<Vec<T>>,
}

// SAFETY: shared access to the inner `Vec` only happens through the raw
// pointer accessors below, whose callers follow the computed access sets.
unsafe impl<T: Send + Sync> Sync for TypedVec<T> {}

impl<T> TypedVec<T> {
    fn new() -> Self {
        Self { values: UnsafeCell::new(Vec::new()) }
    }

    #[inline]
    fn values(&self) -> &Vec<T> {
        // SAFETY: mutation through `&self` only happens via raw element
        // pointers, which never touch the `Vec` header.
        unsafe { &*self.values.get() }
    }

    #[inline]
    fn values_mut(&mut self) -> &mut Vec<T> {
        self.values.get_mut()
    }
}

/// Builds an empty column for `T`. Stored as the registry's factory function.
pub(crate) fn new_typed_vec<T: Send + Sync + 'static>() -> Box<dyn ErasedVec> {
    Box::new(TypedVec::<T>::new())
}

impl<T: Send + Sync + 'static> ErasedVec for TypedVec<T> {
    fn len(&self) -> usize { self.values().len() }
    fn capacity(&self) -> usize { self.values().capacity() }
    fn reserve_exact(&mut self, additional: usize) { self.values_mut().reserve_exact(additional) }

    fn push_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>> {
        let value = value.downcast::<T>()?;
        self.values_mut().push(*value);
        Ok(())
    }

    fn replace_boxed(
        &mut self,
        row: usize,
        value: Box<dyn Any + Send>,
    ) -> Result<(), Box<dyn Any + Send>> {
        let value = value.downcast::<T>()?;
        self.values_mut()[row] = *value;
        Ok(())
    }

    fn swap_remove_boxed(&mut self, row: usize) -> Box<dyn Any + Send> {
        Box::new(self.values_mut().swap_remove(row))
    }

    fn swap_remove_and_drop(&mut self, row: usize) {
        self.values_mut().swap_remove(row);
    }

    fn swap_remove_into(&mut self, row: usize, destination: &mut dyn ErasedVec) -> bool {
        match destination.as_any_mut().downcast_mut::<TypedVec<T>>() {
            Some(destination) => {
                let value = self.values_mut().swap_remove(row);
                destination.values_mut().push(value);
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) { self.values_mut().clear() }
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }
    fn element_type_name(&self) -> &'static str { type_name::<T>() }
}

#[cold]
#[inline(never)]
fn column_type_mismatch(expected: &str) -> ! {
    panic!("value does not match the column element type `{expected}`")
}

/// One component's values plus their change ticks.
pub struct Column {
    data: Box<dyn ErasedVec>,
    added_ticks: UnsafeCell<Vec<Tick>>,
    changed_ticks: UnsafeCell<Vec<Tick>>,
}

// SAFETY: see the module-level notes; tick vectors follow the same access
// discipline as the data they describe.
unsafe impl Sync for Column {}

impl Column {
    pub(crate) fn new(data: Box<dyn ErasedVec>) -> Self {
        Self {
            data,
            added_ticks: UnsafeCell::new(Vec::new()),
            changed_ticks: UnsafeCell::new(Vec::new()),
        }
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the column has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocated capacity of the value array.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Element type name.
    #[inline]
    pub fn element_type_name(&self) -> &'static str {
        self.data.element_type_name()
    }

    pub(crate) fn reserve_exact(&mut self, additional: usize) {
        self.data.reserve_exact(additional);
        self.added_ticks.get_mut().reserve_exact(additional);
        self.changed_ticks.get_mut().reserve_exact(additional);
    }

    /// Appends a value stamped as added and changed at `tick`.
    pub(crate) fn push(&mut self, value: Box<dyn Any + Send>, tick: Tick) {
        if self.data.push_boxed(value).is_err() {
            column_type_mismatch(self.data.element_type_name());
        }
        self.added_ticks.get_mut().push(tick);
        self.changed_ticks.get_mut().push(tick);
    }

    /// Overwrites `row`, stamping it as changed at `tick`.
    pub(crate) fn replace(&mut self, row: usize, value: Box<dyn Any + Send>, tick: Tick) {
        if self.data.replace_boxed(row, value).is_err() {
            column_type_mismatch(self.data.element_type_name());
        }
        self.changed_ticks.get_mut()[row] = tick;
    }

    pub(crate) fn swap_remove_and_drop(&mut self, row: usize) {
        self.data.swap_remove_and_drop(row);
        self.added_ticks.get_mut().swap_remove(row);
        self.changed_ticks.get_mut().swap_remove(row);
    }

    pub(crate) fn swap_remove_boxed(&mut self, row: usize) -> Box<dyn Any + Send> {
        self.added_ticks.get_mut().swap_remove(row);
        self.changed_ticks.get_mut().swap_remove(row);
        self.data.swap_remove_boxed(row)
    }

    /// Moves `row` into the end of `destination`, keeping its ticks.
    pub(crate) fn swap_remove_into(&mut self, row: usize, destination: &mut Column) {
        if !self.data.swap_remove_into(row, destination.data.as_mut()) {
            column_type_mismatch(destination.data.element_type_name());
        }
        let added = self.added_ticks.get_mut().swap_remove(row);
        let changed = self.changed_ticks.get_mut().swap_remove(row);
        destination.added_ticks.get_mut().push(added);
        destination.changed_ticks.get_mut().push(changed);
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
        self.added_ticks.get_mut().clear();
        self.changed_ticks.get_mut().clear();
    }

    #[inline]
    fn typed<T: 'static>(&self) -> Option<&TypedVec<T>> {
        self.data.as_any().downcast_ref::<TypedVec<T>>()
    }

    /// Typed shared access to `row`.
    pub fn get<T: 'static>(&self, row: usize) -> Option<&T> {
        self.typed::<T>()?.values().get(row)
    }

    /// Typed exclusive access to `row`.
    pub fn get_mut<T: 'static>(&mut self, row: usize) -> Option<&mut T> {
        self.data
            .as_any_mut()
            .downcast_mut::<TypedVec<T>>()?
            .values_mut()
            .get_mut(row)
    }

    /// All values as a typed slice.
    pub fn as_slice<T: 'static>(&self) -> Option<&[T]> {
        self.typed::<T>().map(|typed| typed.values().as_slice())
    }

    /// Tick at which `row` was added.
    #[inline]
    pub fn get_added_tick(&self, row: usize) -> Option<Tick> {
        // SAFETY: shared read of the tick vector header.
        unsafe { (&*self.added_ticks.get()).get(row).copied() }
    }

    /// Tick at which `row` was last changed.
    #[inline]
    pub fn get_changed_tick(&self, row: usize) -> Option<Tick> {
        // SAFETY: shared read of the tick vector header.
        unsafe { (&*self.changed_ticks.get()).get(row).copied() }
    }

    /// Typed exclusive access to `row` together with its ticks.
    pub(crate) fn get_with_ticks_mut<T: 'static>(
        &mut self,
        row: usize,
    ) -> Option<(&mut T, &Tick, &mut Tick)> {
        let value = self
            .data
            .as_any_mut()
            .downcast_mut::<TypedVec<T>>()?
            .values_mut()
            .get_mut(row)?;
        let added = self.added_ticks.get_mut().get(row)?;
        let changed = self.changed_ticks.get_mut().get_mut(row)?;
        Some((value, added, changed))
    }

    /// Pointer to the first value, for read-only fetches.
    #[inline]
    pub(crate) fn data_ptr<T: 'static>(&self) -> Option<*const T> {
        self.typed::<T>().map(|typed| typed.values().as_ptr())
    }

    /// Pointer to the first value, for exclusive fetches.
    ///
    /// # Safety
    /// The caller must hold exclusive access to this column for as long as
    /// the pointer or anything derived from it is used.
    #[inline]
    pub(crate) unsafe fn data_ptr_mut<T: 'static>(&self) -> Option<*mut T> {
        let typed = self.typed::<T>()?;
        // SAFETY: the caller guarantees exclusive access to the column.
        Some(unsafe { (*typed.values.get()).as_mut_ptr() })
    }

    /// Pointer to the added ticks.
    #[inline]
    pub(crate) fn added_ticks_ptr(&self) -> *const Tick {
        // SAFETY: shared read of the tick vector header.
        unsafe { (*self.added_ticks.get()).as_ptr() }
    }

    /// Pointer to the changed ticks, for reads.
    #[inline]
    pub(crate) fn changed_ticks_ptr(&self) -> *const Tick {
        // SAFETY: shared read of the tick vector header.
        unsafe { (*self.changed_ticks.get()).as_ptr() }
    }

    /// Pointer to the changed ticks, for writes.
    ///
    /// # Safety
    /// Same contract as [`Column::data_ptr_mut`].
    #[inline]
    pub(crate) unsafe fn changed_ticks_ptr_mut(&self) -> *mut Tick {
        // SAFETY: the caller guarantees exclusive access to the column.
        unsafe { (*self.changed_ticks.get()).as_mut_ptr() }
    }

    /// Clamps stale ticks so they stay comparable after wraparound.
    pub(crate) fn check_change_ticks(&mut self, change_tick: Tick) {
        for tick in self.added_ticks.get_mut() {
            tick.check_tick(change_tick);
        }
        for tick in self.changed_ticks.get_mut() {
            tick.check_tick(change_tick);
        }
    }
}

/// All component and resource storage of a world.
#[derive(Default)]
pub struct Storages {
    /// Dense archetype tables.
    pub tables: Tables,
    /// Sparse-set components.
    pub sparse_sets: SparseSets,
    /// Resources.
    pub resources: Resources,
}
