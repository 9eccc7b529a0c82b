//! Sparse sets.
//!
//! ## Purpose
//! [`SparseSet`] maps a dense index domain (entity indices, component ids)
//! onto a packed value array with O(1) insert, lookup and removal.
//! [`ComponentSparseSet`] specializes it for sparse-set components: one
//! type-erased [`Column`] per component, keyed by entity index.
//!
//! ## Design
//! ```text
//! sparse:  [ None, Some(1), None, Some(0) ]   index -> dense position
//! dense:   [ v3, v1 ]                         packed values
//! indices: [ 3, 1 ]                           dense position -> index
//! ```
//!
//! Removal swap-removes from the dense arrays and repoints the sparse entry
//! of the element that moved into the gap.
//!
//! ## Invariants
//! - `sparse[indices[i]] == Some(i)` for every dense position `i`.
//! - Value order follows dense order and changes after removals.

use std::any::Any;

use crate::engine::change::Tick;
use crate::engine::component::ComponentInfo;
use crate::engine::entity::Entity;
use crate::engine::storage::Column;
use crate::engine::types::{ComponentId, SparseSetIndex};


/// Packed map from a dense index type to values.
#[derive(Debug)]
pub struct SparseSet<I, V> {
    dense: Vec<V>,
    indices: Vec<I>,
    sparse: Vec<Option<u32>>,
}

impl<I, V> Default for SparseSet<I, V> {
    fn default() -> Self {
        Self { dense: Vec::new(), indices: Vec::new(), sparse: Vec::new() }
    }
}

impl<I: SparseSetIndex, V> SparseSet<I, V> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` at `index`, overwriting any previous value.
    pub fn insert(&mut self, index: I, value: V) {
        let slot = index.sparse_set_index();
        if let Some(Some(dense_index)) = self.sparse.get(slot) {
            self.dense[*dense_index as usize] = value;
            return;
        }
        if slot >= self.sparse.len() {
            self.sparse.resize(slot + 1, None);
        }
        self.sparse[slot] = Some(self.dense.len() as u32);
        self.indices.push(index);
        self.dense.push(value);
    }

    /// Returns the value at `index`, inserting `func()` first if absent.
    pub fn get_or_insert_with(&mut self, index: I, func: impl FnOnce() -> V) -> &mut V {
        let slot = index.sparse_set_index();
        let dense_index = match self.sparse.get(slot) {
            Some(Some(dense_index)) => *dense_index as usize,
            _ => {
                self.insert(index, func());
                self.dense.len() - 1
            }
        };
        &mut self.dense[dense_index]
    }

    #[inline]
    fn dense_index(&self, index: I) -> Option<usize> {
        self.sparse
            .get(index.sparse_set_index())
            .copied()
            .flatten()
            .map(|dense_index| dense_index as usize)
    }

    /// Returns `true` if `index` holds a value.
    #[inline]
    pub fn contains(&self, index: I) -> bool {
        self.dense_index(index).is_some()
    }

    /// Value at `index`.
    #[inline]
    pub fn get(&self, index: I) -> Option<&V> {
        self.dense_index(index).map(|dense_index| &self.dense[dense_index])
    }

    /// Mutable value at `index`.
    #[inline]
    pub fn get_mut(&mut self, index: I) -> Option<&mut V> {
        let dense_index = self.dense_index(index)?;
        Some(&mut self.dense[dense_index])
    }

    /// Removes and returns the value at `index` by swap-remove.
    pub fn remove(&mut self, index: I) -> Option<V> {
        let slot = index.sparse_set_index();
        let dense_index = self.sparse.get_mut(slot)?.take()? as usize;
        self.indices.swap_remove(dense_index);
        let value = self.dense.swap_remove(dense_index);
        if let Some(moved) = self.indices.get(dense_index) {
            self.sparse[moved.sparse_set_index()] = Some(dense_index as u32);
        }
        Some(value)
    }

    /// Values in dense order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.dense.iter()
    }

    /// Mutable values in dense order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.dense.iter_mut()
    }

    /// Indices in dense order.
    pub fn indices(&self) -> impl Iterator<Item = I> + '_ {
        self.indices.iter().copied()
    }

    /// `(index, value)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (&I, &V)> {
        self.indices.iter().zip(self.dense.iter())
    }

    /// `(index, &mut value)` pairs in dense order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut V)> {
        self.indices.iter().copied().zip(self.dense.iter_mut())
    }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Removes every value.
    pub fn clear(&mut self) {
        self.dense.clear();
        self.indices.clear();
        self.sparse.clear();
    }
}

/// Storage for one sparse-set component, keyed by entity index.
pub struct ComponentSparseSet {
    dense: Column,
    entities: Vec<Entity>,
    sparse: Vec<Option<u32>>,
}

impl ComponentSparseSet {
    pub(crate) fn new(info: &ComponentInfo) -> Self {
        Self { dense: Column::new(info.new_column()), entities: Vec::new(), sparse: Vec::new() }
    }

    #[inline]
    fn dense_index(&self, entity: Entity) -> Option<usize> {
        let dense_index = self.sparse.get(entity.index() as usize).copied().flatten()? as usize;
        (self.entities[dense_index] == entity).then_some(dense_index)
    }

    /// Number of entities holding this component.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity holds this component.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in dense order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Returns `true` if `entity` holds this component.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.dense_index(entity).is_some()
    }

    /// Inserts or overwrites the value for `entity`.
    pub(crate) fn insert(&mut self, entity: Entity, value: Box<dyn Any + Send>, change_tick: Tick) {
        if let Some(dense_index) = self.dense_index(entity) {
            self.dense.replace(dense_index, value, change_tick);
            return;
        }
        let slot = entity.index() as usize;
        if slot >= self.sparse.len() {
            self.sparse.resize(slot + 1, None);
        }
        self.sparse[slot] = Some(self.entities.len() as u32);
        self.entities.push(entity);
        self.dense.push(value, change_tick);
    }

    /// Typed shared access.
    pub fn get<T: 'static>(&self, entity: Entity) -> Option<&T> {
        self.dense.get(self.dense_index(entity)?)
    }

    /// Typed exclusive access with the value's ticks.
    pub(crate) fn get_with_ticks_mut<T: 'static>(
        &mut self,
        entity: Entity,
    ) -> Option<(&mut T, &Tick, &mut Tick)> {
        let dense_index = self.dense_index(entity)?;
        self.dense.get_with_ticks_mut(dense_index)
    }

    /// `(added, changed)` ticks of `entity`'s value.
    pub fn get_ticks(&self, entity: Entity) -> Option<(Tick, Tick)> {
        let dense_index = self.dense_index(entity)?;
        Some((self.dense.get_added_tick(dense_index)?, self.dense.get_changed_tick(dense_index)?))
    }

    /// Raw pointers to `entity`'s value and ticks, for query fetches.
    ///
    /// # Safety
    /// Writing through the returned pointers requires exclusive access to this
    /// component for the duration of the borrow.
    pub(crate) unsafe fn get_ptrs<T: 'static>(
        &self,
        entity: Entity,
    ) -> Option<(*mut T, *const Tick, *mut Tick)> {
        let dense_index = self.dense_index(entity)?;
        // SAFETY: forwarded to the caller.
        unsafe {
            let data = self.dense.data_ptr_mut::<T>()?;
            Some((
                data.add(dense_index),
                self.dense.added_ticks_ptr().add(dense_index),
                self.dense.changed_ticks_ptr_mut().add(dense_index),
            ))
        }
    }

    /// Removes and returns `entity`'s value.
    pub(crate) fn remove(&mut self, entity: Entity) -> Option<Box<dyn Any + Send>> {
        let dense_index = self.dense_index(entity)?;
        self.sparse[entity.index() as usize] = None;
        self.entities.swap_remove(dense_index);
        if let Some(moved) = self.entities.get(dense_index) {
            self.sparse[moved.index() as usize] = Some(dense_index as u32);
        }
        Some(self.dense.swap_remove_boxed(dense_index))
    }

    /// Removes and drops `entity`'s value. Returns `true` if it was present.
    pub(crate) fn remove_and_drop(&mut self, entity: Entity) -> bool {
        let Some(dense_index) = self.dense_index(entity) else {
            return false;
        };
        self.sparse[entity.index() as usize] = None;
        self.entities.swap_remove(dense_index);
        if let Some(moved) = self.entities.get(dense_index) {
            self.sparse[moved.index() as usize] = Some(dense_index as u32);
        }
        self.dense.swap_remove_and_drop(dense_index);
        true
    }

    pub(crate) fn check_change_ticks(&mut self, change_tick: Tick) {
        self.dense.check_change_ticks(change_tick);
    }
}

/// All sparse-set component storages of a world, keyed by component id.
#[derive(Default)]
pub struct SparseSets {
    sets: SparseSet<ComponentId, ComponentSparseSet>,
}

impl SparseSets {
    /// Storage for `component_id`, if created.
    #[inline]
    pub fn get(&self, component_id: ComponentId) -> Option<&ComponentSparseSet> {
        self.sets.get(component_id)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, component_id: ComponentId) -> Option<&mut ComponentSparseSet> {
        self.sets.get_mut(component_id)
    }

    pub(crate) fn get_or_insert(&mut self, info: &ComponentInfo) -> &mut ComponentSparseSet {
        self.sets.get_or_insert_with(info.id(), || ComponentSparseSet::new(info))
    }

    /// Number of sparse-set components with storage.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns `true` if no sparse-set storage exists.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub(crate) fn check_change_ticks(&mut self, change_tick: Tick) {
        for set in self.sets.values_mut() {
            set.check_change_ticks(change_tick);
        }
    }
}
