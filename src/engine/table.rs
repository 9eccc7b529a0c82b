//! # Tables
//!
//! Dense columnar storage for entities sharing an identical set of
//! table-stored components.
//!
//! ## Purpose
//! A [`Table`] owns one [`Column`] per table component plus an entity column.
//! Row `r` of every column belongs to `entities[r]`. Several archetypes may
//! share a table when they differ only in sparse-set components.
//!
//! ## Design
//! - Rows are appended at the end and removed by swap-remove.
//! - Capacity follows [`table_capacity`]: it doubles starting at
//!   [`MIN_TABLE_CAPACITY`](crate::engine::types::MIN_TABLE_CAPACITY) and
//!   never shrinks.
//! - Moves between tables transfer the shared columns value by value and hand
//!   back whatever the destination cannot hold.
//!
//! ## Invariants
//! - Every column has exactly `entities.len()` rows after any public
//!   operation completes.
//! - `columns` never contains a sparse-set component.
//! - After a swap-remove the caller must update the location of the entity
//!   returned as moved; tables do not know about entity locations.

use std::any::Any;
use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use crate::engine::change::Tick;
use crate::engine::component::Components;
use crate::engine::entity::Entity;
use crate::engine::sparse_set::SparseSet;
use crate::engine::storage::Column;
use crate::engine::types::{table_capacity, ComponentId, TableId, TableRow};


/// Outcome of moving a row out of a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableMoveResult {
    /// Row of the entity in the destination table.
    pub new_row: TableRow,
    /// Entity that was moved into the vacated source row, if any.
    pub swapped_entity: Option<Entity>,
}

/// Columnar storage for one table-component set.
pub struct Table {
    columns: SparseSet<ComponentId, Column>,
    entities: Vec<Entity>,
    capacity: usize,
}

impl Table {
    fn new(component_ids: &[ComponentId], components: &Components) -> Self {
        let mut columns = SparseSet::new();
        for &id in component_ids {
            if let Some(info) = components.get_info(id) {
                columns.insert(id, Column::new(info.new_column()));
            }
        }
        Self { columns, entities: Vec::new(), capacity: 0 }
    }

    /// Number of rows.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Current row capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entities by row.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Component ids stored in this table, in column order.
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.columns.indices()
    }

    /// Returns `true` if the table stores `component_id`.
    #[inline]
    pub fn has_column(&self, component_id: ComponentId) -> bool {
        self.columns.contains(component_id)
    }

    /// Column for `component_id`.
    #[inline]
    pub fn get_column(&self, component_id: ComponentId) -> Option<&Column> {
        self.columns.get(component_id)
    }

    #[inline]
    pub(crate) fn get_column_mut(&mut self, component_id: ComponentId) -> Option<&mut Column> {
        self.columns.get_mut(component_id)
    }

    /// Typed value of `component_id` at `row`.
    pub fn get_component<T: 'static>(&self, component_id: ComponentId, row: TableRow) -> Option<&T> {
        self.columns.get(component_id)?.get::<T>(row.index())
    }

    fn reserve_for_push(&mut self) {
        let len = self.entities.len();
        if len < self.capacity {
            return;
        }
        let new_capacity = table_capacity(len);
        let additional = new_capacity - len;
        self.entities.reserve_exact(additional);
        for column in self.columns.values_mut() {
            column.reserve_exact(additional);
        }
        self.capacity = new_capacity;
    }

    /// Appends a row for `entity`, growing capacity when full.
    ///
    /// Only the entity column is written. The caller must push exactly one
    /// value into every column before the table is observed again.
    pub(crate) fn allocate(&mut self, entity: Entity) -> TableRow {
        self.reserve_for_push();
        let row = TableRow::new(self.entities.len());
        self.entities.push(entity);
        row
    }

    /// Writes the value of `component_id` for a freshly allocated row.
    pub(crate) fn push_component(
        &mut self,
        component_id: ComponentId,
        value: Box<dyn Any + Send>,
        tick: Tick,
    ) {
        if let Some(column) = self.columns.get_mut(component_id) {
            column.push(value, tick);
        }
    }

    /// Overwrites the value of `component_id` at `row`.
    pub(crate) fn replace_component(
        &mut self,
        component_id: ComponentId,
        row: TableRow,
        value: Box<dyn Any + Send>,
        tick: Tick,
    ) {
        if let Some(column) = self.columns.get_mut(component_id) {
            column.replace(row.index(), value, tick);
        }
    }

    /// Removes `row` and drops its values.
    ///
    /// Returns the entity that moved into `row`, if any.
    pub(crate) fn swap_remove(&mut self, row: TableRow) -> Option<Entity> {
        let row = row.index();
        for column in self.columns.values_mut() {
            column.swap_remove_and_drop(row);
        }
        self.entities.swap_remove(row);
        self.entities.get(row).copied()
    }

    /// Moves `row` into `destination`, whose columns are a superset of ours.
    ///
    /// Shared columns are transferred with their ticks. The caller must push
    /// values for the destination's extra columns.
    pub(crate) fn move_to_superset_unchecked(
        &mut self,
        row: TableRow,
        destination: &mut Table,
    ) -> TableMoveResult {
        let entity = self.entities[row.index()];
        let new_row = destination.allocate(entity);
        for (id, column) in self.columns.iter_mut() {
            if let Some(target) = destination.columns.get_mut(id) {
                column.swap_remove_into(row.index(), target);
            }
        }
        self.entities.swap_remove(row.index());
        TableMoveResult { new_row, swapped_entity: self.entities.get(row.index()).copied() }
    }

    /// Moves `row` into `destination`, whose columns are a subset of ours.
    ///
    /// Values of columns the destination lacks are returned to the caller.
    pub(crate) fn move_to_subset_unchecked(
        &mut self,
        row: TableRow,
        destination: &mut Table,
    ) -> (TableMoveResult, Vec<(ComponentId, Box<dyn Any + Send>)>) {
        let entity = self.entities[row.index()];
        let new_row = destination.allocate(entity);
        let mut leftovers = Vec::new();
        for (id, column) in self.columns.iter_mut() {
            match destination.columns.get_mut(id) {
                Some(target) => column.swap_remove_into(row.index(), target),
                None => leftovers.push((id, column.swap_remove_boxed(row.index()))),
            }
        }
        self.entities.swap_remove(row.index());
        let result =
            TableMoveResult { new_row, swapped_entity: self.entities.get(row.index()).copied() };
        (result, leftovers)
    }

    pub(crate) fn check_change_ticks(&mut self, change_tick: Tick) {
        for column in self.columns.values_mut() {
            column.check_change_ticks(change_tick);
        }
    }
}

/// Arena of all tables in a world.
pub struct Tables {
    tables: Vec<Table>,
    table_ids: HashMap<Vec<ComponentId>, TableId>,
}

impl Default for Tables {
    fn default() -> Self {
        let empty = Table { columns: SparseSet::new(), entities: Vec::new(), capacity: 0 };
        let mut table_ids = HashMap::new();
        table_ids.insert(Vec::new(), TableId::EMPTY);
        Self { tables: vec![empty], table_ids }
    }
}

impl Tables {
    /// Number of tables, including the empty table.
    #[inline]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Always `false`: the empty table exists from the start.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Table `id`.
    #[inline]
    pub fn get(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id.index())
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.get_mut(id.index())
    }

    /// Returns two distinct tables mutably.
    ///
    /// ## Panics
    /// Panics if `a == b`.
    pub(crate) fn get_2_mut(&mut self, a: TableId, b: TableId) -> (&mut Table, &mut Table) {
        assert_ne!(a, b, "cannot borrow the same table twice");
        if a.index() < b.index() {
            let (left, right) = self.tables.split_at_mut(b.index());
            (&mut left[a.index()], &mut right[0])
        } else {
            let (left, right) = self.tables.split_at_mut(a.index());
            (&mut right[0], &mut left[b.index()])
        }
    }

    /// Id of the table storing exactly `component_ids`, creating it if needed.
    ///
    /// `component_ids` must be sorted and contain only table components.
    pub(crate) fn get_id_or_insert(
        &mut self,
        component_ids: &[ComponentId],
        components: &Components,
    ) -> TableId {
        if let Some(&id) = self.table_ids.get(component_ids) {
            return id;
        }
        let id = TableId::new(self.tables.len());
        self.tables.push(Table::new(component_ids, components));
        self.table_ids.insert(component_ids.to_vec(), id);
        tracing::trace!(table = id.index(), columns = component_ids.len(), "created table");
        id
    }

    /// Iterates over all tables.
    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub(crate) fn check_change_ticks(&mut self, change_tick: Tick) {
        for table in &mut self.tables {
            table.check_change_ticks(change_tick);
        }
    }
}

impl Index<TableId> for Tables {
    type Output = Table;

    #[inline]
    fn index(&self, id: TableId) -> &Table {
        &self.tables[id.index()]
    }
}

impl IndexMut<TableId> for Tables {
    #[inline]
    fn index_mut(&mut self, id: TableId) -> &mut Table {
        &mut self.tables[id.index()]
    }
}
