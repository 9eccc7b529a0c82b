//! Iterator over the items of a [`QueryState`](crate::engine::query::QueryState).

use std::slice;

use crate::engine::archetype::{ArchetypeEntity, Archetypes};
use crate::engine::change::Tick;
use crate::engine::entity::Entity;
use crate::engine::query::{QueryData, QueryFilter, WorldQuery};
use crate::engine::table::Tables;
use crate::engine::types::{ArchetypeId, TableId, TableRow};
use crate::engine::world::UnsafeWorldCell;


/// Iterator over query items.
///
/// Dense queries walk matched tables row by row. Other queries walk matched
/// archetypes and read each entity's table row from the archetype. Empty
/// tables and archetypes are skipped without touching the fetches.
pub struct QueryIter<'w, 's, D: QueryData, F: QueryFilter> {
    tables: &'w Tables,
    archetypes: &'w Archetypes,
    fetch_state: &'s D::State,
    filter_state: &'s F::State,
    table_ids: slice::Iter<'s, TableId>,
    archetype_ids: slice::Iter<'s, ArchetypeId>,
    is_dense: bool,
    fetch: D::Fetch<'w>,
    filter: F::Fetch<'w>,
    table_entities: &'w [Entity],
    archetype_entities: &'w [ArchetypeEntity],
    current_len: usize,
    current_row: usize,
}

impl<'w, 's, D: QueryData, F: QueryFilter> QueryIter<'w, 's, D, F> {
    /// # Safety
    /// The caller must hold the access `D` and `F` report, and every id must
    /// come from a query state built on `world`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) unsafe fn new(
        world: UnsafeWorldCell<'w>,
        fetch_state: &'s D::State,
        filter_state: &'s F::State,
        table_ids: &'s [TableId],
        archetype_ids: &'s [ArchetypeId],
        is_dense: bool,
        last_run: Tick,
        this_run: Tick,
    ) -> Self {
        // SAFETY: forwarded to the caller.
        let (fetch, filter) = unsafe {
            (
                D::init_fetch(world, fetch_state, last_run, this_run),
                F::init_fetch(world, filter_state, last_run, this_run),
            )
        };
        Self {
            // SAFETY: only the table arena is read here; column access goes through the fetches.
            tables: &unsafe { world.storages() }.tables,
            archetypes: world.archetypes(),
            fetch_state,
            filter_state,
            table_ids: table_ids.iter(),
            archetype_ids: archetype_ids.iter(),
            is_dense,
            fetch,
            filter,
            table_entities: &[],
            archetype_entities: &[],
            current_len: 0,
            current_row: 0,
        }
    }

    /// Moves the cursor to the next non-empty table or archetype.
    /// Returns `false` when none is left.
    #[inline]
    fn advance_storage(&mut self) -> bool {
        loop {
            if self.is_dense {
                let Some(&table_id) = self.table_ids.next() else {
                    return false;
                };
                let table = &self.tables[table_id];
                if table.is_empty() {
                    continue;
                }
                // SAFETY: the table was matched by the owning query state.
                unsafe {
                    D::set_table(&mut self.fetch, self.fetch_state, table);
                    F::set_table(&mut self.filter, self.filter_state, table);
                }
                self.table_entities = table.entities();
                self.current_len = table.entity_count();
            } else {
                let Some(&archetype_id) = self.archetype_ids.next() else {
                    return false;
                };
                let archetype = &self.archetypes[archetype_id];
                if archetype.is_empty() {
                    continue;
                }
                let table = &self.tables[archetype.table_id()];
                // SAFETY: the archetype was matched and `table` backs it.
                unsafe {
                    D::set_archetype(&mut self.fetch, self.fetch_state, archetype, table);
                    F::set_archetype(&mut self.filter, self.filter_state, archetype, table);
                }
                self.archetype_entities = archetype.entities();
                self.current_len = archetype.len();
            }
            self.current_row = 0;
            return true;
        }
    }
}

impl<'w, 's, D: QueryData, F: QueryFilter> Iterator for QueryIter<'w, 's, D, F> {
    type Item = <D as WorldQuery>::Item<'w>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_row == self.current_len && !self.advance_storage() {
                return None;
            }
            let row = self.current_row;
            self.current_row += 1;

            let (entity, table_row) = if self.is_dense {
                (self.table_entities[row], TableRow::new(row))
            } else {
                let archetype_entity = self.archetype_entities[row];
                (archetype_entity.id(), archetype_entity.table_row())
            };

            // SAFETY: the fetches point at the storage holding `entity`, and
            // each row is yielded at most once.
            unsafe {
                if !F::IS_ARCHETYPAL && !F::filter_fetch(&mut self.filter, entity, table_row) {
                    continue;
                }
                return Some(D::fetch(&mut self.fetch, entity, table_row));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining_here = self.current_len - self.current_row;
        let upper = if self.is_dense {
            self.table_ids.clone().map(|&id| self.tables[id].entity_count()).sum::<usize>()
        } else {
            self.archetype_ids.clone().map(|&id| self.archetypes[id].len()).sum::<usize>()
        };
        let lower = if F::IS_ARCHETYPAL { remaining_here + upper } else { 0 };
        (lower, Some(remaining_here + upper))
    }
}
