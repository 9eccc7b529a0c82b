//! Query filter primitives.
//!
//! [`With`] and [`Without`] are *archetypal*: archetype matching alone
//! decides them, so iteration never evaluates them per entity. [`Added`]
//! and [`Changed`] compare a component's ticks against the observer's last
//! run and are evaluated per entity. [`Or`] combines filters of either kind.

use std::marker::PhantomData;
use std::ptr;

use crate::engine::access::FilteredAccess;
use crate::engine::archetype::Archetype;
use crate::engine::change::Tick;
use crate::engine::component::{Component, StorageType};
use crate::engine::entity::Entity;
use crate::engine::query::{QueryFilter, WorldQuery};
use crate::engine::sparse_set::ComponentSparseSet;
use crate::engine::table::Table;
use crate::engine::types::{ComponentId, TableRow};
use crate::engine::world::{UnsafeWorldCell, World};


/// Matches entities that have component `T`. Does not fetch it.
pub struct With<T>(PhantomData<T>);

/// Matches entities that lack component `T`.
pub struct Without<T>(PhantomData<T>);

macro_rules! impl_archetypal_filter {
    ($name:ident, $matches:expr, $restrict:ident) => {
        // SAFETY: accesses no component data.
        unsafe impl<T: Component> WorldQuery for $name<T> {
            type Item<'w> = ();
            type Fetch<'w> = ();
            type State = ComponentId;

            const IS_DENSE: bool = matches!(T::STORAGE_TYPE, StorageType::Table);

            #[inline]
            unsafe fn init_fetch<'w>(_: UnsafeWorldCell<'w>, _: &ComponentId, _: Tick, _: Tick) {}

            #[inline]
            unsafe fn set_archetype<'w>(_: &mut (), _: &ComponentId, _: &'w Archetype, _: &'w Table) {}

            #[inline]
            unsafe fn set_table<'w>(_: &mut (), _: &ComponentId, _: &'w Table) {}

            #[inline(always)]
            unsafe fn fetch<'w>(_: &mut Self::Fetch<'w>, _: Entity, _: TableRow) -> Self::Item<'w> {}

            fn update_component_access(&id: &ComponentId, access: &mut FilteredAccess) {
                access.access_mut().add_archetypal(id);
                access.$restrict(id);
            }

            fn init_state(world: &mut World) -> ComponentId {
                world.init_component::<T>()
            }

            fn matches_component_set(
                &id: &ComponentId,
                set_contains_id: &impl Fn(ComponentId) -> bool,
            ) -> bool {
                let matches: fn(bool) -> bool = $matches;
                matches(set_contains_id(id))
            }
        }

        // SAFETY: archetype matching decides the filter.
        unsafe impl<T: Component> QueryFilter for $name<T> {
            const IS_ARCHETYPAL: bool = true;

            #[inline(always)]
            unsafe fn filter_fetch(_: &mut (), _: Entity, _: TableRow) -> bool {
                true
            }
        }
    };
}

impl_archetypal_filter!(With, |contains| contains, and_with);
impl_archetypal_filter!(Without, |contains| !contains, and_without);

// ─── Added / Changed ─────────────────────────────────────────────────────────

/// Matches entities whose `T` was added since the observer last ran.
///
/// An entity spawned with `T` counts as added.
pub struct Added<T>(PhantomData<T>);

/// Matches entities whose `T` was added or mutably dereferenced since the
/// observer last ran.
pub struct Changed<T>(PhantomData<T>);

/// Fetch shared by [`Added`] and [`Changed`]: points at one tick column.
pub struct TickFilterFetch<'w> {
    table_ticks: *const Tick,
    sparse_set: Option<&'w ComponentSparseSet>,
    last_run: Tick,
    this_run: Tick,
}

impl Clone for TickFilterFetch<'_> {
    fn clone(&self) -> Self {
        Self {
            table_ticks: self.table_ticks,
            sparse_set: self.sparse_set,
            last_run: self.last_run,
            this_run: self.this_run,
        }
    }
}

macro_rules! impl_tick_filter {
    ($name:ident, $ticks_ptr:ident, $pick:expr) => {
        // SAFETY: reports a read of `T` and reads only its ticks.
        unsafe impl<T: Component> WorldQuery for $name<T> {
            type Item<'w> = bool;
            type Fetch<'w> = TickFilterFetch<'w>;
            type State = ComponentId;

            const IS_DENSE: bool = matches!(T::STORAGE_TYPE, StorageType::Table);

            #[inline]
            unsafe fn init_fetch<'w>(
                world: UnsafeWorldCell<'w>,
                &id: &ComponentId,
                last_run: Tick,
                this_run: Tick,
            ) -> TickFilterFetch<'w> {
                let sparse_set = match T::STORAGE_TYPE {
                    StorageType::Table => None,
                    // SAFETY: the query holds read access to `T`.
                    StorageType::SparseSet => unsafe { world.storages() }.sparse_sets.get(id),
                };
                TickFilterFetch { table_ticks: ptr::null(), sparse_set, last_run, this_run }
            }

            #[inline]
            unsafe fn set_archetype<'w>(
                fetch: &mut TickFilterFetch<'w>,
                id: &ComponentId,
                _archetype: &'w Archetype,
                table: &'w Table,
            ) {
                if Self::IS_DENSE {
                    // SAFETY: forwarded to the caller.
                    unsafe { Self::set_table(fetch, id, table) };
                }
            }

            #[inline]
            unsafe fn set_table<'w>(fetch: &mut TickFilterFetch<'w>, &id: &ComponentId, table: &'w Table) {
                fetch.table_ticks = table
                    .get_column(id)
                    .map_or(ptr::null(), |column| column.$ticks_ptr());
            }

            #[inline(always)]
            unsafe fn fetch<'w>(fetch: &mut Self::Fetch<'w>, entity: Entity, table_row: TableRow) -> Self::Item<'w> {
                let tick = match T::STORAGE_TYPE {
                    // SAFETY: the table was matched, so `table_row` is in bounds.
                    StorageType::Table => unsafe { *fetch.table_ticks.add(table_row.index()) },
                    StorageType::SparseSet => {
                        let pick: fn((Tick, Tick)) -> Tick = $pick;
                        match fetch.sparse_set.and_then(|set| set.get_ticks(entity)) {
                            Some(ticks) => pick(ticks),
                            None => return false,
                        }
                    }
                };
                tick.is_newer_than(fetch.last_run, fetch.this_run)
            }

            fn update_component_access(&id: &ComponentId, access: &mut FilteredAccess) {
                assert!(
                    !access.access().has_write(id),
                    "{}<{}> conflicts with a previous access in this query. Shared access cannot coincide with exclusive access.",
                    stringify!($name),
                    std::any::type_name::<T>(),
                );
                access.add_read(id);
            }

            fn init_state(world: &mut World) -> ComponentId {
                world.init_component::<T>()
            }

            fn matches_component_set(
                &id: &ComponentId,
                set_contains_id: &impl Fn(ComponentId) -> bool,
            ) -> bool {
                set_contains_id(id)
            }
        }

        // SAFETY: evaluated per entity.
        unsafe impl<T: Component> QueryFilter for $name<T> {
            const IS_ARCHETYPAL: bool = false;

            #[inline(always)]
            unsafe fn filter_fetch(fetch: &mut TickFilterFetch<'_>, entity: Entity, table_row: TableRow) -> bool {
                // SAFETY: forwarded to the caller.
                unsafe { Self::fetch(fetch, entity, table_row) }
            }
        }
    };
}

impl_tick_filter!(Added, added_ticks_ptr, |(added, _)| added);
impl_tick_filter!(Changed, changed_ticks_ptr, |(_, changed)| changed);

// ─── Or ──────────────────────────────────────────────────────────────────────

/// Matches entities that pass at least one of the inner filters.
///
/// ```ignore
/// world.query_filtered::<Entity, Or<(With<Player>, Changed<Health>)>>();
/// ```
pub struct Or<T>(PhantomData<T>);

/// Fetch of one [`Or`] branch; `matches` is `false` when the current
/// archetype cannot satisfy the branch.
pub struct OrFetch<'w, T: WorldQuery> {
    fetch: T::Fetch<'w>,
    matches: bool,
}

impl<T: WorldQuery> Clone for OrFetch<'_, T> {
    fn clone(&self) -> Self {
        Self { fetch: self.fetch.clone(), matches: self.matches }
    }
}

macro_rules! impl_or_query_filter {
    ($(($filter:ident, $state:ident)),*) => {
        #[allow(non_snake_case, clippy::unused_unit)]
        // SAFETY: every branch's access is reported.
        unsafe impl<$($filter: QueryFilter),*> WorldQuery for Or<($($filter,)*)> {
            type Item<'w> = bool;
            type Fetch<'w> = ($(OrFetch<'w, $filter>,)*);
            type State = ($($filter::State,)*);

            const IS_DENSE: bool = true $(&& $filter::IS_DENSE)*;

            #[inline]
            unsafe fn init_fetch<'w>(
                world: UnsafeWorldCell<'w>,
                state: &Self::State,
                last_run: Tick,
                this_run: Tick,
            ) -> Self::Fetch<'w> {
                let ($($state,)*) = state;
                ($(OrFetch {
                    // SAFETY: forwarded to the caller.
                    fetch: unsafe { $filter::init_fetch(world, $state, last_run, this_run) },
                    matches: false,
                },)*)
            }

            #[inline]
            unsafe fn set_archetype<'w>(
                fetch: &mut Self::Fetch<'w>,
                state: &Self::State,
                archetype: &'w Archetype,
                table: &'w Table,
            ) {
                let ($($filter,)*) = fetch;
                let ($($state,)*) = state;
                $(
                    $filter.matches = $filter::matches_component_set($state, &|id| archetype.contains(id));
                    if $filter.matches {
                        // SAFETY: forwarded to the caller.
                        unsafe { $filter::set_archetype(&mut $filter.fetch, $state, archetype, table) };
                    }
                )*
            }

            #[inline]
            unsafe fn set_table<'w>(fetch: &mut Self::Fetch<'w>, state: &Self::State, table: &'w Table) {
                let ($($filter,)*) = fetch;
                let ($($state,)*) = state;
                $(
                    $filter.matches = $filter::matches_component_set($state, &|id| table.has_column(id));
                    if $filter.matches {
                        // SAFETY: forwarded to the caller.
                        unsafe { $filter::set_table(&mut $filter.fetch, $state, table) };
                    }
                )*
            }

            #[inline(always)]
            unsafe fn fetch<'w>(fetch: &mut Self::Fetch<'w>, entity: Entity, table_row: TableRow) -> Self::Item<'w> {
                let ($($filter,)*) = fetch;
                // SAFETY: forwarded to the caller.
                false $(|| ($filter.matches && unsafe { $filter::filter_fetch(&mut $filter.fetch, entity, table_row) }))*
            }

            fn update_component_access(state: &Self::State, access: &mut FilteredAccess) {
                let ($($state,)*) = state;
                let mut new_access = FilteredAccess::matches_nothing();
                $(
                    // Each branch starts from the accesses before the `Or`.
                    let mut intermediate = access.clone();
                    $filter::update_component_access($state, &mut intermediate);
                    new_access.append_or(&intermediate);
                    new_access.extend_access(&intermediate);
                )*
                *new_access.required_mut() = std::mem::take(access.required_mut());
                *access = new_access;
            }

            fn init_state(world: &mut World) -> Self::State {
                ($($filter::init_state(world),)*)
            }

            fn matches_component_set(
                state: &Self::State,
                set_contains_id: &impl Fn(ComponentId) -> bool,
            ) -> bool {
                let ($($state,)*) = state;
                false $(|| $filter::matches_component_set($state, set_contains_id))*
            }
        }

        // SAFETY: archetypal only if every branch is.
        unsafe impl<$($filter: QueryFilter),*> QueryFilter for Or<($($filter,)*)> {
            const IS_ARCHETYPAL: bool = true $(&& $filter::IS_ARCHETYPAL)*;

            #[inline(always)]
            unsafe fn filter_fetch(fetch: &mut Self::Fetch<'_>, entity: Entity, table_row: TableRow) -> bool {
                // SAFETY: forwarded to the caller.
                unsafe { Self::fetch(fetch, entity, table_row) }
            }
        }
    };
}

impl_or_query_filter!((F0, s0));
impl_or_query_filter!((F0, s0), (F1, s1));
impl_or_query_filter!((F0, s0), (F1, s1), (F2, s2));
impl_or_query_filter!((F0, s0), (F1, s1), (F2, s2), (F3, s3));
impl_or_query_filter!((F0, s0), (F1, s1), (F2, s2), (F3, s3), (F4, s4));
impl_or_query_filter!((F0, s0), (F1, s1), (F2, s2), (F3, s3), (F4, s4), (F5, s5));
impl_or_query_filter!((F0, s0), (F1, s1), (F2, s2), (F3, s3), (F4, s4), (F5, s5), (F6, s6));
impl_or_query_filter!(
    (F0, s0), (F1, s1), (F2, s2), (F3, s3), (F4, s4), (F5, s5), (F6, s6), (F7, s7)
);
