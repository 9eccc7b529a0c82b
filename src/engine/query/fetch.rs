//! Query data primitives: [`Entity`], `&T`, `&mut T` and `Option<Q>`.
//!
//! Table-stored components are fetched through raw column pointers set once
//! per table; sparse-set components are looked up per entity.

use std::marker::PhantomData;
use std::ptr;

use crate::engine::access::FilteredAccess;
use crate::engine::archetype::Archetype;
use crate::engine::change::{Mut, Tick};
use crate::engine::component::{Component, StorageType};
use crate::engine::entity::Entity;
use crate::engine::query::{QueryData, ReadOnlyQueryData, WorldQuery};
use crate::engine::sparse_set::ComponentSparseSet;
use crate::engine::table::Table;
use crate::engine::types::{ComponentId, TableRow};
use crate::engine::world::{UnsafeWorldCell, World};


fn sparse_set_for<'w, T: Component>(
    world: UnsafeWorldCell<'w>,
    component_id: ComponentId,
) -> Option<&'w ComponentSparseSet> {
    match T::STORAGE_TYPE {
        StorageType::Table => None,
        // SAFETY: only the sparse-set map is read; the caller holds access to `T`.
        StorageType::SparseSet => unsafe { world.storages() }.sparse_sets.get(component_id),
    }
}

// ─── Entity ──────────────────────────────────────────────────────────────────

// SAFETY: reads no component.
unsafe impl WorldQuery for Entity {
    type Item<'w> = Entity;
    type Fetch<'w> = ();
    type State = ();

    const IS_DENSE: bool = true;

    #[inline]
    unsafe fn init_fetch<'w>(_: UnsafeWorldCell<'w>, _: &(), _: Tick, _: Tick) {}

    #[inline]
    unsafe fn set_archetype<'w>(_: &mut (), _: &(), _: &'w Archetype, _: &'w Table) {}

    #[inline]
    unsafe fn set_table<'w>(_: &mut (), _: &(), _: &'w Table) {}

    #[inline(always)]
    unsafe fn fetch<'w>(_: &mut Self::Fetch<'w>, entity: Entity, _: TableRow) -> Self::Item<'w> {
        entity
    }

    fn update_component_access(_: &(), _: &mut FilteredAccess) {}

    fn init_state(_: &mut World) {}

    fn matches_component_set(_: &(), _: &impl Fn(ComponentId) -> bool) -> bool {
        true
    }
}

// SAFETY: read-only.
unsafe impl QueryData for Entity {
    type ReadOnly = Self;
}

// SAFETY: read-only.
unsafe impl ReadOnlyQueryData for Entity {}

// ─── &T ──────────────────────────────────────────────────────────────────────

/// Fetch of a shared component reference.
pub struct ReadFetch<'w, T> {
    table_components: *const T,
    sparse_set: Option<&'w ComponentSparseSet>,
    _marker: PhantomData<&'w T>,
}

impl<T> Clone for ReadFetch<'_, T> {
    fn clone(&self) -> Self {
        Self { table_components: self.table_components, sparse_set: self.sparse_set, _marker: PhantomData }
    }
}

// SAFETY: reports a read of `T` and only reads `T`.
unsafe impl<T: Component> WorldQuery for &T {
    type Item<'w> = &'w T;
    type Fetch<'w> = ReadFetch<'w, T>;
    type State = ComponentId;

    const IS_DENSE: bool = matches!(T::STORAGE_TYPE, StorageType::Table);

    #[inline]
    unsafe fn init_fetch<'w>(
        world: UnsafeWorldCell<'w>,
        &component_id: &ComponentId,
        _last_run: Tick,
        _this_run: Tick,
    ) -> ReadFetch<'w, T> {
        ReadFetch {
            table_components: ptr::null(),
            sparse_set: sparse_set_for::<T>(world, component_id),
            _marker: PhantomData,
        }
    }

    #[inline]
    unsafe fn set_archetype<'w>(
        fetch: &mut ReadFetch<'w, T>,
        component_id: &ComponentId,
        _archetype: &'w Archetype,
        table: &'w Table,
    ) {
        if Self::IS_DENSE {
            // SAFETY: forwarded to the caller.
            unsafe { Self::set_table(fetch, component_id, table) };
        }
    }

    #[inline]
    unsafe fn set_table<'w>(fetch: &mut ReadFetch<'w, T>, &component_id: &ComponentId, table: &'w Table) {
        fetch.table_components = table
            .get_column(component_id)
            .and_then(|column| column.data_ptr::<T>())
            .unwrap_or(ptr::null());
    }

    #[inline(always)]
    unsafe fn fetch<'w>(fetch: &mut Self::Fetch<'w>, entity: Entity, table_row: TableRow) -> Self::Item<'w> {
        match T::STORAGE_TYPE {
            StorageType::Table => {
                debug_assert!(!fetch.table_components.is_null());
                // SAFETY: the table was matched, so the column exists and `table_row` is in bounds.
                unsafe { &*fetch.table_components.add(table_row.index()) }
            }
            StorageType::SparseSet => {
                // SAFETY: the archetype was matched, so the set holds `entity`.
                let value = fetch.sparse_set.and_then(|set| set.get::<T>(entity));
                unsafe { value.unwrap_unchecked() }
            }
        }
    }

    fn update_component_access(&component_id: &ComponentId, access: &mut FilteredAccess) {
        assert!(
            !access.access().has_write(component_id),
            "&{} conflicts with a previous access in this query. Shared access cannot coincide with exclusive access.",
            std::any::type_name::<T>(),
        );
        access.add_read(component_id);
    }

    fn init_state(world: &mut World) -> ComponentId {
        world.init_component::<T>()
    }

    fn matches_component_set(
        &component_id: &ComponentId,
        set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        set_contains_id(component_id)
    }
}

// SAFETY: read-only.
unsafe impl<T: Component> QueryData for &T {
    type ReadOnly = Self;
}

// SAFETY: read-only.
unsafe impl<T: Component> ReadOnlyQueryData for &T {}

// ─── &mut T ──────────────────────────────────────────────────────────────────

/// Fetch of a change-tracked exclusive component reference.
pub struct WriteFetch<'w, T> {
    table_components: *mut T,
    added_ticks: *const Tick,
    changed_ticks: *mut Tick,
    sparse_set: Option<&'w ComponentSparseSet>,
    last_run: Tick,
    this_run: Tick,
    _marker: PhantomData<&'w mut T>,
}

impl<T> Clone for WriteFetch<'_, T> {
    fn clone(&self) -> Self {
        Self {
            table_components: self.table_components,
            added_ticks: self.added_ticks,
            changed_ticks: self.changed_ticks,
            sparse_set: self.sparse_set,
            last_run: self.last_run,
            this_run: self.this_run,
            _marker: PhantomData,
        }
    }
}

// SAFETY: reports a write of `T` and only touches `T` and its ticks.
unsafe impl<'__w, T: Component> WorldQuery for &'__w mut T {
    type Item<'w> = Mut<'w, T>;
    type Fetch<'w> = WriteFetch<'w, T>;
    type State = ComponentId;

    const IS_DENSE: bool = matches!(T::STORAGE_TYPE, StorageType::Table);

    #[inline]
    unsafe fn init_fetch<'w>(
        world: UnsafeWorldCell<'w>,
        &component_id: &ComponentId,
        last_run: Tick,
        this_run: Tick,
    ) -> WriteFetch<'w, T> {
        WriteFetch {
            table_components: ptr::null_mut(),
            added_ticks: ptr::null(),
            changed_ticks: ptr::null_mut(),
            sparse_set: sparse_set_for::<T>(world, component_id),
            last_run,
            this_run,
            _marker: PhantomData,
        }
    }

    #[inline]
    unsafe fn set_archetype<'w>(
        fetch: &mut WriteFetch<'w, T>,
        component_id: &ComponentId,
        _archetype: &'w Archetype,
        table: &'w Table,
    ) {
        if Self::IS_DENSE {
            // SAFETY: forwarded to the caller.
            unsafe { Self::set_table(fetch, component_id, table) };
        }
    }

    #[inline]
    unsafe fn set_table<'w>(fetch: &mut WriteFetch<'w, T>, &component_id: &ComponentId, table: &'w Table) {
        let Some(column) = table.get_column(component_id) else {
            return;
        };
        // SAFETY: the query holds exclusive access to `T`.
        unsafe {
            fetch.table_components = column.data_ptr_mut::<T>().unwrap_or(ptr::null_mut());
            fetch.changed_ticks = column.changed_ticks_ptr_mut();
        }
        fetch.added_ticks = column.added_ticks_ptr();
    }

    #[inline(always)]
    unsafe fn fetch<'w>(fetch: &mut Self::Fetch<'w>, entity: Entity, table_row: TableRow) -> Self::Item<'w> {
        match T::STORAGE_TYPE {
            StorageType::Table => {
                debug_assert!(!fetch.table_components.is_null());
                let row = table_row.index();
                // SAFETY: the table was matched, `row` is in bounds and each row
                // is handed out at most once per iteration.
                unsafe {
                    Mut::new(
                        &mut *fetch.table_components.add(row),
                        &*fetch.added_ticks.add(row),
                        &mut *fetch.changed_ticks.add(row),
                        fetch.last_run,
                        fetch.this_run,
                    )
                }
            }
            StorageType::SparseSet => {
                // SAFETY: the archetype was matched, so the set holds `entity`,
                // and the query holds exclusive access to `T`.
                unsafe {
                    let pointers = fetch.sparse_set.and_then(|set| set.get_ptrs::<T>(entity));
                    let (value, added, changed) = pointers.unwrap_unchecked();
                    Mut::new(&mut *value, &*added, &mut *changed, fetch.last_run, fetch.this_run)
                }
            }
        }
    }

    fn update_component_access(&component_id: &ComponentId, access: &mut FilteredAccess) {
        assert!(
            !access.access().has_read(component_id),
            "&mut {} conflicts with a previous access in this query. Mutable component access must be unique.",
            std::any::type_name::<T>(),
        );
        access.add_write(component_id);
    }

    fn init_state(world: &mut World) -> ComponentId {
        world.init_component::<T>()
    }

    fn matches_component_set(
        &component_id: &ComponentId,
        set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        set_contains_id(component_id)
    }
}

// SAFETY: `&T` reads exactly the component `&mut T` writes.
unsafe impl<'__w, T: Component> QueryData for &'__w mut T {
    type ReadOnly = &'__w T;
}

// ─── Option<Q> ───────────────────────────────────────────────────────────────

/// Fetch of an optional query: `matches` records whether the current
/// archetype or table satisfies the inner query.
pub struct OptionFetch<'w, Q: WorldQuery> {
    fetch: Q::Fetch<'w>,
    matches: bool,
}

impl<Q: WorldQuery> Clone for OptionFetch<'_, Q> {
    fn clone(&self) -> Self {
        Self { fetch: self.fetch.clone(), matches: self.matches }
    }
}

// SAFETY: reports the inner query's access without making it required.
unsafe impl<Q: WorldQuery> WorldQuery for Option<Q> {
    type Item<'w> = Option<Q::Item<'w>>;
    type Fetch<'w> = OptionFetch<'w, Q>;
    type State = Q::State;

    const IS_DENSE: bool = Q::IS_DENSE;

    #[inline]
    unsafe fn init_fetch<'w>(
        world: UnsafeWorldCell<'w>,
        state: &Q::State,
        last_run: Tick,
        this_run: Tick,
    ) -> OptionFetch<'w, Q> {
        OptionFetch {
            // SAFETY: forwarded to the caller.
            fetch: unsafe { Q::init_fetch(world, state, last_run, this_run) },
            matches: false,
        }
    }

    #[inline]
    unsafe fn set_archetype<'w>(
        fetch: &mut OptionFetch<'w, Q>,
        state: &Q::State,
        archetype: &'w Archetype,
        table: &'w Table,
    ) {
        fetch.matches = Q::matches_component_set(state, &|id| archetype.contains(id));
        if fetch.matches {
            // SAFETY: forwarded to the caller.
            unsafe { Q::set_archetype(&mut fetch.fetch, state, archetype, table) };
        }
    }

    #[inline]
    unsafe fn set_table<'w>(fetch: &mut OptionFetch<'w, Q>, state: &Q::State, table: &'w Table) {
        fetch.matches = Q::matches_component_set(state, &|id| table.has_column(id));
        if fetch.matches {
            // SAFETY: forwarded to the caller.
            unsafe { Q::set_table(&mut fetch.fetch, state, table) };
        }
    }

    #[inline(always)]
    unsafe fn fetch<'w>(
        fetch: &mut Self::Fetch<'w>,
        entity: Entity,
        table_row: TableRow,
    ) -> Self::Item<'w> {
        fetch
            .matches
            // SAFETY: forwarded to the caller.
            .then(|| unsafe { Q::fetch(&mut fetch.fetch, entity, table_row) })
    }

    fn update_component_access(state: &Q::State, access: &mut FilteredAccess) {
        // Optional access must not narrow the entities the query matches.
        let mut intermediate = access.clone();
        Q::update_component_access(state, &mut intermediate);
        access.extend_access(&intermediate);
    }

    fn init_state(world: &mut World) -> Q::State {
        Q::init_state(world)
    }

    fn matches_component_set(_: &Q::State, _: &impl Fn(ComponentId) -> bool) -> bool {
        true
    }
}

// SAFETY: same access as `Q`.
unsafe impl<Q: QueryData> QueryData for Option<Q> {
    type ReadOnly = Option<Q::ReadOnly>;
}

// SAFETY: read-only when `Q` is.
unsafe impl<Q: ReadOnlyQueryData> ReadOnlyQueryData for Option<Q> {}
