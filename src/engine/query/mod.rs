//! # Query Engine
//!
//! Typed iteration over every entity whose components satisfy a data and
//! filter description.
//!
//! ## Purpose
//! A query is described by two type parameters: *data* `D`, what each item
//! yields, and a *filter* `F`, which entities qualify. Both are composed
//! from a closed set of primitives resolved at compile time:
//!
//! | primitive            | role   | item / effect                          |
//! |----------------------|--------|----------------------------------------|
//! | [`Entity`]           | data   | the entity handle                      |
//! | `&T`                 | data   | shared reference to component `T`      |
//! | `&mut T`             | data   | [`Mut<T>`](crate::engine::change::Mut) |
//! | `Option<Q>`          | data   | `Some` when `Q` matches the entity     |
//! | [`With<T>`]          | filter | entity has `T`                         |
//! | [`Without<T>`]       | filter | entity lacks `T`                       |
//! | [`Added<T>`]         | filter | `T` added since the observer's last run |
//! | [`Changed<T>`]       | filter | `T` changed since the observer's last run |
//! | [`Or<(..)>`]         | filter | any of the inner filters               |
//!
//! Tuples of data are data and tuples of filters are filters (AND).
//!
//! ## Design
//! [`QueryState`] caches, per query, the component ids it needs and the
//! archetypes and tables it matched so far. Matching is incremental: only
//! archetypes created since the last update are examined.
//!
//! When every data and filter primitive is table-stored the query iterates
//! whole tables (*dense* iteration). Otherwise it iterates archetypes and
//! resolves each entity's table row through the archetype.
//!
//! ## Safety
//! [`WorldQuery`] is an `unsafe` trait: an implementation promises that
//! [`WorldQuery::update_component_access`] reports every component it reads
//! or writes. Fetches hand out references derived from raw column pointers,
//! and the scheduler relies on the reported access to keep those references
//! from aliasing.

mod fetch;
mod filter;
mod iter;
mod state;

pub use fetch::{OptionFetch, ReadFetch, WriteFetch};
pub use filter::{Added, Changed, Or, OrFetch, TickFilterFetch, With, Without};
pub use iter::QueryIter;
pub use state::QueryState;

use crate::engine::access::FilteredAccess;
use crate::engine::archetype::Archetype;
use crate::engine::change::Tick;
use crate::engine::entity::Entity;
use crate::engine::table::Table;
use crate::engine::types::{ComponentId, TableRow};
use crate::engine::world::{UnsafeWorldCell, World};


/// Shared machinery of query data and query filters.
///
/// # Safety
/// - [`WorldQuery::update_component_access`] must report every component the
///   fetch reads as a read and every component it writes as a write.
/// - [`WorldQuery::matches_component_set`] must return `true` only for
///   component sets on which [`WorldQuery::fetch`] can succeed.
pub unsafe trait WorldQuery {
    /// Item produced per entity.
    type Item<'w>;
    /// Per-iteration cursor state, such as column pointers.
    type Fetch<'w>: Clone;
    /// Cached per-query state, such as component ids.
    type State: Send + Sync + Sized;

    /// `true` if the query can iterate whole tables.
    const IS_DENSE: bool;

    /// Creates a fetch for one iteration.
    ///
    /// # Safety
    /// `state` must come from [`WorldQuery::init_state`] on the same world,
    /// and the caller must hold the access this query reports.
    unsafe fn init_fetch<'w>(
        world: UnsafeWorldCell<'w>,
        state: &Self::State,
        last_run: Tick,
        this_run: Tick,
    ) -> Self::Fetch<'w>;

    /// Points the fetch at `archetype`, whose table is `table`.
    ///
    /// # Safety
    /// `archetype` and `table` must come from the fetch's world and `table`
    /// must back `archetype`.
    unsafe fn set_archetype<'w>(
        fetch: &mut Self::Fetch<'w>,
        state: &Self::State,
        archetype: &'w Archetype,
        table: &'w Table,
    );

    /// Points the fetch at `table` for dense iteration.
    ///
    /// # Safety
    /// `table` must come from the fetch's world. Only valid when
    /// [`WorldQuery::IS_DENSE`] is `true`.
    unsafe fn set_table<'w>(fetch: &mut Self::Fetch<'w>, state: &Self::State, table: &'w Table);

    /// Produces the item for `entity` at `table_row`.
    ///
    /// # Safety
    /// The fetch must have been pointed at the archetype or table holding
    /// `entity`, and no other live item may alias a mutable borrow it returns.
    unsafe fn fetch<'w>(
        fetch: &mut Self::Fetch<'w>,
        entity: Entity,
        table_row: TableRow,
    ) -> Self::Item<'w>;

    /// Adds this query's accesses to `access`.
    ///
    /// ## Panics
    /// Panics if the query conflicts with accesses already in `access`.
    fn update_component_access(state: &Self::State, access: &mut FilteredAccess);

    /// Registers the components this query needs and builds its state.
    fn init_state(world: &mut World) -> Self::State;

    /// Returns `true` if an archetype with this component set can match.
    fn matches_component_set(
        state: &Self::State,
        set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool;
}

/// Query primitives usable as the data of a query.
///
/// # Safety
/// `ReadOnly` must only read the components `Self` accesses.
pub unsafe trait QueryData: WorldQuery {
    /// Read-only variant with the same state.
    type ReadOnly: ReadOnlyQueryData<State = <Self as WorldQuery>::State>;
}

/// Query data that never writes.
///
/// # Safety
/// The implementation must report no writes.
pub unsafe trait ReadOnlyQueryData: QueryData<ReadOnly = Self> {}

/// Query primitives usable as the filter of a query.
///
/// # Safety
/// [`QueryFilter::IS_ARCHETYPAL`] may only be `true` if
/// [`QueryFilter::filter_fetch`] always returns `true` on matched archetypes.
pub unsafe trait QueryFilter: WorldQuery {
    /// `true` if archetype matching alone decides the filter.
    const IS_ARCHETYPAL: bool;

    /// Returns `true` if `entity` passes the filter.
    ///
    /// # Safety
    /// Same contract as [`WorldQuery::fetch`].
    unsafe fn filter_fetch(fetch: &mut Self::Fetch<'_>, entity: Entity, table_row: TableRow) -> bool;
}

/// Item type of query data `Q`.
pub type QueryItem<'w, Q> = <Q as WorldQuery>::Item<'w>;

/// Read-only item type of query data `D`.
pub type ROQueryItem<'w, D> = QueryItem<'w, <D as QueryData>::ReadOnly>;

macro_rules! impl_tuple_world_query {
    ($(($name:ident, $state:ident)),*) => {
        #[allow(non_snake_case, unused_variables, clippy::unused_unit)]
        // SAFETY: every element reports its own access; the tuple forwards all of them.
        unsafe impl<$($name: WorldQuery),*> WorldQuery for ($($name,)*) {
            type Item<'w> = ($(<$name as WorldQuery>::Item<'w>,)*);
            type Fetch<'w> = ($(<$name as WorldQuery>::Fetch<'w>,)*);
            type State = ($(<$name as WorldQuery>::State,)*);

            const IS_DENSE: bool = true $(&& <$name as WorldQuery>::IS_DENSE)*;

            #[inline]
            unsafe fn init_fetch<'w>(
                world: UnsafeWorldCell<'w>,
                state: &Self::State,
                last_run: Tick,
                this_run: Tick,
            ) -> Self::Fetch<'w> {
                let ($($state,)*) = state;
                // SAFETY: forwarded to the caller.
                ($(unsafe { <$name as WorldQuery>::init_fetch(world, $state, last_run, this_run) },)*)
            }

            #[inline]
            unsafe fn set_archetype<'w>(
                fetch: &mut Self::Fetch<'w>,
                state: &Self::State,
                archetype: &'w Archetype,
                table: &'w Table,
            ) {
                let ($($name,)*) = fetch;
                let ($($state,)*) = state;
                // SAFETY: forwarded to the caller.
                $(unsafe { <$name as WorldQuery>::set_archetype($name, $state, archetype, table) };)*
            }

            #[inline]
            unsafe fn set_table<'w>(fetch: &mut Self::Fetch<'w>, state: &Self::State, table: &'w Table) {
                let ($($name,)*) = fetch;
                let ($($state,)*) = state;
                // SAFETY: forwarded to the caller.
                $(unsafe { <$name as WorldQuery>::set_table($name, $state, table) };)*
            }

            #[inline(always)]
            unsafe fn fetch<'w>(
                fetch: &mut Self::Fetch<'w>,
                entity: Entity,
                table_row: TableRow,
            ) -> Self::Item<'w> {
                let ($($name,)*) = fetch;
                // SAFETY: forwarded to the caller.
                ($(unsafe { <$name as WorldQuery>::fetch($name, entity, table_row) },)*)
            }

            fn update_component_access(state: &Self::State, access: &mut FilteredAccess) {
                let ($($state,)*) = state;
                $(<$name as WorldQuery>::update_component_access($state, access);)*
            }

            fn init_state(world: &mut World) -> Self::State {
                ($(<$name as WorldQuery>::init_state(world),)*)
            }

            fn matches_component_set(
                state: &Self::State,
                set_contains_id: &impl Fn(ComponentId) -> bool,
            ) -> bool {
                let ($($state,)*) = state;
                true $(&& <$name as WorldQuery>::matches_component_set($state, set_contains_id))*
            }
        }

        // SAFETY: each element is query data, so the tuple reads and writes
        // exactly what its elements do.
        unsafe impl<$($name: QueryData),*> QueryData for ($($name,)*) {
            type ReadOnly = ($(<$name as QueryData>::ReadOnly,)*);
        }

        // SAFETY: every element is read-only.
        unsafe impl<$($name: ReadOnlyQueryData),*> ReadOnlyQueryData for ($($name,)*) {}

        #[allow(non_snake_case, unused_variables)]
        // SAFETY: archetypal only if every element is archetypal.
        unsafe impl<$($name: QueryFilter),*> QueryFilter for ($($name,)*) {
            const IS_ARCHETYPAL: bool = true $(&& <$name as QueryFilter>::IS_ARCHETYPAL)*;

            #[inline(always)]
            unsafe fn filter_fetch(
                fetch: &mut Self::Fetch<'_>,
                entity: Entity,
                table_row: TableRow,
            ) -> bool {
                let ($($name,)*) = fetch;
                // SAFETY: forwarded to the caller.
                true $(&& unsafe { <$name as QueryFilter>::filter_fetch($name, entity, table_row) })*
            }
        }
    };
}

impl_tuple_world_query!();
impl_tuple_world_query!((D0, s0));
impl_tuple_world_query!((D0, s0), (D1, s1));
impl_tuple_world_query!((D0, s0), (D1, s1), (D2, s2));
impl_tuple_world_query!((D0, s0), (D1, s1), (D2, s2), (D3, s3));
impl_tuple_world_query!((D0, s0), (D1, s1), (D2, s2), (D3, s3), (D4, s4));
impl_tuple_world_query!((D0, s0), (D1, s1), (D2, s2), (D3, s3), (D4, s4), (D5, s5));
impl_tuple_world_query!((D0, s0), (D1, s1), (D2, s2), (D3, s3), (D4, s4), (D5, s5), (D6, s6));
impl_tuple_world_query!(
    (D0, s0), (D1, s1), (D2, s2), (D3, s3), (D4, s4), (D5, s5), (D6, s6), (D7, s7)
);
impl_tuple_world_query!(
    (D0, s0), (D1, s1), (D2, s2), (D3, s3), (D4, s4), (D5, s5), (D6, s6), (D7, s7), (D8, s8)
);
impl_tuple_world_query!(
    (D0, s0), (D1, s1), (D2, s2), (D3, s3), (D4, s4), (D5, s5), (D6, s6), (D7, s7), (D8, s8),
    (D9, s9)
);
