//! The [`Query`] system parameter.

use std::any::type_name;

use crate::engine::change::Tick;
use crate::engine::entity::Entity;
use crate::engine::error::{QueryEntityError, QuerySingleError};
use crate::engine::query::{
    QueryData, QueryFilter, QueryItem, QueryIter, QueryState, ROQueryItem, ReadOnlyQueryData,
};
use crate::engine::system::{ReadOnlySystemParam, SystemMeta, SystemParam};
use crate::engine::world::{UnsafeWorldCell, World};


/// Access to the entities matching `D` filtered by `F`, inside a system.
///
/// The query borrows its [`QueryState`] from the system and is limited to
/// the access the state declared, so two queries in one system may coexist
/// as long as their accesses are compatible.
///
/// ```ignore
/// fn age(mut agents: Query<&mut Age, Without<Immortal>>) {
///     for mut age in agents.iter_mut() {
///         age.0 += 1;
///     }
/// }
/// ```
pub struct Query<'world, 'state, D: QueryData, F: QueryFilter = ()> {
    world: UnsafeWorldCell<'world>,
    state: &'state QueryState<D, F>,
    last_run: Tick,
    this_run: Tick,
}

impl<D: QueryData, F: QueryFilter> std::fmt::Debug for Query<'_, '_, D, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("state", &self.state)
            .field("last_run", &self.last_run)
            .field("this_run", &self.this_run)
            .finish()
    }
}

impl<'world, 'state, D: QueryData, F: QueryFilter> Query<'world, 'state, D, F> {
    /// # Safety
    /// The caller must hold the access declared by `state` for the lifetime
    /// of the query, and `state` must have been updated against `world`.
    #[inline]
    pub(crate) unsafe fn new(
        world: UnsafeWorldCell<'world>,
        state: &'state QueryState<D, F>,
        last_run: Tick,
        this_run: Tick,
    ) -> Self {
        state.validate_world(world.id());
        Self { world, state, last_run, this_run }
    }

    /// Read-only iteration.
    #[inline]
    pub fn iter(&self) -> QueryIter<'_, '_, D::ReadOnly, F> {
        // SAFETY: `&self` prevents mutable iteration while the iterator lives.
        unsafe { self.state.iter_unchecked_manual(self.world, self.last_run, self.this_run) }
    }

    /// Mutable iteration.
    #[inline]
    pub fn iter_mut(&mut self) -> QueryIter<'_, '_, D, F> {
        // SAFETY: `&mut self` makes this the only live borrow of the query's data.
        unsafe { self.state.iter_unchecked_manual(self.world, self.last_run, self.this_run) }
    }

    /// Read-only item of `entity`.
    #[inline]
    pub fn get(&self, entity: Entity) -> Result<ROQueryItem<'_, D>, QueryEntityError> {
        // SAFETY: read-only item behind `&self`.
        unsafe {
            self.state.get_unchecked_manual::<D::ReadOnly>(self.world, entity, self.last_run, self.this_run)
        }
    }

    /// Mutable item of `entity`.
    #[inline]
    pub fn get_mut(&mut self, entity: Entity) -> Result<QueryItem<'_, D>, QueryEntityError> {
        // SAFETY: mutable item behind `&mut self`.
        unsafe { self.state.get_unchecked_manual::<D>(self.world, entity, self.last_run, self.this_run) }
    }

    /// The only read-only item.
    pub fn single(&self) -> Result<ROQueryItem<'_, D>, QuerySingleError> {
        QueryState::<D, F>::single_from(self.iter())
    }

    /// The only mutable item.
    pub fn single_mut(&mut self) -> Result<QueryItem<'_, D>, QuerySingleError> {
        QueryState::<D, F>::single_from(self.iter_mut())
    }

    /// Returns `true` if no entity matches.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Returns `true` if `entity` matches the query.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.get(entity).is_ok()
    }
}

impl<'w, 's, D: QueryData, F: QueryFilter> IntoIterator for &'w Query<'_, 's, D, F> {
    type Item = ROQueryItem<'w, D>;
    type IntoIter = QueryIter<'w, 'w, D::ReadOnly, F>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'w, 's, D: QueryData, F: QueryFilter> IntoIterator for &'w mut Query<'_, 's, D, F> {
    type Item = QueryItem<'w, D>;
    type IntoIter = QueryIter<'w, 'w, D, F>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

// SAFETY: the query state's access is registered, and `init_state` panics
// if it conflicts with an earlier parameter.
unsafe impl<D: QueryData + 'static, F: QueryFilter + 'static> SystemParam for Query<'_, '_, D, F> {
    type State = QueryState<D, F>;
    type Item<'w, 's> = Query<'w, 's, D, F>;

    fn init_state(world: &mut World, system_meta: &mut SystemMeta) -> QueryState<D, F> {
        let state = QueryState::new(world);
        let conflicts = system_meta.component_access_set.get_conflicts_single(state.component_access());
        if !conflicts.is_empty() {
            panic!(
                "Query<{}, {}> in system {} accesses {} in a way that conflicts with a previous system parameter; use Without<T> to make the queries disjoint",
                type_name::<D>(),
                type_name::<F>(),
                system_meta.name,
                conflicts.describe(world.components()),
            );
        }
        system_meta.component_access_set.add(state.component_access().clone());
        state
    }

    #[inline]
    unsafe fn get_param<'w, 's>(
        state: &'s mut QueryState<D, F>,
        system_meta: &SystemMeta,
        world: UnsafeWorldCell<'w>,
        change_tick: Tick,
    ) -> Query<'w, 's, D, F> {
        state.update_archetypes_unsafe_world_cell(world);
        // SAFETY: access was registered in `init_state`; the caller
        // guarantees nothing conflicting is live.
        unsafe { Query::new(world, state, system_meta.last_run, change_tick) }
    }
}

// SAFETY: read-only query data and filters never write.
unsafe impl<D: ReadOnlyQueryData + 'static, F: QueryFilter + 'static> ReadOnlySystemParam for Query<'_, '_, D, F> {}
