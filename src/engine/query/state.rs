//! Cached per-query state: component ids, access and matched storage.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use crate::engine::access::FilteredAccess;
use crate::engine::archetype::Archetype;
use crate::engine::change::Tick;
use crate::engine::entity::Entity;
use crate::engine::error::{QueryEntityError, QuerySingleError};
use crate::engine::query::{QueryData, QueryFilter, QueryItem, QueryIter, ROQueryItem};
use crate::engine::types::{ArchetypeGeneration, ArchetypeId, Signature, TableId};
use crate::engine::world::{UnsafeWorldCell, World, WorldId};


/// Compiled query over data `D` filtered by `F`.
///
/// A state is bound to the world that created it. It remembers the last
/// archetype generation it examined and matches new archetypes lazily.
///
/// ```ignore
/// let mut query = world.query_filtered::<(&Position, &mut Velocity), Without<Frozen>>();
/// for (position, mut velocity) in query.iter_mut(&mut world) {
///     velocity.x -= position.x * 0.1;
/// }
/// ```
pub struct QueryState<D: QueryData, F: QueryFilter = ()> {
    world_id: WorldId,
    archetype_generation: ArchetypeGeneration,
    matched_tables: Signature,
    matched_archetypes: Signature,
    matched_table_ids: Vec<TableId>,
    matched_archetype_ids: Vec<ArchetypeId>,
    component_access: FilteredAccess,
    fetch_state: D::State,
    filter_state: F::State,
    is_dense: bool,
    _marker: PhantomData<fn() -> (D, F)>,
}

impl<D: QueryData, F: QueryFilter> fmt::Debug for QueryState<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryState")
            .field("query", &type_name::<D>())
            .field("filter", &type_name::<F>())
            .field("world_id", &self.world_id)
            .field("matched_tables", &self.matched_table_ids.len())
            .field("matched_archetypes", &self.matched_archetype_ids.len())
            .field("is_dense", &self.is_dense)
            .finish()
    }
}

impl<D: QueryData, F: QueryFilter> QueryState<D, F> {
    /// Compiles the query against `world`, registering its components.
    ///
    /// ## Panics
    /// Panics if the data parameters conflict with each other, such as
    /// `(&T, &mut T)`.
    pub fn new(world: &mut World) -> Self {
        let fetch_state = D::init_state(world);
        let filter_state = F::init_state(world);

        let mut component_access = FilteredAccess::default();
        D::update_component_access(&fetch_state, &mut component_access);

        // Filters are computed separately so that `Changed<T>` can accompany `&mut T`.
        let mut filter_component_access = FilteredAccess::default();
        F::update_component_access(&filter_state, &mut filter_component_access);
        component_access.extend(&filter_component_access);

        let mut state = Self {
            world_id: world.id(),
            archetype_generation: ArchetypeGeneration::initial(),
            matched_tables: Signature::default(),
            matched_archetypes: Signature::default(),
            matched_table_ids: Vec::new(),
            matched_archetype_ids: Vec::new(),
            component_access,
            fetch_state,
            filter_state,
            is_dense: D::IS_DENSE && F::IS_DENSE,
            _marker: PhantomData,
        };
        state.update_archetypes(world);
        state
    }

    /// Id of the world this state belongs to.
    #[inline]
    pub fn world_id(&self) -> WorldId {
        self.world_id
    }

    /// Components read, written and filtered on.
    #[inline]
    pub fn component_access(&self) -> &FilteredAccess {
        &self.component_access
    }

    /// Tables matched so far.
    #[inline]
    pub fn matched_table_ids(&self) -> &[TableId] {
        &self.matched_table_ids
    }

    /// Archetypes matched so far.
    #[inline]
    pub fn matched_archetype_ids(&self) -> &[ArchetypeId] {
        &self.matched_archetype_ids
    }

    /// Returns `true` if iteration walks whole tables.
    #[inline]
    pub fn is_dense(&self) -> bool {
        self.is_dense
    }

    /// Matches archetypes created since the last update.
    pub fn update_archetypes(&mut self, world: &World) {
        self.update_archetypes_unsafe_world_cell(world.as_unsafe_world_cell_readonly());
    }

    /// Like [`QueryState::update_archetypes`], through an [`UnsafeWorldCell`].
    ///
    /// ## Panics
    /// Panics if `world` is not the world this state was created from.
    pub fn update_archetypes_unsafe_world_cell(&mut self, world: UnsafeWorldCell<'_>) {
        self.validate_world(world.id());
        let archetypes = world.archetypes();
        let old_generation = std::mem::replace(&mut self.archetype_generation, archetypes.generation());
        for archetype in archetypes.since(old_generation) {
            self.new_archetype(archetype);
        }
    }

    /// Records `archetype` as matched if the query applies to it.
    pub fn new_archetype(&mut self, archetype: &Archetype) -> bool {
        let contains = |id| archetype.contains(id);
        if !D::matches_component_set(&self.fetch_state, &contains)
            || !F::matches_component_set(&self.filter_state, &contains)
        {
            return false;
        }
        let archetype_index = archetype.id().index();
        if !self.matched_archetypes.has(archetype_index) {
            self.matched_archetypes.set(archetype_index);
            self.matched_archetype_ids.push(archetype.id());
        }
        let table_index = archetype.table_id().index();
        if !self.matched_tables.has(table_index) {
            self.matched_tables.set(table_index);
            self.matched_table_ids.push(archetype.table_id());
        }
        true
    }

    /// Panics if `world_id` is not the world this state was created from.
    #[inline]
    pub fn validate_world(&self, world_id: WorldId) {
        assert!(
            self.world_id == world_id,
            "encountered a mismatched World: this QueryState was created from {:?}, but a method was called with {:?}",
            self.world_id,
            world_id,
        );
    }

    /// Read-only iteration.
    pub fn iter<'w, 's>(&'s mut self, world: &'w World) -> QueryIter<'w, 's, D::ReadOnly, F> {
        self.update_archetypes(world);
        // SAFETY: read-only access through a shared world borrow.
        unsafe {
            self.iter_unchecked_manual(
                world.as_unsafe_world_cell_readonly(),
                world.last_change_tick(),
                world.change_tick(),
            )
        }
    }

    /// Mutable iteration.
    pub fn iter_mut<'w, 's>(&'s mut self, world: &'w mut World) -> QueryIter<'w, 's, D, F> {
        self.update_archetypes(world);
        let last_run = world.last_change_tick();
        let this_run = world.change_tick();
        // SAFETY: the world is borrowed exclusively.
        unsafe { self.iter_unchecked_manual(world.as_unsafe_world_cell(), last_run, this_run) }
    }

    /// Iterates as query data `Q`, which shares `D`'s state, without
    /// updating archetypes.
    ///
    /// # Safety
    /// The caller must hold the access `Q` reports, and `world` must be the
    /// world this state was created from.
    pub(crate) unsafe fn iter_unchecked_manual<'w, 's, Q: QueryData<State = D::State>>(
        &'s self,
        world: UnsafeWorldCell<'w>,
        last_run: Tick,
        this_run: Tick,
    ) -> QueryIter<'w, 's, Q, F> {
        // SAFETY: forwarded to the caller.
        unsafe {
            QueryIter::new(
                world,
                &self.fetch_state,
                &self.filter_state,
                &self.matched_table_ids,
                &self.matched_archetype_ids,
                self.is_dense,
                last_run,
                this_run,
            )
        }
    }

    /// Read-only item of `entity`.
    pub fn get<'w>(&mut self, world: &'w World, entity: Entity) -> Result<ROQueryItem<'w, D>, QueryEntityError> {
        self.update_archetypes(world);
        // SAFETY: read-only access through a shared world borrow.
        unsafe {
            self.get_unchecked_manual::<D::ReadOnly>(
                world.as_unsafe_world_cell_readonly(),
                entity,
                world.last_change_tick(),
                world.change_tick(),
            )
        }
    }

    /// Mutable item of `entity`.
    pub fn get_mut<'w>(&mut self, world: &'w mut World, entity: Entity) -> Result<QueryItem<'w, D>, QueryEntityError> {
        self.update_archetypes(world);
        let last_run = world.last_change_tick();
        let this_run = world.change_tick();
        // SAFETY: the world is borrowed exclusively.
        unsafe { self.get_unchecked_manual::<D>(world.as_unsafe_world_cell(), entity, last_run, this_run) }
    }

    /// Fetches `entity` as query data `Q`, which shares `D`'s state.
    ///
    /// # Safety
    /// Same contract as [`QueryState::iter_unchecked_manual`].
    pub(crate) unsafe fn get_unchecked_manual<'w, Q: QueryData<State = D::State>>(
        &self,
        world: UnsafeWorldCell<'w>,
        entity: Entity,
        last_run: Tick,
        this_run: Tick,
    ) -> Result<QueryItem<'w, Q>, QueryEntityError> {
        let location = world.entities().get(entity).ok_or(QueryEntityError::NoSuchEntity(entity))?;
        if !self.matched_archetypes.has(location.archetype_id.index()) {
            return Err(QueryEntityError::QueryDoesNotMatch(entity));
        }
        let archetype = &world.archetypes()[location.archetype_id];
        // SAFETY: only the table arena is read; component access is covered by the caller.
        let table = &unsafe { world.storages() }.tables[location.table_id];

        // SAFETY: forwarded to the caller; the archetype was matched and
        // `table` backs it.
        unsafe {
            let mut fetch = Q::init_fetch(world, &self.fetch_state, last_run, this_run);
            let mut filter = F::init_fetch(world, &self.filter_state, last_run, this_run);
            Q::set_archetype(&mut fetch, &self.fetch_state, archetype, table);
            F::set_archetype(&mut filter, &self.filter_state, archetype, table);
            if F::filter_fetch(&mut filter, entity, location.table_row) {
                Ok(Q::fetch(&mut fetch, entity, location.table_row))
            } else {
                Err(QueryEntityError::QueryDoesNotMatch(entity))
            }
        }
    }

    /// The only read-only item.
    ///
    /// ## Errors
    /// [`QuerySingleError::NoEntities`] or
    /// [`QuerySingleError::MultipleEntities`] unless exactly one entity matches.
    pub fn single<'w>(&mut self, world: &'w World) -> Result<ROQueryItem<'w, D>, QuerySingleError> {
        Self::single_from(self.iter(world))
    }

    /// The only mutable item.
    pub fn single_mut<'w>(&mut self, world: &'w mut World) -> Result<QueryItem<'w, D>, QuerySingleError> {
        Self::single_from(self.iter_mut(world))
    }

    pub(crate) fn single_from<I: Iterator>(mut iter: I) -> Result<I::Item, QuerySingleError> {
        let first = iter.next().ok_or(QuerySingleError::NoEntities(type_name::<Self>()))?;
        match iter.next() {
            None => Ok(first),
            Some(_) => Err(QuerySingleError::MultipleEntities(type_name::<Self>())),
        }
    }

    /// Returns `true` if no entity matches.
    pub fn is_empty(&mut self, world: &World) -> bool {
        self.iter(world).next().is_none()
    }
}

