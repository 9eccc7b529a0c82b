//! # World
//!
//! The world owns every piece of ECS state: the entity allocator, the
//! component and bundle registries, archetypes, tables, sparse sets and
//! resources.
//!
//! ## Responsibilities
//!
//! * allocating and freeing entities,
//! * migrating entities between archetypes on insert and remove,
//! * resource storage,
//! * the world change tick used by change detection,
//! * handing out [`UnsafeWorldCell`] views for systems.
//!
//! ## Concurrency model
//!
//! Structural operations (spawn, despawn, insert, remove) take `&mut World`
//! and therefore never overlap anything else. Systems receive an
//! [`UnsafeWorldCell`] and only touch the data their computed
//! [`Access`](crate::engine::access::Access) declares; column and resource
//! contents sit behind `UnsafeCell`, so disjoint systems may write through a
//! shared `&World` concurrently.
//!
//! ## Structural transitions
//!
//! An insert or remove on a live entity:
//!
//! 1. looks up (or creates and caches) the destination archetype,
//! 2. swap-removes the entity from its archetype and repairs the location of
//!    the entity moved into the gap,
//! 3. moves shared table columns to the destination table (if it differs),
//!    repairing the location of the entity moved into the vacated table row,
//! 4. writes the new values or hands back the removed ones,
//! 5. stores the new location.
//!
//! An entity is never observable at two locations.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::engine::archetype::{AddBundle, Archetypes, ComponentStatus};
use crate::engine::bundle::{Bundle, BundleInfo, Bundles};
use crate::engine::change::{Mut, Tick, CHECK_TICK_THRESHOLD};
use crate::engine::component::{
    Component, ComponentDescriptor, Components, Resource, StorageType,
};
use crate::engine::entity::{Entities, Entity, EntityLocation};
use crate::engine::error::RegistryError;
use crate::engine::event::{Event, EventCursor, EventId, Events};
use crate::engine::query::{QueryData, QueryFilter, QueryState};
use crate::engine::sparse_set::SparseSets;
use crate::engine::storage::Storages;
use crate::engine::system::{run_system_once, IntoSystem};
use crate::engine::table::{Table, Tables};
use crate::engine::types::{ArchetypeId, ComponentId, TableRow};


static NEXT_WORLD_ID: AtomicUsize = AtomicUsize::new(0);

/// Unique identifier of a [`World`] within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorldId(usize);

impl WorldId {
    fn new() -> Self {
        WorldId(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Types that can be built from a world, used by `init_resource` and `Local`.
pub trait FromWorld {
    /// Builds a value, possibly reading or mutating the world.
    fn from_world(world: &mut World) -> Self;
}

impl<T: Default> FromWorld for T {
    fn from_world(_world: &mut World) -> Self {
        T::default()
    }
}

/// All entities, components and resources of one simulation.
pub struct World {
    id: WorldId,
    pub(crate) entities: Entities,
    pub(crate) components: Components,
    pub(crate) archetypes: Archetypes,
    pub(crate) storages: Storages,
    pub(crate) bundles: Bundles,
    change_tick: AtomicU32,
    last_change_tick: Tick,
    last_check_tick: Tick,
}

impl Default for World {
    fn default() -> Self {
        Self {
            id: WorldId::new(),
            entities: Entities::new(),
            components: Components::default(),
            archetypes: Archetypes::default(),
            storages: Storages::default(),
            bundles: Bundles::default(),
            change_tick: AtomicU32::new(1),
            last_change_tick: Tick::new(0),
            last_check_tick: Tick::new(0),
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("entity_count", &self.entities.len())
            .field("archetype_count", &self.archetypes.len())
            .field("component_count", &self.components.len())
            .field("resource_count", &self.storages.resources.len())
            .finish()
    }
}

impl World {
    /// Creates an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-unique id of this world.
    #[inline]
    pub fn id(&self) -> WorldId {
        self.id
    }

    // ───────────────────────────── metadata ─────────────────────────────

    /// Entity allocator.
    #[inline]
    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// Component registry.
    #[inline]
    pub fn components(&self) -> &Components {
        &self.components
    }

    /// Archetype arena.
    #[inline]
    pub fn archetypes(&self) -> &Archetypes {
        &self.archetypes
    }

    /// Tables, sparse sets and resources.
    #[inline]
    pub fn storages(&self) -> &Storages {
        &self.storages
    }

    /// Bundle registry.
    #[inline]
    pub fn bundles(&self) -> &Bundles {
        &self.bundles
    }

    /// Registers component `T`, returning its id.
    ///
    /// ## Panics
    /// Panics if `T` was registered with a different storage type.
    pub fn init_component<T: Component>(&mut self) -> ComponentId {
        self.components.init_component::<T>()
    }

    /// Registers component `T`, reporting storage conflicts as an error.
    pub fn try_init_component<T: Component>(&mut self) -> Result<ComponentId, RegistryError> {
        self.components.try_init_component::<T>()
    }

    /// Registers a component from an explicit descriptor.
    pub fn register_component_with_descriptor(
        &mut self,
        descriptor: ComponentDescriptor,
    ) -> Result<ComponentId, RegistryError> {
        self.components.register_component_with_descriptor(descriptor)
    }

    /// Id of component `T`, if registered.
    #[inline]
    pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
        self.components.component_id::<T>()
    }

    // ───────────────────────────── ticks ─────────────────────────────

    /// Current change tick.
    #[inline]
    pub fn change_tick(&self) -> Tick {
        Tick::new(self.change_tick.load(Ordering::Acquire))
    }

    /// Advances the change tick, returning the value before the increment.
    #[inline]
    pub fn increment_change_tick(&self) -> Tick {
        Tick::new(self.change_tick.fetch_add(1, Ordering::AcqRel))
    }

    /// Change tick at the end of the last schedule run.
    #[inline]
    pub fn last_change_tick(&self) -> Tick {
        self.last_change_tick
    }

    /// Marks the end of a frame for change detection outside systems.
    pub fn clear_trackers(&mut self) {
        self.last_change_tick = self.increment_change_tick();
    }

    /// Runs `f` with the last change tick temporarily set to `last_change_tick`.
    ///
    /// Exclusive systems use it so that change detection through `&mut World`
    /// is relative to their own last run.
    pub fn last_change_tick_scope<T>(&mut self, last_change_tick: Tick, f: impl FnOnce(&mut World) -> T) -> T {
        let previous = std::mem::replace(&mut self.last_change_tick, last_change_tick);
        let out = f(self);
        self.last_change_tick = previous;
        out
    }

    /// Clamps stored ticks once enough ticks have passed since the last pass.
    ///
    /// Returns the tick used for clamping if a pass ran, so callers can clamp
    /// the ticks they own, such as system last-run ticks.
    pub fn check_change_ticks(&mut self) -> Option<Tick> {
        let change_tick = self.change_tick();
        if change_tick.relative_to(self.last_check_tick).get() < CHECK_TICK_THRESHOLD {
            return None;
        }
        self.storages.tables.check_change_ticks(change_tick);
        self.storages.sparse_sets.check_change_ticks(change_tick);
        self.storages.resources.check_change_ticks(change_tick);
        self.last_check_tick = change_tick;
        tracing::debug!(tick = change_tick.get(), "clamped stale change ticks");
        Some(change_tick)
    }

    // ───────────────────────────── entities ─────────────────────────────

    /// Binds every reserved entity to the empty archetype.
    pub fn flush(&mut self) {
        let World { entities, archetypes, storages, .. } = self;
        let Some(empty_archetype) = archetypes.get_mut(ArchetypeId::EMPTY) else {
            return;
        };
        let table_id = empty_archetype.table_id();
        let Some(empty_table) = storages.tables.get_mut(table_id) else {
            return;
        };
        entities.flush(|entity, location| {
            let table_row = empty_table.allocate(entity);
            let archetype_row = empty_archetype.allocate(entity, table_row);
            *location = EntityLocation {
                archetype_id: ArchetypeId::EMPTY,
                archetype_row,
                table_id,
                table_row,
            };
        });
    }

    /// Spawns an entity with no components.
    pub fn spawn_empty(&mut self) -> Entity {
        self.spawn(())
    }

    /// Spawns an entity with the components of `bundle`.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Entity {
        self.flush();
        let change_tick = self.change_tick();
        let entity = self.entities.alloc();

        let World { entities, components, archetypes, storages, bundles, .. } = self;
        let bundle_id = bundles.init_info::<B>(components);
        let info = bundles.info(bundle_id);
        let add = add_bundle_to_archetype(
            archetypes,
            &mut storages.tables,
            components,
            info,
            ArchetypeId::EMPTY,
        );

        let archetype = &mut archetypes[add.archetype_id];
        let table_id = archetype.table_id();
        let table = &mut storages.tables[table_id];
        let table_row = table.allocate(entity);
        write_bundle(
            table,
            &mut storages.sparse_sets,
            components,
            entity,
            table_row,
            info,
            &add.bundle_status,
            bundle,
            change_tick,
        );
        let archetype_row = archetype.allocate(entity, table_row);
        entities.set(
            entity.index(),
            EntityLocation { archetype_id: add.archetype_id, archetype_row, table_id, table_row },
        );
        entity
    }

    /// Returns `true` if `entity` is live or reserved.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Despawns `entity`, dropping its components.
    ///
    /// Returns `false` if the handle is stale.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.flush();
        let Some(location) = self.entities.free(entity) else {
            return false;
        };
        if location.archetype_id == ArchetypeId::INVALID {
            return true;
        }

        let World { entities, archetypes, storages, .. } = self;
        let archetype = &mut archetypes[location.archetype_id];
        let removed = archetype.swap_remove(location.archetype_row);
        let sparse_components = archetype.sparse_set_components().to_vec();
        if let Some(swapped) = removed.swapped_entity {
            update_swapped_archetype_row(entities, swapped, location);
        }
        for id in sparse_components {
            if let Some(set) = storages.sparse_sets.get_mut(id) {
                set.remove_and_drop(entity);
            }
        }
        let moved = storages.tables[location.table_id].swap_remove(removed.table_row);
        if let Some(swapped) = moved {
            update_swapped_table_row(entities, archetypes, swapped, removed.table_row);
        }
        true
    }

    /// Inserts the components of `bundle` into `entity`, replacing existing
    /// values of the same types.
    ///
    /// Returns `false` if the handle is stale.
    pub fn insert<B: Bundle>(&mut self, entity: Entity, bundle: B) -> bool {
        self.flush();
        let Some(location) = self.entities.get(entity) else {
            return false;
        };
        let change_tick = self.change_tick();

        let World { entities, components, archetypes, storages, bundles, .. } = self;
        let bundle_id = bundles.init_info::<B>(components);
        let info = bundles.info(bundle_id);
        let add = add_bundle_to_archetype(
            archetypes,
            &mut storages.tables,
            components,
            info,
            location.archetype_id,
        );

        let new_location = if add.archetype_id == location.archetype_id {
            location
        } else {
            let (new_location, _) = move_entity(
                entities,
                archetypes,
                &mut storages.tables,
                entity,
                location,
                add.archetype_id,
                MoveKind::Superset,
            );
            new_location
        };
        write_bundle(
            &mut storages.tables[new_location.table_id],
            &mut storages.sparse_sets,
            components,
            entity,
            new_location.table_row,
            info,
            &add.bundle_status,
            bundle,
            change_tick,
        );
        true
    }

    /// Removes the components of bundle `B` that `entity` has.
    ///
    /// Returns `true` if at least one component was removed.
    pub fn remove<B: Bundle>(&mut self, entity: Entity) -> bool {
        self.remove_bundle::<B>(entity).is_some_and(|removed| !removed.is_empty())
    }

    /// Removes component `T` from `entity` and returns it.
    pub fn take<T: Component>(&mut self, entity: Entity) -> Option<T> {
        let (_, value) = self.remove_bundle::<T>(entity)?.into_iter().next()?;
        value.downcast::<T>().ok().map(|value| *value)
    }

    fn remove_bundle<B: Bundle>(
        &mut self,
        entity: Entity,
    ) -> Option<Vec<(ComponentId, Box<dyn Any + Send>)>> {
        self.flush();
        let location = self.entities.get(entity)?;

        let World { entities, components, archetypes, storages, bundles, .. } = self;
        let bundle_id = bundles.init_info::<B>(components);
        let info = bundles.info(bundle_id);
        let new_archetype_id = remove_bundle_from_archetype(
            archetypes,
            &mut storages.tables,
            components,
            info,
            location.archetype_id,
        );
        if new_archetype_id == location.archetype_id {
            return Some(Vec::new());
        }

        let mut removed = Vec::new();
        let sparse_components: Vec<ComponentId> = archetypes[location.archetype_id]
            .sparse_set_components()
            .iter()
            .copied()
            .filter(|id| info.components().contains(id))
            .collect();
        for id in sparse_components {
            if let Some(value) = storages.sparse_sets.get_mut(id).and_then(|set| set.remove(entity)) {
                removed.push((id, value));
            }
        }

        let (_, leftovers) = move_entity(
            entities,
            archetypes,
            &mut storages.tables,
            entity,
            location,
            new_archetype_id,
            MoveKind::Subset,
        );
        removed.extend(leftovers);
        Some(removed)
    }

    // ───────────────────────────── components ─────────────────────────────

    /// Component `T` of `entity`.
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        let id = self.components.component_id::<T>()?;
        let location = self.entities.get(entity)?;
        match T::STORAGE_TYPE {
            StorageType::Table => {
                self.storages.tables.get(location.table_id)?.get_component::<T>(id, location.table_row)
            }
            StorageType::SparseSet => self.storages.sparse_sets.get(id)?.get::<T>(entity),
        }
    }

    /// Change-detecting mutable access to component `T` of `entity`.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<Mut<'_, T>> {
        let id = self.components.component_id::<T>()?;
        let location = self.entities.get(entity)?;
        let last_run = self.last_change_tick;
        let this_run = self.change_tick();
        let (value, added, changed) = match T::STORAGE_TYPE {
            StorageType::Table => self
                .storages
                .tables
                .get_mut(location.table_id)?
                .get_column_mut(id)?
                .get_with_ticks_mut::<T>(location.table_row.index())?,
            StorageType::SparseSet => {
                self.storages.sparse_sets.get_mut(id)?.get_with_ticks_mut::<T>(entity)?
            }
        };
        Some(Mut::new(value, added, changed, last_run, this_run))
    }

    // ───────────────────────────── queries ─────────────────────────────

    /// Builds a query state for `D` with no filter.
    pub fn query<D: QueryData>(&mut self) -> QueryState<D, ()> {
        QueryState::new(self)
    }

    /// Builds a query state for `D` filtered by `F`.
    pub fn query_filtered<D: QueryData, F: QueryFilter>(&mut self) -> QueryState<D, F> {
        QueryState::new(self)
    }

    // ───────────────────────────── resources ─────────────────────────────

    /// Inserts or replaces resource `R`.
    pub fn insert_resource<R: Resource>(&mut self, value: R) {
        let id = self.components.init_resource::<R>();
        let tick = self.change_tick();
        self.storages.resources.insert(id, value, tick);
    }

    /// Inserts `R::from_world` unless `R` already exists. Returns its id.
    pub fn init_resource<R: Resource + FromWorld>(&mut self) -> ComponentId {
        let id = self.components.init_resource::<R>();
        if !self.storages.resources.contains(id) {
            let value = R::from_world(self);
            let tick = self.change_tick();
            self.storages.resources.insert(id, value, tick);
        }
        id
    }

    /// Removes resource `R` and returns it.
    pub fn remove_resource<R: Resource>(&mut self) -> Option<R> {
        let id = self.components.resource_id::<R>()?;
        self.storages.resources.remove::<R>(id)
    }

    /// Returns `true` if resource `R` exists.
    pub fn contains_resource<R: Resource>(&self) -> bool {
        self.components
            .resource_id::<R>()
            .is_some_and(|id| self.storages.resources.contains(id))
    }

    /// Resource `R`, if present.
    pub fn get_resource<R: Resource>(&self) -> Option<&R> {
        let id = self.components.resource_id::<R>()?;
        self.storages.resources.get(id)?.get::<R>()
    }

    /// Change-detecting mutable access to resource `R`, if present.
    pub fn get_resource_mut<R: Resource>(&mut self) -> Option<Mut<'_, R>> {
        let id = self.components.resource_id::<R>()?;
        let last_run = self.last_change_tick;
        let this_run = self.change_tick();
        let data = self.storages.resources.get(id)?;
        // SAFETY: `&mut self` guarantees exclusive access to every resource.
        let (value, added, changed) = unsafe { data.get_with_ticks_unchecked::<R>()? };
        Some(Mut::new(value, added, changed, last_run, this_run))
    }

    /// Resource `R`.
    ///
    /// ## Panics
    /// Panics if `R` does not exist.
    #[track_caller]
    pub fn resource<R: Resource>(&self) -> &R {
        match self.get_resource::<R>() {
            Some(value) => value,
            None => missing_resource::<R>(),
        }
    }

    /// Change-detecting mutable access to resource `R`.
    ///
    /// ## Panics
    /// Panics if `R` does not exist.
    #[track_caller]
    pub fn resource_mut<R: Resource>(&mut self) -> Mut<'_, R> {
        match self.get_resource_mut::<R>() {
            Some(value) => value,
            None => missing_resource::<R>(),
        }
    }

    // ───────────────────────────── events ─────────────────────────────

    /// Registers event type `E` by inserting its [`Events`] resource.
    pub fn add_event<E: Event>(&mut self) {
        self.init_resource::<Events<E>>();
    }

    /// Sends `event`. Returns `None` if `E` was never added.
    pub fn send_event<E: Event>(&mut self, event: E) -> Option<EventId> {
        match self.get_resource_mut::<Events<E>>() {
            Some(mut events) => Some(events.send(event)),
            None => {
                tracing::warn!(
                    event = std::any::type_name::<E>(),
                    "dropped event: event type was never added to the world"
                );
                None
            }
        }
    }

    /// Cursor that observes every event still buffered for `E`.
    pub fn get_event_cursor<E: Event>(&self) -> EventCursor<E> {
        EventCursor::default()
    }

    /// Cursor that observes only events sent after this call.
    pub fn get_event_cursor_current<E: Event>(&self) -> EventCursor<E> {
        self.get_resource::<Events<E>>()
            .map_or_else(EventCursor::default, Events::get_cursor_current)
    }

    // ───────────────────────────── systems ─────────────────────────────

    /// Initializes and runs `system` once, applying its commands.
    pub fn run_system_once<Out, Marker, T: IntoSystem<Out, Marker>>(&mut self, system: T) -> Out {
        run_system_once(self, system)
    }

    // ───────────────────────────── cells ─────────────────────────────

    /// Exclusive view usable by systems.
    #[inline]
    pub fn as_unsafe_world_cell(&mut self) -> UnsafeWorldCell<'_> {
        UnsafeWorldCell::new_mutable(self)
    }

    /// Shared view usable by read-only systems.
    #[inline]
    pub fn as_unsafe_world_cell_readonly(&self) -> UnsafeWorldCell<'_> {
        UnsafeWorldCell::new_readonly(self)
    }
}

#[cold]
#[track_caller]
fn missing_resource<R: Resource>() -> ! {
    panic!(
        "requested resource `{}` does not exist in the world; insert or init it first",
        std::any::type_name::<R>()
    )
}

// ───────────────────────────── structural helpers ─────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum MoveKind {
    Superset,
    Subset,
}

fn add_bundle_to_archetype(
    archetypes: &mut Archetypes,
    tables: &mut Tables,
    components: &Components,
    bundle: &BundleInfo,
    archetype_id: ArchetypeId,
) -> AddBundle {
    let current = &archetypes[archetype_id];
    if let Some(add) = current.edges().get_add_bundle(bundle.id()) {
        return add.clone();
    }

    let mut bundle_status = Vec::with_capacity(bundle.components().len());
    let mut new_table_components = Vec::new();
    let mut new_sparse_components = Vec::new();
    for &id in bundle.components() {
        if current.contains(id) {
            bundle_status.push(ComponentStatus::Mutated);
            continue;
        }
        bundle_status.push(ComponentStatus::Added);
        match components.get_info(id).map(|info| info.storage_type()) {
            Some(StorageType::SparseSet) => new_sparse_components.push(id),
            _ => new_table_components.push(id),
        }
    }

    let target = if new_table_components.is_empty() && new_sparse_components.is_empty() {
        archetype_id
    } else {
        let current_table_id = current.table_id();
        let mut table_components = current.table_components().to_vec();
        let mut sparse_components = current.sparse_set_components().to_vec();
        let table_id = if new_table_components.is_empty() {
            current_table_id
        } else {
            table_components.extend(new_table_components);
            table_components.sort_unstable();
            tables.get_id_or_insert(&table_components, components)
        };
        sparse_components.extend(new_sparse_components);
        sparse_components.sort_unstable();
        archetypes.get_id_or_insert(table_id, table_components, sparse_components)
    };

    let add = AddBundle { archetype_id: target, bundle_status };
    archetypes[archetype_id].edges_mut().insert_add_bundle(bundle.id(), add.clone());
    add
}

fn remove_bundle_from_archetype(
    archetypes: &mut Archetypes,
    tables: &mut Tables,
    components: &Components,
    bundle: &BundleInfo,
    archetype_id: ArchetypeId,
) -> ArchetypeId {
    let current = &archetypes[archetype_id];
    if let Some(target) = current.edges().get_remove_bundle(bundle.id()) {
        return target;
    }

    let keep = |id: &ComponentId| !bundle.components().contains(id);
    let table_components: Vec<ComponentId> =
        current.table_components().iter().copied().filter(keep).collect();
    let sparse_components: Vec<ComponentId> =
        current.sparse_set_components().iter().copied().filter(keep).collect();

    let target = if table_components.len() == current.table_components().len()
        && sparse_components.len() == current.sparse_set_components().len()
    {
        archetype_id
    } else {
        let table_id = if table_components.len() == current.table_components().len() {
            current.table_id()
        } else {
            tables.get_id_or_insert(&table_components, components)
        };
        archetypes.get_id_or_insert(table_id, table_components, sparse_components)
    };

    archetypes[archetype_id].edges_mut().insert_remove_bundle(bundle.id(), target);
    target
}

#[allow(clippy::too_many_arguments)]
fn write_bundle<B: Bundle>(
    table: &mut Table,
    sparse_sets: &mut SparseSets,
    components: &Components,
    entity: Entity,
    table_row: TableRow,
    bundle_info: &BundleInfo,
    bundle_status: &[ComponentStatus],
    bundle: B,
    change_tick: Tick,
) {
    let ids = bundle_info.components();
    let mut index = 0;
    bundle.get_components(&mut |storage_type, value| {
        let id = ids[index];
        let status = bundle_status[index];
        index += 1;
        match (storage_type, status) {
            (StorageType::Table, ComponentStatus::Added) => {
                table.push_component(id, value, change_tick);
            }
            (StorageType::Table, ComponentStatus::Mutated) => {
                table.replace_component(id, table_row, value, change_tick);
            }
            (StorageType::SparseSet, _) => {
                if let Some(info) = components.get_info(id) {
                    sparse_sets.get_or_insert(info).insert(entity, value, change_tick);
                }
            }
        }
    });
}

/// Moves `entity` from `location` into `new_archetype_id`.
///
/// Returns the new location and, for subset moves, the values of table
/// columns the destination lacks. Added columns are left for the caller.
fn move_entity(
    entities: &mut Entities,
    archetypes: &mut Archetypes,
    tables: &mut Tables,
    entity: Entity,
    location: EntityLocation,
    new_archetype_id: ArchetypeId,
    kind: MoveKind,
) -> (EntityLocation, Vec<(ComponentId, Box<dyn Any + Send>)>) {
    let removed = archetypes[location.archetype_id].swap_remove(location.archetype_row);
    if let Some(swapped) = removed.swapped_entity {
        update_swapped_archetype_row(entities, swapped, location);
    }

    let new_table_id = archetypes[new_archetype_id].table_id();
    let mut leftovers = Vec::new();
    let new_table_row = if new_table_id == location.table_id {
        location.table_row
    } else {
        let (old_table, new_table) = tables.get_2_mut(location.table_id, new_table_id);
        let result = match kind {
            MoveKind::Superset => old_table.move_to_superset_unchecked(location.table_row, new_table),
            MoveKind::Subset => {
                let (result, values) = old_table.move_to_subset_unchecked(location.table_row, new_table);
                leftovers = values;
                result
            }
        };
        if let Some(swapped) = result.swapped_entity {
            update_swapped_table_row(entities, archetypes, swapped, location.table_row);
        }
        result.new_row
    };

    let archetype_row = archetypes[new_archetype_id].allocate(entity, new_table_row);
    let new_location = EntityLocation {
        archetype_id: new_archetype_id,
        archetype_row,
        table_id: new_table_id,
        table_row: new_table_row,
    };
    entities.set(entity.index(), new_location);
    (new_location, leftovers)
}

fn update_swapped_archetype_row(entities: &mut Entities, swapped: Entity, vacated: EntityLocation) {
    if let Some(mut swapped_location) = entities.get(swapped) {
        swapped_location.archetype_row = vacated.archetype_row;
        entities.set(swapped.index(), swapped_location);
    }
}

fn update_swapped_table_row(
    entities: &mut Entities,
    archetypes: &mut Archetypes,
    swapped: Entity,
    table_row: TableRow,
) {
    if let Some(mut swapped_location) = entities.get(swapped) {
        swapped_location.table_row = table_row;
        archetypes[swapped_location.archetype_id]
            .set_entity_table_row(swapped_location.archetype_row, table_row);
        entities.set(swapped.index(), swapped_location);
    }
}

// ───────────────────────────── UnsafeWorldCell ─────────────────────────────

/// Copyable, lifetime-bound pointer to a world with interior access.
///
/// Systems receive this instead of `&mut World` so several of them can hold
/// a view at once. Every accessor that reaches component or resource data is
/// `unsafe`: the caller must have registered the matching access in its
/// [`FilteredAccessSet`](crate::engine::access::FilteredAccessSet) and the
/// scheduler must have proven that no conflicting access is live.
#[derive(Clone, Copy)]
pub struct UnsafeWorldCell<'w>(*mut World, PhantomData<(&'w World, &'w std::cell::UnsafeCell<World>)>);

// SAFETY: the access rules enforced by the scheduler serialize every
// conflicting use of the pointed-to world.
unsafe impl Send for UnsafeWorldCell<'_> {}
// SAFETY: see above.
unsafe impl Sync for UnsafeWorldCell<'_> {}

impl<'w> UnsafeWorldCell<'w> {
    #[inline]
    pub(crate) fn new_mutable(world: &'w mut World) -> Self {
        Self(world as *mut World, PhantomData)
    }

    #[inline]
    pub(crate) fn new_readonly(world: &'w World) -> Self {
        Self(world as *const World as *mut World, PhantomData)
    }

    /// Shared world reference.
    ///
    /// # Safety
    /// No `&mut World` obtained from this cell may be live, and data reads
    /// must be covered by the caller's declared access.
    #[inline]
    pub unsafe fn world(self) -> &'w World {
        // SAFETY: forwarded to the caller.
        unsafe { &*self.0 }
    }

    /// Exclusive world reference.
    ///
    /// # Safety
    /// The cell must have been created from `&mut World`, and no other
    /// reference derived from it may be live.
    #[inline]
    pub unsafe fn world_mut(self) -> &'w mut World {
        // SAFETY: forwarded to the caller.
        unsafe { &mut *self.0 }
    }

    #[inline]
    fn metadata(self) -> &'w World {
        // SAFETY: metadata (registries, allocator, archetypes) only changes
        // through `&mut World`, which is never live while systems hold cells.
        unsafe { &*self.0 }
    }

    /// Id of the world.
    #[inline]
    pub fn id(self) -> WorldId {
        self.metadata().id
    }

    /// Entity allocator.
    #[inline]
    pub fn entities(self) -> &'w Entities {
        &self.metadata().entities
    }

    /// Component registry.
    #[inline]
    pub fn components(self) -> &'w Components {
        &self.metadata().components
    }

    /// Archetype arena.
    #[inline]
    pub fn archetypes(self) -> &'w Archetypes {
        &self.metadata().archetypes
    }

    /// Storage of the world.
    ///
    /// # Safety
    /// Data reached through the returned reference must be covered by the
    /// caller's declared access.
    #[inline]
    pub unsafe fn storages(self) -> &'w Storages {
        &self.metadata().storages
    }

    /// Current change tick.
    #[inline]
    pub fn change_tick(self) -> Tick {
        self.metadata().change_tick()
    }

    /// Advances the change tick, returning the value before the increment.
    #[inline]
    pub fn increment_change_tick(self) -> Tick {
        self.metadata().increment_change_tick()
    }

    /// Change tick at the end of the last schedule run.
    #[inline]
    pub fn last_change_tick(self) -> Tick {
        self.metadata().last_change_tick
    }

    /// Resource `id` downcast to `R`, with its ticks.
    ///
    /// # Safety
    /// The caller must hold read access to `id`.
    #[inline]
    pub unsafe fn get_resource_with_ticks<R: Resource>(
        self,
        id: ComponentId,
    ) -> Option<(&'w R, &'w Tick, &'w Tick)> {
        // SAFETY: forwarded to the caller.
        unsafe { self.storages() }.resources.get(id)?.get_with_ticks::<R>()
    }

    /// Resource `id` downcast to `R`, mutably, with its ticks.
    ///
    /// # Safety
    /// The caller must hold write access to `id`.
    #[inline]
    pub unsafe fn get_resource_mut_with_ticks<R: Resource>(
        self,
        id: ComponentId,
    ) -> Option<(&'w mut R, &'w Tick, &'w mut Tick)> {
        // SAFETY: forwarded to the caller.
        unsafe { self.storages().resources.get(id)?.get_with_ticks_unchecked::<R>() }
    }
}

impl std::fmt::Debug for UnsafeWorldCell<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("UnsafeWorldCell").field(&self.id()).finish()
    }
}
