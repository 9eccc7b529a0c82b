//! # System Parameters
//!
//! Types a function system may take as arguments.
//!
//! ## Purpose
//! Each parameter type knows how to register its access when the system is
//! initialized and how to fetch itself from an
//! [`UnsafeWorldCell`](crate::engine::world::UnsafeWorldCell) when the system
//! runs. A system's access is the union of its parameters' accesses, so user
//! code never writes an [`Access`](crate::engine::access::Access) by hand.
//!
//! ## Design
//! - Parameters keep per-system state (`SystemParam::State`) such as a
//!   resource id, a [`QueryState`](crate::engine::query::QueryState) or a
//!   command queue.
//! - `init_state` panics if the new parameter conflicts with an earlier
//!   parameter of the same system, for example `Res<T>` next to `ResMut<T>`.
//! - Parameters that buffer work (`Commands`) flush it in
//!   [`SystemParam::apply`], which only runs at sync points.

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::engine::access::{FilteredAccess, FilteredAccessSet};
use crate::engine::change::{Res, ResMut, Tick, Ticks, TicksMut};
use crate::engine::commands::{CommandQueue, Commands};
use crate::engine::component::Resource;
use crate::engine::event::{Event, EventCursor, EventReader, EventWriter, Events};
use crate::engine::types::ComponentId;
use crate::engine::world::{FromWorld, UnsafeWorldCell, World};


/// Bookkeeping shared by a system and its parameters.
#[derive(Clone, Debug)]
pub struct SystemMeta {
    pub(crate) name: Cow<'static, str>,
    pub(crate) component_access_set: FilteredAccessSet,
    pub(crate) has_deferred: bool,
    pub(crate) last_run: Tick,
}

impl SystemMeta {
    pub(crate) fn new<T>() -> Self {
        Self {
            name: type_name::<T>().into(),
            component_access_set: FilteredAccessSet::default(),
            has_deferred: false,
            last_run: Tick::new(0),
        }
    }

    /// Name of the system.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accesses registered so far.
    #[inline]
    pub fn component_access_set(&self) -> &FilteredAccessSet {
        &self.component_access_set
    }

    /// Returns `true` if a parameter buffers commands.
    #[inline]
    pub fn has_deferred(&self) -> bool {
        self.has_deferred
    }

    /// Marks the system as buffering commands.
    #[inline]
    pub fn set_has_deferred(&mut self) {
        self.has_deferred = true;
    }
}

/// A value a system can request as an argument.
///
/// # Safety
/// `init_state` must register every component and resource `get_param`
/// touches in the system's [`FilteredAccessSet`], with the right
/// read/write mode.
pub unsafe trait SystemParam: Sized {
    /// Per-system state kept between runs.
    type State: Send + Sync + 'static;

    /// The parameter with world and state lifetimes applied.
    type Item<'world, 'state>: SystemParam<State = Self::State>;

    /// Registers access and builds the state.
    fn init_state(world: &mut World, system_meta: &mut SystemMeta) -> Self::State;

    /// Applies buffered work at a sync point.
    #[inline]
    #[allow(unused_variables)]
    fn apply(state: &mut Self::State, system_meta: &SystemMeta, world: &mut World) {}

    /// Fetches the parameter for one run.
    ///
    /// # Safety
    /// The caller must guarantee that the access registered by
    /// `init_state` is not violated by any other live borrow of `world`.
    unsafe fn get_param<'world, 'state>(
        state: &'state mut Self::State,
        system_meta: &SystemMeta,
        world: UnsafeWorldCell<'world>,
        change_tick: Tick,
    ) -> Self::Item<'world, 'state>;
}

/// A [`SystemParam`] that only reads.
///
/// # Safety
/// The parameter must not register any write access.
pub unsafe trait ReadOnlySystemParam: SystemParam {}

/// Item of parameter `P`.
pub type SystemParamItem<'w, 's, P> = <P as SystemParam>::Item<'w, 's>;

#[cold]
#[track_caller]
fn missing_resource<T>(system_name: &str) -> ! {
    panic!(
        "resource requested by {system_name} does not exist: {}; insert it or use Option<{}>",
        type_name::<T>(),
        type_name::<T>(),
    )
}

fn init_resource_read<T: Resource>(world: &mut World, system_meta: &mut SystemMeta) -> ComponentId {
    let component_id = world.components.init_resource::<T>();
    let combined_access = system_meta.component_access_set.combined_access();
    assert!(
        !combined_access.has_write(component_id),
        "Res<{}> in system {} conflicts with a previous mutable access to the same resource",
        type_name::<T>(),
        system_meta.name,
    );
    system_meta.component_access_set.add_unfiltered_read(component_id);
    component_id
}

fn init_resource_write<T: Resource>(world: &mut World, system_meta: &mut SystemMeta) -> ComponentId {
    let component_id = world.components.init_resource::<T>();
    let combined_access = system_meta.component_access_set.combined_access();
    if combined_access.has_write(component_id) {
        panic!(
            "ResMut<{}> in system {} conflicts with a previous ResMut of the same resource",
            type_name::<T>(),
            system_meta.name,
        );
    } else if combined_access.has_read(component_id) {
        panic!(
            "ResMut<{}> in system {} conflicts with a previous Res of the same resource",
            type_name::<T>(),
            system_meta.name,
        );
    }
    system_meta.component_access_set.add_unfiltered_write(component_id);
    component_id
}

// SAFETY: registers a read of the resource id.
unsafe impl<'a, T: Resource> SystemParam for Res<'a, T> {
    type State = ComponentId;
    type Item<'w, 's> = Res<'w, T>;

    fn init_state(world: &mut World, system_meta: &mut SystemMeta) -> ComponentId {
        init_resource_read::<T>(world, system_meta)
    }

    #[inline]
    unsafe fn get_param<'w, 's>(
        &mut component_id: &'s mut ComponentId,
        system_meta: &SystemMeta,
        world: UnsafeWorldCell<'w>,
        change_tick: Tick,
    ) -> Res<'w, T> {
        // SAFETY: read access was registered in `init_state`.
        let Some((value, added, changed)) = (unsafe { world.get_resource_with_ticks::<T>(component_id) }) else {
            missing_resource::<T>(&system_meta.name)
        };
        Res { value, ticks: Ticks { added, changed, last_run: system_meta.last_run, this_run: change_tick } }
    }
}

// SAFETY: only reads.
unsafe impl<'a, T: Resource> ReadOnlySystemParam for Res<'a, T> {}

// SAFETY: registers a read of the resource id.
unsafe impl<'a, T: Resource> SystemParam for Option<Res<'a, T>> {
    type State = ComponentId;
    type Item<'w, 's> = Option<Res<'w, T>>;

    fn init_state(world: &mut World, system_meta: &mut SystemMeta) -> ComponentId {
        init_resource_read::<T>(world, system_meta)
    }

    #[inline]
    unsafe fn get_param<'w, 's>(
        &mut component_id: &'s mut ComponentId,
        system_meta: &SystemMeta,
        world: UnsafeWorldCell<'w>,
        change_tick: Tick,
    ) -> Option<Res<'w, T>> {
        // SAFETY: read access was registered in `init_state`.
        unsafe { world.get_resource_with_ticks::<T>(component_id) }.map(|(value, added, changed)| Res {
            value,
            ticks: Ticks { added, changed, last_run: system_meta.last_run, this_run: change_tick },
        })
    }
}

// SAFETY: only reads.
unsafe impl<'a, T: Resource> ReadOnlySystemParam for Option<Res<'a, T>> {}

// SAFETY: registers a write of the resource id.
unsafe impl<'a, T: Resource> SystemParam for ResMut<'a, T> {
    type State = ComponentId;
    type Item<'w, 's> = ResMut<'w, T>;

    fn init_state(world: &mut World, system_meta: &mut SystemMeta) -> ComponentId {
        init_resource_write::<T>(world, system_meta)
    }

    #[inline]
    unsafe fn get_param<'w, 's>(
        &mut component_id: &'s mut ComponentId,
        system_meta: &SystemMeta,
        world: UnsafeWorldCell<'w>,
        change_tick: Tick,
    ) -> ResMut<'w, T> {
        // SAFETY: write access was registered in `init_state`.
        let Some((value, added, changed)) = (unsafe { world.get_resource_mut_with_ticks::<T>(component_id) })
        else {
            missing_resource::<T>(&system_meta.name)
        };
        ResMut {
            value,
            ticks: TicksMut { added, changed, last_run: system_meta.last_run, this_run: change_tick },
        }
    }
}

// SAFETY: registers a write of the resource id.
unsafe impl<'a, T: Resource> SystemParam for Option<ResMut<'a, T>> {
    type State = ComponentId;
    type Item<'w, 's> = Option<ResMut<'w, T>>;

    fn init_state(world: &mut World, system_meta: &mut SystemMeta) -> ComponentId {
        init_resource_write::<T>(world, system_meta)
    }

    #[inline]
    unsafe fn get_param<'w, 's>(
        &mut component_id: &'s mut ComponentId,
        system_meta: &SystemMeta,
        world: UnsafeWorldCell<'w>,
        change_tick: Tick,
    ) -> Option<ResMut<'w, T>> {
        // SAFETY: write access was registered in `init_state`.
        unsafe { world.get_resource_mut_with_ticks::<T>(component_id) }.map(|(value, added, changed)| ResMut {
            value,
            ticks: TicksMut { added, changed, last_run: system_meta.last_run, this_run: change_tick },
        })
    }
}

/// Per-system value that persists between runs.
///
/// Each system gets its own instance, built with [`FromWorld`] when the
/// system is initialized.
pub struct Local<'s, T: FromWorld + Send + 'static>(pub(crate) &'s mut T);

impl<'s, T: FromWorld + Send + 'static> Deref for Local<'s, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.0
    }
}

impl<'s, T: FromWorld + Send + 'static> DerefMut for Local<'s, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        self.0
    }
}

impl<'s, T: FromWorld + Send + fmt::Debug + 'static> fmt::Debug for Local<'s, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Local").field(&self.0).finish()
    }
}

// SAFETY: only touches its own state.
unsafe impl<'a, T: FromWorld + Send + Sync + 'static> SystemParam for Local<'a, T> {
    type State = T;
    type Item<'w, 's> = Local<'s, T>;

    fn init_state(world: &mut World, _system_meta: &mut SystemMeta) -> T {
        T::from_world(world)
    }

    #[inline]
    unsafe fn get_param<'w, 's>(
        state: &'s mut T,
        _system_meta: &SystemMeta,
        _world: UnsafeWorldCell<'w>,
        _change_tick: Tick,
    ) -> Local<'s, T> {
        Local(state)
    }
}

// SAFETY: the state is owned by the system, not the world.
unsafe impl<'a, T: FromWorld + Send + Sync + 'static> ReadOnlySystemParam for Local<'a, T> {}

// SAFETY: reserves entities through the atomic allocator and registers no
// world access; the queue is applied with exclusive access.
unsafe impl SystemParam for Commands<'_, '_> {
    type State = CommandQueue;
    type Item<'w, 's> = Commands<'w, 's>;

    fn init_state(_world: &mut World, system_meta: &mut SystemMeta) -> CommandQueue {
        system_meta.set_has_deferred();
        CommandQueue::default()
    }

    fn apply(state: &mut CommandQueue, _system_meta: &SystemMeta, world: &mut World) {
        state.apply(world);
    }

    #[inline]
    unsafe fn get_param<'w, 's>(
        state: &'s mut CommandQueue,
        _system_meta: &SystemMeta,
        world: UnsafeWorldCell<'w>,
        _change_tick: Tick,
    ) -> Commands<'w, 's> {
        Commands::new_from_entities(state, world.entities())
    }
}

// SAFETY: registers a read of the `Events<E>` resource.
unsafe impl<E: Event> SystemParam for EventReader<'_, '_, E> {
    type State = (EventCursor<E>, ComponentId);
    type Item<'w, 's> = EventReader<'w, 's, E>;

    fn init_state(world: &mut World, system_meta: &mut SystemMeta) -> Self::State {
        (EventCursor::default(), init_resource_read::<Events<E>>(world, system_meta))
    }

    #[inline]
    unsafe fn get_param<'w, 's>(
        state: &'s mut Self::State,
        system_meta: &SystemMeta,
        world: UnsafeWorldCell<'w>,
        change_tick: Tick,
    ) -> EventReader<'w, 's, E> {
        let (cursor, component_id) = state;
        // SAFETY: read access was registered in `init_state`.
        let events = unsafe { <Res<'w, Events<E>> as SystemParam>::get_param(component_id, system_meta, world, change_tick) };
        EventReader { cursor, events }
    }
}

// SAFETY: only reads the events resource; the cursor is system state.
unsafe impl<E: Event> ReadOnlySystemParam for EventReader<'_, '_, E> {}

// SAFETY: registers a write of the `Events<E>` resource.
unsafe impl<E: Event> SystemParam for EventWriter<'_, E> {
    type State = ComponentId;
    type Item<'w, 's> = EventWriter<'w, E>;

    fn init_state(world: &mut World, system_meta: &mut SystemMeta) -> ComponentId {
        init_resource_write::<Events<E>>(world, system_meta)
    }

    #[inline]
    unsafe fn get_param<'w, 's>(
        component_id: &'s mut ComponentId,
        system_meta: &SystemMeta,
        world: UnsafeWorldCell<'w>,
        change_tick: Tick,
    ) -> EventWriter<'w, E> {
        // SAFETY: write access was registered in `init_state`.
        let events =
            unsafe { <ResMut<'w, Events<E>> as SystemParam>::get_param(component_id, system_meta, world, change_tick) };
        EventWriter { events }
    }
}

// SAFETY: registers a read of everything.
unsafe impl SystemParam for &'_ World {
    type State = ();
    type Item<'w, 's> = &'w World;

    fn init_state(_world: &mut World, system_meta: &mut SystemMeta) {
        let mut access = FilteredAccess::matches_everything();
        access.read_all();
        assert!(
            system_meta.component_access_set.get_conflicts_single(&access).is_empty(),
            "&World in system {} conflicts with a previous mutable system parameter",
            system_meta.name,
        );
        system_meta.component_access_set.add(access);
    }

    #[inline]
    unsafe fn get_param<'w, 's>(
        _state: &'s mut (),
        _system_meta: &SystemMeta,
        world: UnsafeWorldCell<'w>,
        _change_tick: Tick,
    ) -> &'w World {
        // SAFETY: read access to everything was registered in `init_state`.
        unsafe { world.world() }
    }
}

// SAFETY: only reads.
unsafe impl ReadOnlySystemParam for &'_ World {}

macro_rules! impl_system_param_tuple {
    ($($param:ident),*) => {
        #[allow(non_snake_case, unused_variables, clippy::unused_unit)]
        // SAFETY: every element registers its own access.
        unsafe impl<$($param: SystemParam),*> SystemParam for ($($param,)*) {
            type State = ($($param::State,)*);
            type Item<'w, 's> = ($($param::Item::<'w, 's>,)*);

            fn init_state(world: &mut World, system_meta: &mut SystemMeta) -> Self::State {
                ($($param::init_state(world, system_meta),)*)
            }

            fn apply(($($param,)*): &mut Self::State, system_meta: &SystemMeta, world: &mut World) {
                $($param::apply($param, system_meta, world);)*
            }

            #[inline]
            unsafe fn get_param<'w, 's>(
                state: &'s mut Self::State,
                system_meta: &SystemMeta,
                world: UnsafeWorldCell<'w>,
                change_tick: Tick,
            ) -> Self::Item<'w, 's> {
                let ($($param,)*) = state;
                // SAFETY: forwarded to the caller.
                unsafe { ($($param::get_param($param, system_meta, world, change_tick),)*) }
            }
        }

        // SAFETY: every element only reads.
        unsafe impl<$($param: ReadOnlySystemParam),*> ReadOnlySystemParam for ($($param,)*) {}
    };
}

impl_system_param_tuple!();
impl_system_param_tuple!(P0);
impl_system_param_tuple!(P0, P1);
impl_system_param_tuple!(P0, P1, P2);
impl_system_param_tuple!(P0, P1, P2, P3);
impl_system_param_tuple!(P0, P1, P2, P3, P4);
impl_system_param_tuple!(P0, P1, P2, P3, P4, P5);
impl_system_param_tuple!(P0, P1, P2, P3, P4, P5, P6);
impl_system_param_tuple!(P0, P1, P2, P3, P4, P5, P6, P7);
impl_system_param_tuple!(P0, P1, P2, P3, P4, P5, P6, P7, P8);
impl_system_param_tuple!(P0, P1, P2, P3, P4, P5, P6, P7, P8, P9);
impl_system_param_tuple!(P0, P1, P2, P3, P4, P5, P6, P7, P8, P9, P10);
impl_system_param_tuple!(P0, P1, P2, P3, P4, P5, P6, P7, P8, P9, P10, P11);
