//! Exclusive systems: functions taking `&mut World`, and the
//! [`ApplyDeferred`] sync point.

use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::OnceLock;

use crate::engine::access::FilteredAccessSet;
use crate::engine::change::Tick;
use crate::engine::schedule::{InternedSystemSet, SystemSet, SystemTypeSet};
use crate::engine::system::system::check_system_change_tick;
use crate::engine::system::{IntoSystem, Local, System, SystemMeta};
use crate::engine::world::{FromWorld, UnsafeWorldCell, World, WorldId};


/// Parameter an exclusive system can take next to `&mut World`.
///
/// Only state owned by the system qualifies; world data is reached through
/// the world reference itself.
pub trait ExclusiveSystemParam: Sized {
    /// Per-system state kept between runs.
    type State: Send + Sync + 'static;

    /// The parameter with the state lifetime applied.
    type Item<'s>: ExclusiveSystemParam<State = Self::State>;

    /// Builds the state.
    fn init(world: &mut World, system_meta: &mut SystemMeta) -> Self::State;

    /// Fetches the parameter for one run.
    fn get_param<'s>(state: &'s mut Self::State, system_meta: &SystemMeta) -> Self::Item<'s>;
}

/// Item of exclusive parameter `P`.
pub type ExclusiveSystemParamItem<'s, P> = <P as ExclusiveSystemParam>::Item<'s>;

impl<'a, T: FromWorld + Send + Sync + 'static> ExclusiveSystemParam for Local<'a, T> {
    type State = T;
    type Item<'s> = Local<'s, T>;

    fn init(world: &mut World, _system_meta: &mut SystemMeta) -> T {
        T::from_world(world)
    }

    fn get_param<'s>(state: &'s mut T, _system_meta: &SystemMeta) -> Local<'s, T> {
        Local(state)
    }
}

macro_rules! impl_exclusive_system_param_tuple {
    ($($param:ident),*) => {
        #[allow(non_snake_case, unused_variables, clippy::unused_unit)]
        impl<$($param: ExclusiveSystemParam),*> ExclusiveSystemParam for ($($param,)*) {
            type State = ($($param::State,)*);
            type Item<'s> = ($($param::Item<'s>,)*);

            fn init(world: &mut World, system_meta: &mut SystemMeta) -> Self::State {
                ($($param::init(world, system_meta),)*)
            }

            fn get_param<'s>(state: &'s mut Self::State, system_meta: &SystemMeta) -> Self::Item<'s> {
                let ($($param,)*) = state;
                ($($param::get_param($param, system_meta),)*)
            }
        }
    };
}

impl_exclusive_system_param_tuple!();
impl_exclusive_system_param_tuple!(P0);
impl_exclusive_system_param_tuple!(P0, P1);
impl_exclusive_system_param_tuple!(P0, P1, P2);
impl_exclusive_system_param_tuple!(P0, P1, P2, P3);

/// Marker for [`IntoSystem`] implementations on exclusive functions.
#[doc(hidden)]
pub struct IsExclusiveFunctionSystem;

/// A function taking `&mut World` followed by exclusive parameters.
pub trait ExclusiveSystemParamFunction<Marker>: Send + Sync + 'static {
    /// Return type of the function.
    type Out;

    /// Tuple of the parameters after `&mut World`.
    type Param: ExclusiveSystemParam;

    /// Calls the function.
    fn run(&mut self, world: &mut World, param_value: ExclusiveSystemParamItem<Self::Param>) -> Self::Out;
}

/// [`System`] running an [`ExclusiveSystemParamFunction`].
///
/// Declares write access to the whole world, so it never shares a stage.
pub struct ExclusiveFunctionSystem<Marker, F: ExclusiveSystemParamFunction<Marker>> {
    func: F,
    param_state: Option<<F::Param as ExclusiveSystemParam>::State>,
    system_meta: SystemMeta,
    world_id: Option<WorldId>,
    marker: PhantomData<fn() -> Marker>,
}

impl<Marker: 'static, F: ExclusiveSystemParamFunction<Marker>>
    IntoSystem<F::Out, (IsExclusiveFunctionSystem, Marker)> for F
{
    type System = ExclusiveFunctionSystem<Marker, F>;

    fn into_system(func: Self) -> Self::System {
        let mut system_meta = SystemMeta::new::<F>();
        system_meta.component_access_set.write_all();
        ExclusiveFunctionSystem { func, param_state: None, system_meta, world_id: None, marker: PhantomData }
    }
}

impl<Marker: 'static, F: ExclusiveSystemParamFunction<Marker>> System for ExclusiveFunctionSystem<Marker, F> {
    type Out = F::Out;

    #[inline]
    fn name(&self) -> Cow<'static, str> {
        self.system_meta.name.clone()
    }

    #[inline]
    fn component_access_set(&self) -> &FilteredAccessSet {
        &self.system_meta.component_access_set
    }

    #[inline]
    fn is_exclusive(&self) -> bool {
        true
    }

    #[inline]
    fn has_deferred(&self) -> bool {
        false
    }

    unsafe fn run_unsafe(&mut self, _world: UnsafeWorldCell<'_>) -> Self::Out {
        panic!("exclusive system {} cannot run through a shared world cell; use System::run", self.system_meta.name)
    }

    fn run(&mut self, world: &mut World) -> Self::Out {
        let Some(param_state) = self.param_state.as_mut() else {
            panic!("system {} was run before it was initialized; call System::initialize first", self.system_meta.name)
        };
        let system_meta = &mut self.system_meta;
        let func = &mut self.func;
        world.last_change_tick_scope(system_meta.last_run, |world| {
            let params = F::Param::get_param(param_state, system_meta);
            let out = func.run(world, params);
            world.flush();
            system_meta.last_run = world.increment_change_tick();
            out
        })
    }

    #[inline]
    fn apply_deferred(&mut self, _world: &mut World) {}

    fn initialize(&mut self, world: &mut World) {
        match self.world_id {
            Some(id) => assert_eq!(
                id,
                world.id(),
                "system {} was initialized with a different world than the one it runs on",
                self.system_meta.name,
            ),
            None => {
                self.world_id = Some(world.id());
                self.param_state = Some(F::Param::init(world, &mut self.system_meta));
            }
        }
        self.system_meta.last_run = world.change_tick().relative_to(Tick::MAX);
    }

    fn check_change_tick(&mut self, change_tick: Tick) {
        check_system_change_tick(&mut self.system_meta.last_run, change_tick, &self.system_meta.name);
    }

    fn default_system_sets(&self) -> Vec<InternedSystemSet> {
        vec![SystemTypeSet::<Self>::new().intern()]
    }

    #[inline]
    fn get_last_run(&self) -> Tick {
        self.system_meta.last_run
    }

    #[inline]
    fn set_last_run(&mut self, last_run: Tick) {
        self.system_meta.last_run = last_run;
    }
}

macro_rules! impl_exclusive_system_function {
    ($($param:ident),*) => {
        #[allow(non_snake_case)]
        impl<Out, Func, $($param: ExclusiveSystemParam),*> ExclusiveSystemParamFunction<fn(&mut World, $($param,)*) -> Out>
            for Func
        where
            Func: Send + Sync + 'static,
            for<'a> &'a mut Func: FnMut(&mut World, $($param),*) -> Out
                + FnMut(&mut World, $(ExclusiveSystemParamItem<$param>),*) -> Out,
            Out: 'static,
        {
            type Out = Out;
            type Param = ($($param,)*);

            #[inline]
            fn run(&mut self, world: &mut World, param_value: ExclusiveSystemParamItem<($($param,)*)>) -> Out {
                fn call_inner<Out, $($param,)*>(
                    mut f: impl FnMut(&mut World, $($param,)*) -> Out,
                    world: &mut World,
                    $($param: $param,)*
                ) -> Out {
                    f(world, $($param,)*)
                }
                let ($($param,)*) = param_value;
                call_inner(self, world, $($param),*)
            }
        }
    };
}

impl_exclusive_system_function!();
impl_exclusive_system_function!(P0);
impl_exclusive_system_function!(P0, P1);
impl_exclusive_system_function!(P0, P1, P2);
impl_exclusive_system_function!(P0, P1, P2, P3);

/// Sync point that applies every pending command buffer.
///
/// The executor recognizes it by type and applies the deferred buffers of
/// every system that ran before it; running it directly does nothing.
/// Schedules insert it automatically between a system with commands and
/// the systems ordered after it.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApplyDeferred;

fn empty_access() -> &'static FilteredAccessSet {
    static EMPTY: OnceLock<FilteredAccessSet> = OnceLock::new();
    EMPTY.get_or_init(FilteredAccessSet::default)
}

impl System for ApplyDeferred {
    type Out = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("apply_deferred")
    }

    fn component_access_set(&self) -> &FilteredAccessSet {
        empty_access()
    }

    fn is_exclusive(&self) -> bool {
        true
    }

    fn has_deferred(&self) -> bool {
        false
    }

    unsafe fn run_unsafe(&mut self, _world: UnsafeWorldCell<'_>) {}

    fn run(&mut self, _world: &mut World) {}

    fn apply_deferred(&mut self, _world: &mut World) {}

    fn initialize(&mut self, _world: &mut World) {}

    fn check_change_tick(&mut self, _change_tick: Tick) {}

    fn get_last_run(&self) -> Tick {
        Tick::new(0)
    }

    fn set_last_run(&mut self, _last_run: Tick) {}
}

/// Returns `true` if `system` is an [`ApplyDeferred`] sync point.
pub fn is_apply_deferred<Out: 'static>(system: &dyn System<Out = Out>) -> bool {
    system.system_type_id() == std::any::TypeId::of::<ApplyDeferred>()
}
