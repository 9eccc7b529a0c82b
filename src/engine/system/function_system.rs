//! Systems built from plain functions whose arguments are [`SystemParam`]s.

use std::borrow::Cow;
use std::marker::PhantomData;

use crate::engine::access::FilteredAccessSet;
use crate::engine::change::Tick;
use crate::engine::schedule::{InternedSystemSet, SystemSet, SystemTypeSet};
use crate::engine::system::system::check_system_change_tick;
use crate::engine::system::{
    IntoSystem, ReadOnlySystem, ReadOnlySystemParam, System, SystemMeta, SystemParam, SystemParamItem,
};
use crate::engine::world::{UnsafeWorldCell, World, WorldId};


/// Marker for [`IntoSystem`] implementations on functions.
#[doc(hidden)]
pub struct IsFunctionSystem;

/// A function whose arguments can all be fetched as system parameters.
///
/// Implemented for functions and closures of up to twelve arguments.
/// `Marker` is the function's signature, used to keep the implementations
/// apart.
pub trait SystemParamFunction<Marker>: Send + Sync + 'static {
    /// Return type of the function.
    type Out;

    /// Tuple of the argument types.
    type Param: SystemParam;

    /// Calls the function with fetched parameters.
    fn run(&mut self, param_value: SystemParamItem<Self::Param>) -> Self::Out;
}

/// [`System`] running a [`SystemParamFunction`].
pub struct FunctionSystem<Marker, F: SystemParamFunction<Marker>> {
    func: F,
    param_state: Option<<F::Param as SystemParam>::State>,
    system_meta: SystemMeta,
    world_id: Option<WorldId>,
    marker: PhantomData<fn() -> Marker>,
}

#[cold]
#[track_caller]
fn uninitialized(system_name: &str) -> ! {
    panic!("system {system_name} was run before it was initialized; call System::initialize first")
}

impl<Marker, F: SystemParamFunction<Marker>> FunctionSystem<Marker, F> {
    /// Bookkeeping shared with the parameters.
    pub fn system_meta(&self) -> &SystemMeta {
        &self.system_meta
    }
}

impl<Marker: 'static, F: SystemParamFunction<Marker>> IntoSystem<F::Out, (IsFunctionSystem, Marker)> for F {
    type System = FunctionSystem<Marker, F>;

    fn into_system(func: Self) -> Self::System {
        FunctionSystem {
            func,
            param_state: None,
            system_meta: SystemMeta::new::<F>(),
            world_id: None,
            marker: PhantomData,
        }
    }
}

impl<Marker: 'static, F: SystemParamFunction<Marker>> System for FunctionSystem<Marker, F> {
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
        false
    }

    #[inline]
    fn has_deferred(&self) -> bool {
        self.system_meta.has_deferred
    }

    unsafe fn run_unsafe(&mut self, world: UnsafeWorldCell<'_>) -> Self::Out {
        let change_tick = world.increment_change_tick();
        let Some(param_state) = self.param_state.as_mut() else {
            uninitialized(&self.system_meta.name)
        };
        // SAFETY: the caller upholds the access registered at initialization.
        let params = unsafe { F::Param::get_param(param_state, &self.system_meta, world, change_tick) };
        let out = self.func.run(params);
        self.system_meta.last_run = change_tick;
        out
    }

    fn apply_deferred(&mut self, world: &mut World) {
        if let Some(param_state) = self.param_state.as_mut() {
            F::Param::apply(param_state, &self.system_meta, world);
        }
    }

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
                self.param_state = Some(F::Param::init_state(world, &mut self.system_meta));
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

// SAFETY: every parameter is read-only.
unsafe impl<Marker: 'static, F: SystemParamFunction<Marker>> ReadOnlySystem for FunctionSystem<Marker, F> where
    F::Param: ReadOnlySystemParam
{
}

macro_rules! impl_system_function {
    ($($param:ident),*) => {
        #[allow(non_snake_case)]
        impl<Out, Func, $($param: SystemParam),*> SystemParamFunction<fn($($param,)*) -> Out> for Func
        where
            Func: Send + Sync + 'static,
            for<'a> &'a mut Func: FnMut($($param),*) -> Out + FnMut($(SystemParamItem<$param>),*) -> Out,
            Out: 'static,
        {
            type Out = Out;
            type Param = ($($param,)*);

            #[inline]
            fn run(&mut self, param_value: SystemParamItem<($($param,)*)>) -> Out {
                // Forces the call through the `FnMut(SystemParamItem<..>)` bound.
                #[allow(clippy::too_many_arguments)]
                fn call_inner<Out, $($param,)*>(mut f: impl FnMut($($param,)*) -> Out, $($param: $param,)*) -> Out {
                    f($($param,)*)
                }
                let ($($param,)*) = param_value;
                call_inner(self, $($param),*)
            }
        }
    };
}

impl_system_function!();
impl_system_function!(P0);
impl_system_function!(P0, P1);
impl_system_function!(P0, P1, P2);
impl_system_function!(P0, P1, P2, P3);
impl_system_function!(P0, P1, P2, P3, P4);
impl_system_function!(P0, P1, P2, P3, P4, P5);
impl_system_function!(P0, P1, P2, P3, P4, P5, P6);
impl_system_function!(P0, P1, P2, P3, P4, P5, P6, P7);
impl_system_function!(P0, P1, P2, P3, P4, P5, P6, P7, P8);
impl_system_function!(P0, P1, P2, P3, P4, P5, P6, P7, P8, P9);
impl_system_function!(P0, P1, P2, P3, P4, P5, P6, P7, P8, P9, P10);
impl_system_function!(P0, P1, P2, P3, P4, P5, P6, P7, P8, P9, P10, P11);
