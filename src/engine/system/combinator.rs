//! Systems composed from other systems: boolean combinators and negation.
//!
//! Combinators evaluate their operands lazily so that `and`/`or` style
//! conditions short-circuit: the right operand does not run at all, and its
//! last-run tick is left untouched, when the left operand decides the result.

use std::any::TypeId;
use std::borrow::Cow;
use std::marker::PhantomData;

use crate::engine::access::FilteredAccessSet;
use crate::engine::change::Tick;
use crate::engine::schedule::InternedSystemSet;
use crate::engine::system::{ReadOnlySystem, System};
use crate::engine::world::{UnsafeWorldCell, World};


/// How a [`CombinatorSystem`] merges the outputs of its two operands.
///
/// Operands are passed as closures; an implementation that does not call
/// one skips running that system.
pub trait Combine<A: System, B: System> {
    /// Combined output.
    type Out;

    /// Combines the outputs.
    fn combine(a: impl FnOnce() -> A::Out, b: impl FnOnce() -> B::Out) -> Self::Out;
}

/// Two systems run as one, merged by `Func`.
pub struct CombinatorSystem<Func, A, B> {
    _marker: PhantomData<fn() -> Func>,
    a: A,
    b: B,
    name: Cow<'static, str>,
    component_access_set: FilteredAccessSet,
}

impl<Func, A: System, B: System> CombinatorSystem<Func, A, B> {
    /// Combines `a` and `b` under `name`.
    pub fn new(a: A, b: B, name: Cow<'static, str>) -> Self {
        Self { _marker: PhantomData, a, b, name, component_access_set: FilteredAccessSet::default() }
    }
}

impl<Func, A, B> System for CombinatorSystem<Func, A, B>
where
    Func: Combine<A, B> + 'static,
    A: System,
    B: System,
    Func::Out: 'static,
{
    type Out = Func::Out;

    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn component_access_set(&self) -> &FilteredAccessSet {
        &self.component_access_set
    }

    fn is_exclusive(&self) -> bool {
        self.a.is_exclusive() || self.b.is_exclusive()
    }

    fn has_deferred(&self) -> bool {
        self.a.has_deferred() || self.b.has_deferred()
    }

    unsafe fn run_unsafe(&mut self, world: UnsafeWorldCell<'_>) -> Self::Out {
        Func::combine(
            // SAFETY: the combined access covers both operands, and they run one after the other.
            || unsafe { self.a.run_unsafe(world) },
            // SAFETY: see above.
            || unsafe { self.b.run_unsafe(world) },
        )
    }

    fn run(&mut self, world: &mut World) -> Self::Out {
        let world_cell = world.as_unsafe_world_cell();
        let out = Func::combine(
            // SAFETY: `world` is borrowed exclusively and the operands run one after the other.
            || unsafe { self.a.run_unsafe(world_cell) },
            // SAFETY: see above.
            || unsafe { self.b.run_unsafe(world_cell) },
        );
        self.apply_deferred(world);
        out
    }

    fn apply_deferred(&mut self, world: &mut World) {
        self.a.apply_deferred(world);
        self.b.apply_deferred(world);
    }

    fn initialize(&mut self, world: &mut World) {
        self.a.initialize(world);
        self.b.initialize(world);
        self.component_access_set = self.a.component_access_set().clone();
        self.component_access_set.extend(self.b.component_access_set().clone());
    }

    fn check_change_tick(&mut self, change_tick: Tick) {
        self.a.check_change_tick(change_tick);
        self.b.check_change_tick(change_tick);
    }

    fn default_system_sets(&self) -> Vec<InternedSystemSet> {
        let mut default_sets = self.a.default_system_sets();
        default_sets.append(&mut self.b.default_system_sets());
        default_sets
    }

    fn get_last_run(&self) -> Tick {
        self.a.get_last_run()
    }

    fn set_last_run(&mut self, last_run: Tick) {
        self.a.set_last_run(last_run);
        self.b.set_last_run(last_run);
    }
}

// SAFETY: both operands are read-only.
unsafe impl<Func, A, B> ReadOnlySystem for CombinatorSystem<Func, A, B>
where
    Func: Combine<A, B> + 'static,
    A: ReadOnlySystem,
    B: ReadOnlySystem,
    Func::Out: 'static,
{
}

macro_rules! bool_combinator {
    ($(#[$meta:meta])* $marker:ident, $alias:ident, |$a:ident, $b:ident| $body:expr) => {
        $(#[$meta])*
        #[doc(hidden)]
        pub struct $marker;

        impl<A, B> Combine<A, B> for $marker
        where
            A: System<Out = bool>,
            B: System<Out = bool>,
        {
            type Out = bool;

            #[inline]
            fn combine($a: impl FnOnce() -> A::Out, $b: impl FnOnce() -> B::Out) -> bool {
                $body
            }
        }

        $(#[$meta])*
        pub type $alias<A, B> = CombinatorSystem<$marker, A, B>;
    };
}

bool_combinator!(
    /// `a && b`; `b` is skipped when `a` is false.
    AndMarker, AndThen, |a, b| a() && b()
);
bool_combinator!(
    /// `!(a && b)`; `b` is skipped when `a` is false.
    NandMarker, Nand, |a, b| !(a() && b())
);
bool_combinator!(
    /// `a || b`; `b` is skipped when `a` is true.
    OrMarker, OrElse, |a, b| a() || b()
);
bool_combinator!(
    /// `!(a || b)`; `b` is skipped when `a` is true.
    NorMarker, Nor, |a, b| !(a() || b())
);
bool_combinator!(
    /// `a ^ b`; both operands always run.
    XorMarker, Xor, |a, b| a() ^ b()
);
bool_combinator!(
    /// `!(a ^ b)`; both operands always run.
    XnorMarker, Xnor, |a, b| !(a() ^ b())
);

/// Negates a boolean system.
pub struct NotSystem<S> {
    system: S,
    name: Cow<'static, str>,
}

impl<S: System<Out = bool>> NotSystem<S> {
    /// Wraps `system`.
    pub fn new(system: S) -> Self {
        let name = Cow::Owned(format!("!{}", system.name()));
        Self { system, name }
    }
}

impl<S: System<Out = bool>> System for NotSystem<S> {
    type Out = bool;

    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn system_type_id(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    fn component_access_set(&self) -> &FilteredAccessSet {
        self.system.component_access_set()
    }

    fn is_exclusive(&self) -> bool {
        self.system.is_exclusive()
    }

    fn has_deferred(&self) -> bool {
        self.system.has_deferred()
    }

    unsafe fn run_unsafe(&mut self, world: UnsafeWorldCell<'_>) -> bool {
        // SAFETY: forwarded to the caller.
        !unsafe { self.system.run_unsafe(world) }
    }

    fn run(&mut self, world: &mut World) -> bool {
        !self.system.run(world)
    }

    fn apply_deferred(&mut self, world: &mut World) {
        self.system.apply_deferred(world);
    }

    fn initialize(&mut self, world: &mut World) {
        self.system.initialize(world);
    }

    fn check_change_tick(&mut self, change_tick: Tick) {
        self.system.check_change_tick(change_tick);
    }

    fn default_system_sets(&self) -> Vec<InternedSystemSet> {
        self.system.default_system_sets()
    }

    fn get_last_run(&self) -> Tick {
        self.system.get_last_run()
    }

    fn set_last_run(&mut self, last_run: Tick) {
        self.system.set_last_run(last_run);
    }
}

// SAFETY: forwards a read-only system.
unsafe impl<S: ReadOnlySystem<Out = bool>> ReadOnlySystem for NotSystem<S> {}
