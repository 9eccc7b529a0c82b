//! The [`System`] trait and conversions into it.

use std::any::TypeId;
use std::borrow::Cow;

use crate::engine::access::{Access, FilteredAccessSet};
use crate::engine::change::Tick;
use crate::engine::error::BoxedError;
use crate::engine::schedule::InternedSystemSet;
use crate::engine::world::{UnsafeWorldCell, World};


/// A unit of logic the scheduler can run against a [`World`].
///
/// ## Purpose
/// A system declares the components and resources it touches through its
/// [`FilteredAccessSet`], which the scheduler uses to detect ambiguities and
/// to decide which systems may share a parallel stage.
///
/// ## Lifecycle
/// 1. [`System::initialize`] registers component ids and builds parameter
///    state. It runs once per world before the first run.
/// 2. [`System::run_unsafe`] or [`System::run`] executes the body.
/// 3. [`System::apply_deferred`] applies buffered commands at a sync point.
///
/// Systems must be `Send + Sync` so stages can run on worker threads.
pub trait System: Send + Sync + 'static {
    /// Value returned by one run.
    type Out;

    /// Name used in logs, errors and ambiguity reports.
    fn name(&self) -> Cow<'static, str>;

    /// Type of the underlying system, preserved through adapters.
    fn system_type_id(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    /// Combined access over all parameters.
    fn component_access(&self) -> &Access {
        self.component_access_set().combined_access()
    }

    /// Per-parameter filtered accesses.
    fn component_access_set(&self) -> &FilteredAccessSet;

    /// Returns `true` if the system needs `&mut World`.
    fn is_exclusive(&self) -> bool;

    /// Returns `true` if the system buffers commands.
    fn has_deferred(&self) -> bool;

    /// Runs the system body.
    ///
    /// # Safety
    /// The caller must ensure that no other live borrow of `world` conflicts
    /// with this system's declared access, and that [`System::initialize`]
    /// ran on the same world.
    unsafe fn run_unsafe(&mut self, world: UnsafeWorldCell<'_>) -> Self::Out;

    /// Runs the system with exclusive access, then applies its commands.
    fn run(&mut self, world: &mut World) -> Self::Out {
        let world_cell = world.as_unsafe_world_cell();
        // SAFETY: `world` is borrowed exclusively for the whole run.
        let out = unsafe { self.run_unsafe(world_cell) };
        self.apply_deferred(world);
        out
    }

    /// Applies buffered commands.
    fn apply_deferred(&mut self, world: &mut World);

    /// Builds parameter state. Idempotent for the same world.
    fn initialize(&mut self, world: &mut World);

    /// Clamps the last-run tick so it never ages past [`Tick::MAX`].
    fn check_change_tick(&mut self, change_tick: Tick);

    /// Sets this system joins by default, such as its function's type set.
    fn default_system_sets(&self) -> Vec<InternedSystemSet> {
        Vec::new()
    }

    /// Tick at the start of the last run.
    fn get_last_run(&self) -> Tick;

    /// Overrides the last-run tick.
    fn set_last_run(&mut self, last_run: Tick);
}

/// A [`System`] whose parameters only read.
///
/// # Safety
/// The system must not write component or resource data, or buffer commands.
pub unsafe trait ReadOnlySystem: System {
    /// Runs the system through a shared world borrow.
    fn run_readonly(&mut self, world: &World) -> Self::Out {
        let world = world.as_unsafe_world_cell_readonly();
        // SAFETY: the system only reads, and readers may alias.
        unsafe { self.run_unsafe(world) }
    }
}

/// Boxed system.
pub type BoxedSystem<Out = ()> = Box<dyn System<Out = Out>>;

/// Boxed read-only system.
pub type BoxedReadOnlySystem<Out> = Box<dyn ReadOnlySystem<Out = Out>>;

/// System as stored in a schedule: any body result normalized to `Result`.
pub type ScheduleSystem = BoxedSystem<Result<(), BoxedError>>;

/// Run condition as stored in a schedule.
pub type BoxedCondition = BoxedReadOnlySystem<bool>;

impl<Out: 'static> std::fmt::Debug for dyn System<Out = Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("name", &self.name())
            .field("is_exclusive", &self.is_exclusive())
            .field("has_deferred", &self.has_deferred())
            .finish_non_exhaustive()
    }
}

/// Conversion into a [`System`].
///
/// `Marker` disambiguates the blanket implementations for functions,
/// exclusive functions and ready-made systems.
pub trait IntoSystem<Out, Marker>: Sized {
    /// The produced system.
    type System: System<Out = Out>;

    /// Converts `this` into a system.
    fn into_system(this: Self) -> Self::System;

    /// Type id of the produced system.
    fn system_type_id(&self) -> TypeId {
        TypeId::of::<Self::System>()
    }
}

impl<Out, S: System<Out = Out>> IntoSystem<Out, ()> for S {
    type System = S;

    fn into_system(this: Self) -> S {
        this
    }
}

/// Return types a schedule accepts from a system body.
pub trait IntoSystemResult: 'static {
    /// Normalizes the value.
    fn into_system_result(self) -> Result<(), BoxedError>;
}

impl IntoSystemResult for () {
    #[inline]
    fn into_system_result(self) -> Result<(), BoxedError> {
        Ok(())
    }
}

impl<E: Into<BoxedError> + 'static> IntoSystemResult for Result<(), E> {
    #[inline]
    fn into_system_result(self) -> Result<(), BoxedError> {
        self.map_err(Into::into)
    }
}

/// Adapter that normalizes a system's output into `Result<(), BoxedError>`.
pub struct ResultSystem<S> {
    system: S,
}

impl<S: System> ResultSystem<S>
where
    S::Out: IntoSystemResult,
{
    /// Wraps `system`.
    pub fn new(system: S) -> Self {
        Self { system }
    }
}

impl<S: System> System for ResultSystem<S>
where
    S::Out: IntoSystemResult,
{
    type Out = Result<(), BoxedError>;

    fn name(&self) -> Cow<'static, str> {
        self.system.name()
    }

    fn system_type_id(&self) -> TypeId {
        self.system.system_type_id()
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

    unsafe fn run_unsafe(&mut self, world: UnsafeWorldCell<'_>) -> Self::Out {
        // SAFETY: forwarded to the caller.
        unsafe { self.system.run_unsafe(world) }.into_system_result()
    }

    fn run(&mut self, world: &mut World) -> Self::Out {
        self.system.run(world).into_system_result()
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

/// Clamps `last_run` against `this_run`, logging when it had gone stale.
pub(crate) fn check_system_change_tick(last_run: &mut Tick, this_run: Tick, system_name: &str) {
    if last_run.check_tick(this_run) {
        let age = this_run.relative_to(*last_run).get();
        tracing::warn!(
            system = system_name,
            age,
            "system has not run for a long time; changes older than the maximum change age are not observed",
        );
    }
}

/// Runs `system` once against `world`, initializing it first.
pub(crate) fn run_system_once<Out, Marker, T: IntoSystem<Out, Marker>>(world: &mut World, system: T) -> Out {
    let mut system = IntoSystem::into_system(system);
    system.initialize(world);
    system.run(world)
}
