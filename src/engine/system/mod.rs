//! # Systems
//!
//! The execution units of the engine.
//!
//! ## Purpose
//! A system is logic that runs against the world once per schedule run. It
//! declares what it touches so the scheduler can order it, detect
//! ambiguities and run compatible systems side by side.
//!
//! ## Design
//! - Plain functions become systems through [`IntoSystem`]. Each argument is
//!   a [`SystemParam`]; the function's access is the union of its
//!   parameters' accesses, registered once in [`System::initialize`].
//! - Functions whose first argument is `&mut World` become exclusive
//!   systems. They run alone, with every deferred buffer applied.
//! - Commands are buffered per system and applied at [`ApplyDeferred`] sync
//!   points, never while other systems hold pointers into storage.
//! - Boolean systems combine into run conditions through
//!   [`CombinatorSystem`] and [`NotSystem`].
//!
//! ## Example
//! ```ignore
//! fn movement(mut query: Query<(&mut Position, &Velocity)>, time: Res<Step>) {
//!     for (mut position, velocity) in query.iter_mut() {
//!         position.0 += velocity.0 * time.0;
//!     }
//! }
//!
//! let mut system = IntoSystem::into_system(movement);
//! system.initialize(&mut world);
//! system.run(&mut world);
//! ```

mod combinator;
mod exclusive;
mod function_system;
mod param;
mod query;
#[allow(clippy::module_inception)]
mod system;

pub use combinator::{
    AndMarker, AndThen, CombinatorSystem, Combine, Nand, NandMarker, Nor, NorMarker, NotSystem, OrElse,
    OrMarker, Xnor, XnorMarker, Xor, XorMarker,
};
pub use exclusive::{
    is_apply_deferred, ApplyDeferred, ExclusiveFunctionSystem, ExclusiveSystemParam,
    ExclusiveSystemParamFunction, ExclusiveSystemParamItem, IsExclusiveFunctionSystem,
};
pub use function_system::{FunctionSystem, IsFunctionSystem, SystemParamFunction};
pub use param::{Local, ReadOnlySystemParam, SystemMeta, SystemParam, SystemParamItem};
pub use query::Query;
pub use system::{
    BoxedCondition, BoxedReadOnlySystem, BoxedSystem, IntoSystem, IntoSystemResult, ReadOnlySystem,
    ResultSystem, ScheduleSystem, System,
};

pub(crate) use system::{check_system_change_tick, run_system_once};
