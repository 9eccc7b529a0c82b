//! Run conditions: read-only boolean systems that gate whether a system or
//! set runs during a schedule pass.
//!
//! Conditions compose with [`Condition::and`], [`Condition::or`] and
//! friends. `and`/`or`/`nand`/`nor` short-circuit: the right operand is not
//! run when the left one decides the result.

use std::borrow::Cow;

use crate::engine::system::{
    AndThen, BoxedCondition, CombinatorSystem, IntoSystem, Nand, Nor, NotSystem, OrElse, ReadOnlySystem,
    System, Xnor, Xor,
};


/// A read-only system returning `bool`, usable with `run_if`.
pub trait Condition<Marker>: IntoSystem<bool, Marker, System = Self::ReadOnlySystem> {
    /// The concrete condition system.
    type ReadOnlySystem: ReadOnlySystem<Out = bool>;

    /// True when both are true; `other` is skipped when `self` is false.
    fn and<M, C: Condition<M>>(self, other: C) -> AndThen<Self::System, C::System> {
        combine::<_, _, _, Marker, M>(self, other, "&&")
    }

    /// True unless both are true; `other` is skipped when `self` is false.
    fn nand<M, C: Condition<M>>(self, other: C) -> Nand<Self::System, C::System> {
        combine::<_, _, _, Marker, M>(self, other, "nand")
    }

    /// True when either is true; `other` is skipped when `self` is true.
    fn or<M, C: Condition<M>>(self, other: C) -> OrElse<Self::System, C::System> {
        combine::<_, _, _, Marker, M>(self, other, "||")
    }

    /// True when neither is true; `other` is skipped when `self` is true.
    fn nor<M, C: Condition<M>>(self, other: C) -> Nor<Self::System, C::System> {
        combine::<_, _, _, Marker, M>(self, other, "nor")
    }

    /// True when exactly one is true. Both always run.
    fn xor<M, C: Condition<M>>(self, other: C) -> Xor<Self::System, C::System> {
        combine::<_, _, _, Marker, M>(self, other, "^")
    }

    /// True when both agree. Both always run.
    fn xnor<M, C: Condition<M>>(self, other: C) -> Xnor<Self::System, C::System> {
        combine::<_, _, _, Marker, M>(self, other, "xnor")
    }
}

impl<Marker, F> Condition<Marker> for F
where
    F: IntoSystem<bool, Marker>,
    F::System: ReadOnlySystem,
{
    type ReadOnlySystem = F::System;
}

fn combine<Func, A, B, Ma, Mb>(a: A, b: B, op: &str) -> CombinatorSystem<Func, A::System, B::System>
where
    A: Condition<Ma>,
    B: Condition<Mb>,
{
    let a = IntoSystem::into_system(a);
    let b = IntoSystem::into_system(b);
    let name = format!("{} {op} {}", a.name(), b.name());
    CombinatorSystem::new(a, b, Cow::Owned(name))
}

/// Negates a condition.
///
/// ```ignore
/// schedule.add_systems(regrow.run_if(not(resource_exists::<Drought>)));
/// ```
pub fn not<Marker, T: Condition<Marker>>(condition: T) -> NotSystem<T::System> {
    NotSystem::new(IntoSystem::into_system(condition))
}

/// Boxes a condition for storage in a schedule.
#[track_caller]
pub(crate) fn new_condition<M>(condition: impl Condition<M>) -> BoxedCondition {
    let condition_system = IntoSystem::into_system(condition);
    assert!(
        !condition_system.has_deferred(),
        "run condition {} has deferred buffers; conditions cannot use Commands",
        condition_system.name(),
    );
    Box::new(condition_system)
}

/// Frequently used run conditions.
pub mod common_conditions {
    use crate::engine::change::Res;
    use crate::engine::component::{Component, Resource};
    use crate::engine::event::{Event, EventReader};
    use crate::engine::query::With;
    use crate::engine::system::Query;

    /// True on the first evaluation only.
    pub fn run_once() -> impl FnMut() -> bool + Clone {
        let mut has_run = false;
        move || {
            if has_run {
                false
            } else {
                has_run = true;
                true
            }
        }
    }

    /// True if resource `T` exists.
    pub fn resource_exists<T: Resource>(res: Option<Res<T>>) -> bool {
        res.is_some()
    }

    /// True if resource `T` equals `value`. Panics if `T` is missing.
    pub fn resource_equals<T: Resource + PartialEq>(value: T) -> impl FnMut(Res<T>) -> bool {
        move |res: Res<T>| *res == value
    }

    /// True if resource `T` exists and equals `value`.
    pub fn resource_exists_and_equals<T: Resource + PartialEq>(value: T) -> impl FnMut(Option<Res<T>>) -> bool {
        move |res: Option<Res<T>>| res.is_some_and(|res| *res == value)
    }

    /// True if resource `T` changed since the condition last ran. Panics if
    /// `T` is missing.
    pub fn resource_changed<T: Resource>(res: Res<T>) -> bool {
        res.is_changed()
    }

    /// True if resource `T` was inserted since the condition last ran.
    pub fn resource_added<T: Resource>(res: Option<Res<T>>) -> bool {
        res.is_some_and(|res| res.is_added())
    }

    /// True if events of type `E` arrived since the condition last ran.
    /// Consumes them from the condition's own cursor.
    pub fn on_event<E: Event>() -> impl FnMut(EventReader<E>) -> bool + Clone {
        |mut reader: EventReader<E>| reader.read().count() > 0
    }

    /// True if any entity has a `T`.
    pub fn any_with_component<T: Component>(query: Query<(), With<T>>) -> bool {
        !query.is_empty()
    }
}
