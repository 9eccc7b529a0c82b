//! System sets: named groups of systems that share ordering and conditions.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use crate::engine::system::{
    ExclusiveFunctionSystem, ExclusiveSystemParamFunction, FunctionSystem, IsExclusiveFunctionSystem,
    IsFunctionSystem, SystemParamFunction,
};


/// Object-safe equality and hashing for [`SystemSet`] values.
///
/// Implemented for every `Eq + Hash` type; user code never implements it.
pub trait DynSystemSet: Send + Sync + 'static {
    /// The value as [`Any`].
    fn as_any(&self) -> &dyn Any;

    /// Compares with a value of any type.
    fn dyn_eq(&self, other: &dyn Any) -> bool;

    /// Hashes the value together with its type.
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<T: Eq + Hash + Send + Sync + 'static> DynSystemSet for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// A label grouping systems and other sets.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// enum Simulation { Sense, Act }
/// impl SystemSet for Simulation {}
///
/// schedule.configure_sets((Simulation::Sense, Simulation::Act).chain());
/// schedule.add_systems(forage.in_set(Simulation::Act));
/// ```
pub trait SystemSet: DynSystemSet + fmt::Debug {
    /// The system type this set stands for, if it is a [`SystemTypeSet`].
    fn system_type(&self) -> Option<TypeId> {
        None
    }

    /// Returns `true` for sets created implicitly by the schedule.
    fn is_anonymous(&self) -> bool {
        false
    }

    /// Converts the set into its shared form.
    fn intern(self) -> InternedSystemSet
    where
        Self: Sized,
    {
        InternedSystemSet(Arc::new(self))
    }
}

/// Shared, type-erased [`SystemSet`] used as a graph key.
#[derive(Clone)]
pub struct InternedSystemSet(Arc<dyn SystemSet>);

impl Deref for InternedSystemSet {
    type Target = dyn SystemSet;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for InternedSystemSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.dyn_eq(other.0.as_any())
    }
}

impl Eq for InternedSystemSet {}

impl Hash for InternedSystemSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

impl fmt::Debug for InternedSystemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Set containing every instance of one system type.
///
/// Every function system joins the type set of its function, so a function
/// can be passed to `before`/`after` in place of a set.
pub struct SystemTypeSet<T: 'static>(PhantomData<fn() -> T>);

impl<T: 'static> SystemTypeSet<T> {
    /// The set of system type `T`.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: 'static> Default for SystemTypeSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> fmt::Debug for SystemTypeSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SystemTypeSet").field(&type_name::<T>()).finish()
    }
}

impl<T: 'static> Clone for SystemTypeSet<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> Copy for SystemTypeSet<T> {}

impl<T: 'static> PartialEq for SystemTypeSet<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T: 'static> Eq for SystemTypeSet<T> {}

impl<T: 'static> Hash for SystemTypeSet<T> {
    fn hash<H: Hasher>(&self, _state: &mut H) {}
}

impl<T: 'static> SystemSet for SystemTypeSet<T> {
    fn system_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<T>())
    }
}

/// Set created for a group of systems sharing collective run conditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AnonymousSet(usize);

impl AnonymousSet {
    pub(crate) fn new(id: usize) -> Self {
        Self(id)
    }
}

impl SystemSet for AnonymousSet {
    fn is_anonymous(&self) -> bool {
        true
    }
}

/// Conversion into a [`SystemSet`]: sets themselves, and system functions
/// through their [`SystemTypeSet`].
pub trait IntoSystemSet<Marker>: Sized {
    /// The produced set.
    type Set: SystemSet;

    /// Converts `self` into a set.
    fn into_system_set(self) -> Self::Set;
}

impl<S: SystemSet> IntoSystemSet<()> for S {
    type Set = Self;

    #[inline]
    fn into_system_set(self) -> Self {
        self
    }
}

impl<Marker: 'static, F> IntoSystemSet<(IsFunctionSystem, Marker)> for F
where
    F: SystemParamFunction<Marker>,
{
    type Set = SystemTypeSet<FunctionSystem<Marker, F>>;

    #[inline]
    fn into_system_set(self) -> Self::Set {
        SystemTypeSet::new()
    }
}

impl<Marker: 'static, F> IntoSystemSet<(IsExclusiveFunctionSystem, Marker)> for F
where
    F: ExclusiveSystemParamFunction<Marker>,
{
    type Set = SystemTypeSet<ExclusiveFunctionSystem<Marker, F>>;

    #[inline]
    fn into_system_set(self) -> Self::Set {
        SystemTypeSet::new()
    }
}
