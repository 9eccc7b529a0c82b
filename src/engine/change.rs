//! Change ticks and change-detecting smart pointers.
//!
//! The world keeps a monotonically increasing change tick. Every component
//! row and resource records the tick at which it was added and last changed,
//! and every system remembers the tick of its last run. A value is "changed"
//! for a system when its changed tick is newer than the system's last run.
//!
//! Ticks are `u32` and wrap. Comparisons are done relative to the current
//! tick, and [`World::check_change_ticks`](crate::engine::world::World::check_change_ticks)
//! periodically clamps very old ticks so they never appear newer after
//! wrapping.

use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::engine::component::Resource;


/// Number of ticks between two clamping passes over stored ticks.
pub const CHECK_TICK_THRESHOLD: u32 = 518_400_000;

/// Maximum age a tick may reach before it is clamped.
pub const MAX_CHANGE_AGE: u32 = u32::MAX - (2 * CHECK_TICK_THRESHOLD - 1);

/// A point in world time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tick {
    tick: u32,
}

impl Tick {
    /// Oldest representable relative tick.
    pub const MAX: Self = Self::new(MAX_CHANGE_AGE);

    /// Wraps a raw tick value.
    #[inline]
    pub const fn new(tick: u32) -> Self {
        Self { tick }
    }

    /// Raw tick value.
    #[inline]
    pub const fn get(self) -> u32 {
        self.tick
    }

    /// Overwrites the raw value.
    #[inline]
    pub fn set(&mut self, tick: u32) {
        self.tick = tick;
    }

    /// Returns `true` if this tick happened after `last_run`, as seen from `this_run`.
    #[inline]
    pub fn is_newer_than(self, last_run: Tick, this_run: Tick) -> bool {
        let ticks_since_insert = this_run.relative_to(self).tick.min(MAX_CHANGE_AGE);
        let ticks_since_system = this_run.relative_to(last_run).tick.min(MAX_CHANGE_AGE);
        ticks_since_system > ticks_since_insert
    }

    #[inline]
    pub(crate) fn relative_to(self, other: Self) -> Self {
        Self { tick: self.tick.wrapping_sub(other.tick) }
    }

    /// Clamps this tick if it is older than [`MAX_CHANGE_AGE`] relative to `tick`.
    ///
    /// Returns `true` if the tick was clamped.
    #[inline]
    pub(crate) fn check_tick(&mut self, tick: Tick) -> bool {
        let age = tick.relative_to(*self);
        if age.get() > Self::MAX.get() {
            *self = tick.relative_to(Self::MAX);
            true
        } else {
            false
        }
    }
}

/// Read-only view of a value's ticks plus the observing system's window.
#[derive(Clone, Copy)]
pub(crate) struct Ticks<'w> {
    pub(crate) added: &'w Tick,
    pub(crate) changed: &'w Tick,
    pub(crate) last_run: Tick,
    pub(crate) this_run: Tick,
}

/// Mutable view of a value's ticks plus the observing system's window.
pub(crate) struct TicksMut<'w> {
    pub(crate) added: &'w Tick,
    pub(crate) changed: &'w mut Tick,
    pub(crate) last_run: Tick,
    pub(crate) this_run: Tick,
}

macro_rules! change_detection_impl {
    ($name:ident < $lt:lifetime, $T:ident >, $($bounds:tt)*) => {
        impl<$lt, $T: $($bounds)*> $name<$lt, $T> {
            /// Returns `true` if the value was added after the observer's last run.
            #[inline]
            pub fn is_added(&self) -> bool {
                self.ticks.added.is_newer_than(self.ticks.last_run, self.ticks.this_run)
            }

            /// Returns `true` if the value was added or changed after the observer's last run.
            #[inline]
            pub fn is_changed(&self) -> bool {
                self.ticks.changed.is_newer_than(self.ticks.last_run, self.ticks.this_run)
            }

            /// Tick of the last change.
            #[inline]
            pub fn last_changed(&self) -> Tick {
                *self.ticks.changed
            }
        }

        impl<$lt, $T: $($bounds)*> Deref for $name<$lt, $T> {
            type Target = $T;

            #[inline]
            fn deref(&self) -> &$T {
                self.value
            }
        }

        impl<$lt, $T: $($bounds)*> AsRef<$T> for $name<$lt, $T> {
            #[inline]
            fn as_ref(&self) -> &$T {
                self.value
            }
        }

        impl<$lt, $T: $($bounds)* + fmt::Debug> fmt::Debug for $name<$lt, $T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.value).finish()
            }
        }
    };
}

macro_rules! change_detection_mut_impl {
    ($name:ident < $lt:lifetime, $T:ident >, $($bounds:tt)*) => {
        impl<$lt, $T: $($bounds)*> $name<$lt, $T> {
            /// Marks the value as changed without touching it.
            #[inline]
            pub fn set_changed(&mut self) {
                *self.ticks.changed = self.ticks.this_run;
            }

            /// Mutable access that does not mark the value as changed.
            #[inline]
            pub fn bypass_change_detection(&mut self) -> &mut $T {
                self.value
            }

            /// Consumes the pointer, marking the value as changed.
            #[inline]
            pub fn into_inner(mut self) -> &$lt mut $T {
                self.set_changed();
                self.value
            }
        }

        impl<$lt, $T: $($bounds)*> DerefMut for $name<$lt, $T> {
            #[inline]
            fn deref_mut(&mut self) -> &mut $T {
                self.set_changed();
                self.value
            }
        }

        impl<$lt, $T: $($bounds)*> AsMut<$T> for $name<$lt, $T> {
            #[inline]
            fn as_mut(&mut self) -> &mut $T {
                self.deref_mut()
            }
        }
    };
}

/// Shared borrow of a resource.
pub struct Res<'w, T: ?Sized + Resource> {
    pub(crate) value: &'w T,
    pub(crate) ticks: Ticks<'w>,
}

impl<'w, T: Resource> Res<'w, T> {
    /// Copies the pointer, keeping the original tick window.
    #[allow(clippy::should_implement_trait)]
    pub fn clone(this: &Self) -> Self {
        Self { value: this.value, ticks: this.ticks }
    }

    /// Extracts the reference with its full lifetime.
    pub fn into_inner(self) -> &'w T {
        self.value
    }
}

change_detection_impl!(Res<'w, T>, ?Sized + Resource);

/// Exclusive borrow of a resource.
pub struct ResMut<'w, T: ?Sized + Resource> {
    pub(crate) value: &'w mut T,
    pub(crate) ticks: TicksMut<'w>,
}

change_detection_impl!(ResMut<'w, T>, ?Sized + Resource);
change_detection_mut_impl!(ResMut<'w, T>, ?Sized + Resource);

/// Exclusive borrow of a component that records changes on mutable deref.
pub struct Mut<'w, T: ?Sized> {
    pub(crate) value: &'w mut T,
    pub(crate) ticks: TicksMut<'w>,
}

change_detection_impl!(Mut<'w, T>, ?Sized);
change_detection_mut_impl!(Mut<'w, T>, ?Sized);

impl<'w, T: ?Sized> Mut<'w, T> {
    pub(crate) fn new(
        value: &'w mut T,
        added: &'w Tick,
        changed: &'w mut Tick,
        last_run: Tick,
        this_run: Tick,
    ) -> Self {
        Self { value, ticks: TicksMut { added, changed, last_run, this_run } }
    }
}

impl<'w, T: Resource> From<ResMut<'w, T>> for Mut<'w, T> {
    fn from(other: ResMut<'w, T>) -> Mut<'w, T> {
        Mut { value: other.value, ticks: other.ticks }
    }
}
