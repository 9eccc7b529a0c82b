//! # Syren ECS
//!
//! Archetype-based Entity-Component-System runtime with generational
//! entities, static access analysis and a dependency-graph scheduler.
//!
//! ## Design Goals
//! - Archetype tables for cache-friendly iteration, sparse sets for
//!   components that are added and removed often
//! - Access declared by every system and checked before anything runs
//! - Deterministic schedules: stable topological order, explicit sync points
//! - Optional parallel execution of compatible systems
//!
//! ## Example
//! ```ignore
//! use syren_ecs::prelude::*;
//!
//! #[derive(Debug)]
//! struct Position(f32);
//! impl Component for Position {}
//!
//! fn drift(mut query: Query<&mut Position>) {
//!     for mut position in query.iter_mut() {
//!         position.0 += 1.0;
//!     }
//! }
//!
//! let mut world = World::new();
//! world.spawn(Position(0.0));
//!
//! let mut schedule = Schedule::default();
//! schedule.add_systems(drift);
//! schedule.run(&mut world)?;
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Core ECS types

pub use engine::world::{
    FromWorld,
    World,
    WorldId,
};

pub use engine::entity::{
    Entities,
    Entity,
    EntityLocation,
};

pub use engine::component::{
    Component,
    Components,
    Resource,
    StorageType,
};

pub use engine::bundle::Bundle;

pub use engine::access::{
    Access,
    AccessConflicts,
    FilteredAccess,
    FilteredAccessSet,
};

pub use engine::query::{
    Added,
    Changed,
    Or,
    QueryState,
    With,
    Without,
};

pub use engine::change::{
    Mut,
    Res,
    ResMut,
    Tick,
};

pub use engine::commands::{
    Commands,
    CommandQueue,
    EntityCommands,
};

pub use engine::event::{
    Event,
    EventCursor,
    EventReader,
    EventWriter,
    Events,
};

pub use engine::system::{
    ApplyDeferred,
    IntoSystem,
    Local,
    Query,
    System,
};

pub use engine::schedule::{
    ExecutorKind,
    IntoSystemConfigs,
    IntoSystemSetConfigs,
    LogLevel,
    Schedule,
    ScheduleBuildSettings,
    SystemSet,
};

pub use engine::error::{
    EcsError,
    EcsResult,
    RunError,
    ScheduleBuildError,
};

pub use engine::types::{
    ArchetypeId,
    ComponentId,
    Signature,
    TableId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used ECS types.
///
/// Import with:
/// ```rust
/// use syren_ecs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::engine::schedule::common_conditions::*;
    pub use crate::engine::schedule::{not, Condition};
    pub use crate::{
        ApplyDeferred,
        Added,
        Bundle,
        Changed,
        Commands,
        Component,
        Entity,
        EntityCommands,
        Event,
        EventReader,
        EventWriter,
        Events,
        ExecutorKind,
        IntoSystem,
        IntoSystemConfigs,
        IntoSystemSetConfigs,
        Local,
        Mut,
        Or,
        Query,
        Res,
        ResMut,
        Resource,
        RunError,
        Schedule,
        StorageType,
        System,
        SystemSet,
        With,
        Without,
        World,
    };
}
