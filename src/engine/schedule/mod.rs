//! # Schedules
//!
//! Orders systems into a directed acyclic graph and runs them.
//!
//! ## Purpose
//! A [`Schedule`] owns a set of systems together with their ordering
//! constraints, set memberships and run conditions. On the first run after a
//! change it builds an executable: a topological order of the systems with
//! [`ApplyDeferred`](crate::engine::system::ApplyDeferred) sync points
//! inserted where buffered commands must become visible.
//!
//! ## Design
//! - Systems and sets are nodes of two graphs: the hierarchy (set
//!   membership) and the dependencies (`before`/`after`). Building
//!   flattens sets into their member systems.
//! - Cycles are reported with the names of the nodes on the cycle.
//! - Pairs of systems with conflicting access and no path between them are
//!   ambiguities. They are collected, and logged or rejected according to
//!   [`ScheduleBuildSettings`].
//! - The single-threaded executor runs the executable in order. The
//!   multi-threaded executor groups it into stages of compatible systems
//!   and runs each stage on rayon.
//!
//! ## Invariants
//! - Two systems with conflicting access or an ordering between them never
//!   run at the same time.
//! - A system that is skipped by a run condition keeps its last-run tick.

mod condition;
mod config;
mod executor;
mod graph;
#[allow(clippy::module_inception)]
mod schedule;
mod set;

pub use condition::{common_conditions, not, Condition};
pub use config::{
    Ambiguity, Chain, Dependency, DependencyKind, GraphInfo, IntoSystemConfigs, IntoSystemSetConfigs, NodeConfig,
    NodeConfigs, SystemConfig, SystemConfigs, SystemSetConfig, SystemSetConfigs,
};
pub use executor::{ExecutorKind, SystemSchedule};
pub use graph::{check_graph, CheckGraphResults, DiGraph, Direction, NodeId};
pub use schedule::{LogLevel, Schedule, ScheduleBuildSettings, ScheduleGraph};
pub use set::{AnonymousSet, DynSystemSet, InternedSystemSet, IntoSystemSet, SystemSet, SystemTypeSet};
