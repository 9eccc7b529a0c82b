//! Error types for registration, queries and schedules.
//!
//! Each error models a single failure mode and carries enough context to be
//! actionable in logs. Lower-level errors convert into the aggregate
//! [`EcsError`] through `From`, so orchestration code can use `?` freely.
//!
//! ## Taxonomy
//! * **Stale handles** are not errors at the storage level: lookups return
//!   `None`. Query lookups report them as [`QueryEntityError::NoSuchEntity`].
//! * **Registration conflicts** ([`RegistryError`]) are programmer errors
//!   raised when a type is registered twice with different storage.
//! * **Schedule build failures** ([`ScheduleBuildError`]) cover cycles,
//!   impossible set relationships and, when requested, ambiguities.
//! * **System failures** ([`RunError::System`]) halt the current tick and
//!   carry the failing system's name.
//!
//! ## Examples
//! ```ignore
//! match schedule.run(&mut world) {
//!     Ok(()) => {}
//!     Err(RunError::Build(ScheduleBuildError::DependencyCycle(report))) => {
//!         eprintln!("fix the ordering: {report}");
//!     }
//!     Err(RunError::System { system, source }) => {
//!         eprintln!("{system} failed: {source}");
//!     }
//!     Err(other) => eprintln!("{other}"),
//! }
//! ```

use std::borrow::Cow;

use thiserror::Error;

use crate::engine::component::StorageType;
use crate::engine::entity::Entity;


/// Boxed error returned by fallible systems.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Raised when the component registry rejects a registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The type was already registered with a different storage type.
    #[error(
        "component `{name}` is already registered with {existing:?} storage and cannot be re-registered with {requested:?} storage"
    )]
    DuplicateRegistration {
        /// Type name of the component.
        name: Cow<'static, str>,
        /// Storage recorded at first registration.
        existing: StorageType,
        /// Storage requested by the rejected registration.
        requested: StorageType,
    },
}

/// Raised when a query cannot produce an item for a specific entity.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueryEntityError {
    /// The handle is stale or was never allocated.
    #[error("entity {0:?} does not exist")]
    NoSuchEntity(Entity),

    /// The entity exists but its components do not satisfy the query.
    #[error("entity {0:?} does not match the query")]
    QueryDoesNotMatch(Entity),
}

/// Raised by single-result query accessors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuerySingleError {
    /// No entity matched.
    #[error("no entities fit the query {0}")]
    NoEntities(&'static str),

    /// More than one entity matched.
    #[error("multiple entities fit the query {0}")]
    MultipleEntities(&'static str),
}

/// Structural problems detected while building a schedule.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleBuildError {
    /// A set was configured to contain itself.
    #[error("system set `{0}` contains itself")]
    HierarchyLoop(String),

    /// The set hierarchy contains a cycle.
    #[error("system set hierarchy contains a cycle:\n{0}")]
    HierarchyCycle(String),

    /// A set hierarchy edge is implied by other edges, with hierarchy detection set to error.
    #[error("system set hierarchy contains redundant edges:\n{0}")]
    HierarchyRedundancy(String),

    /// A node was ordered relative to itself.
    #[error("`{0}` has been told to run before itself")]
    DependencyLoop(String),

    /// The dependency graph contains a strongly connected component larger than one node.
    #[error("schedule contains a dependency cycle:\n{0}")]
    DependencyCycle(String),

    /// A node is both a member of a set and ordered relative to it.
    #[error(
        "`{0}` and `{1}` have both `in_set` and `before`/`after` relationships; a node cannot run before or after a set it belongs to"
    )]
    CrossDependency(String, String),

    /// Ordering against a system function that was added more than once.
    #[error("tried to order against `{0}`, which has more than one instance in the schedule")]
    SystemTypeSetAmbiguity(String),

    /// Conflicting systems without an ordering, with ambiguity detection set to error.
    #[error("systems with conflicting access have indeterminate run order:\n{0}")]
    Ambiguity(String),
}

/// Failures surfaced by [`Schedule::run`](crate::engine::schedule::Schedule::run).
#[derive(Debug, Error)]
pub enum RunError {
    /// The schedule could not be built.
    #[error(transparent)]
    Build(#[from] ScheduleBuildError),

    /// A system returned an error; the rest of the tick was skipped.
    #[error("system `{system}` failed: {source}")]
    System {
        /// Name of the failing system.
        system: Cow<'static, str>,
        /// Error returned by the system.
        #[source]
        source: BoxedError,
    },
}

/// Aggregate error for callers that mix subsystems.
#[derive(Debug, Error)]
pub enum EcsError {
    /// Component registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Entity lookup through a query failed.
    #[error(transparent)]
    QueryEntity(#[from] QueryEntityError),

    /// Single-item query failed.
    #[error(transparent)]
    QuerySingle(#[from] QuerySingleError),

    /// Schedule construction or execution failed.
    #[error(transparent)]
    Run(#[from] RunError),
}

impl From<ScheduleBuildError> for EcsError {
    fn from(error: ScheduleBuildError) -> Self {
        EcsError::Run(RunError::Build(error))
    }
}

/// Result alias used across the crate's fallible APIs.
pub type EcsResult<T> = Result<T, EcsError>;
