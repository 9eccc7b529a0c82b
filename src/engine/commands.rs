//! # Commands
//!
//! Deferred structural mutations recorded by systems.
//!
//! ## Purpose
//! Systems that run against an [`UnsafeWorldCell`](crate::engine::world::UnsafeWorldCell)
//! cannot move entities between archetypes while other systems hold pointers
//! into the same tables. They record [`Command`] values into a per-system
//! [`CommandQueue`] instead, and the scheduler applies the queue at a sync
//! point where it has exclusive access to the world.
//!
//! ## Design
//! - Commands are plain data describing *what* change should occur. Typed
//!   values travel as boxed closures that capture the concrete bundle.
//! - Entities spawned through [`Commands`] are reserved immediately with
//!   [`Entities::reserve_entity`] so the handle is usable before the queue
//!   is applied. [`World::flush`] binds them to the empty archetype.
//! - Commands do not contribute to a system's access. The sync point that
//!   applies them is exclusive.
//!
//! ## Invariants
//! - Commands are applied in the order they were recorded.
//! - Applying a drained queue is a no-op.
//! - A command whose target entity no longer exists is skipped with a
//!   warning; it never panics.

use std::fmt;

use crate::engine::bundle::Bundle;
use crate::engine::component::Resource;
use crate::engine::entity::{Entities, Entity};
use crate::engine::world::{FromWorld, World};


/// A deferred world mutation.
///
/// ## Purpose
/// `Command` values are produced by [`Commands`] and consumed by
/// [`CommandQueue::apply`] at a sync point.
pub enum Command {
    /// Inserts a bundle into an existing or reserved entity.
    ///
    /// ## Behavior
    /// - Moves the entity to the archetype that includes the bundle.
    /// - Replaces values of components the entity already has.
    Insert {
        /// Target entity.
        entity: Entity,
        /// Writes the captured bundle. Returns `false` if the entity is gone.
        apply: Box<dyn FnOnce(&mut World, Entity) -> bool + Send + Sync>,
    },

    /// Removes the components of a bundle type from an entity.
    ///
    /// ## Behavior
    /// - Moves the entity to the archetype without those components.
    /// - Removed values are dropped.
    Remove {
        /// Target entity.
        entity: Entity,
        /// Type-erased removal for the bundle type.
        apply: fn(&mut World, Entity) -> bool,
    },

    /// Despawns an entity, dropping its components.
    Despawn {
        /// Entity to remove.
        entity: Entity,
    },

    /// Arbitrary exclusive world mutation.
    Custom(Box<dyn FnOnce(&mut World) + Send + Sync>),
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Insert { entity, .. } => f.debug_struct("Insert").field("entity", entity).finish(),
            Command::Remove { entity, .. } => f.debug_struct("Remove").field("entity", entity).finish(),
            Command::Despawn { entity } => f.debug_struct("Despawn").field("entity", entity).finish(),
            Command::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl Command {
    /// Applies this command to `world`.
    pub fn apply(self, world: &mut World) {
        match self {
            Command::Insert { entity, apply } => {
                if !apply(world, entity) {
                    tracing::warn!(?entity, "skipped insert: entity does not exist");
                }
            }
            Command::Remove { entity, apply } => {
                if !world.contains(entity) {
                    tracing::warn!(?entity, "skipped remove: entity does not exist");
                } else {
                    apply(world, entity);
                }
            }
            Command::Despawn { entity } => {
                if !world.despawn(entity) {
                    tracing::warn!(?entity, "skipped despawn: entity does not exist");
                }
            }
            Command::Custom(apply) => apply(world),
        }
    }
}

/// Ordered log of commands recorded by one system.
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: Vec<Command>,
}

impl CommandQueue {
    /// Appends `command`.
    #[inline]
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Number of pending commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Applies and drains every pending command in recording order.
    ///
    /// Reserved entities are flushed first so that commands targeting them
    /// find a location.
    pub fn apply(&mut self, world: &mut World) {
        world.flush();
        if self.commands.is_empty() {
            return;
        }
        tracing::trace!(count = self.commands.len(), "applying command queue");
        for command in self.commands.drain(..) {
            command.apply(world);
        }
        world.flush();
    }
}

/// System parameter that records deferred mutations.
///
/// ```ignore
/// fn spawn_rabbits(mut commands: Commands, query: Query<(Entity, &Hunger)>) {
///     for (entity, hunger) in query.iter() {
///         if hunger.0 > 10 {
///             commands.entity(entity).despawn();
///         }
///     }
///     commands.spawn((Rabbit, Hunger(0)));
/// }
/// ```
pub struct Commands<'w, 's> {
    queue: &'s mut CommandQueue,
    entities: &'w Entities,
}

impl<'w, 's> Commands<'w, 's> {
    /// Commands writing into `queue`, reserving ids from `world`.
    pub fn new(queue: &'s mut CommandQueue, world: &'w World) -> Self {
        Self::new_from_entities(queue, world.entities())
    }

    /// Commands writing into `queue`, reserving ids from `entities`.
    pub fn new_from_entities(queue: &'s mut CommandQueue, entities: &'w Entities) -> Self {
        Self { queue, entities }
    }

    /// Reserves a new entity and returns its commands.
    pub fn spawn_empty(&mut self) -> EntityCommands<'_> {
        let entity = self.entities.reserve_entity();
        EntityCommands { entity, queue: &mut *self.queue }
    }

    /// Reserves a new entity that will receive `bundle`.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> EntityCommands<'_> {
        let mut entity = self.spawn_empty();
        entity.insert(bundle);
        entity
    }

    /// Commands for an existing entity.
    ///
    /// The handle is not validated here; commands against a despawned
    /// entity are skipped when applied.
    pub fn entity(&mut self, entity: Entity) -> EntityCommands<'_> {
        EntityCommands { entity, queue: &mut *self.queue }
    }

    /// Inserts or replaces resource `R`.
    pub fn insert_resource<R: Resource>(&mut self, resource: R) {
        self.add(move |world: &mut World| world.insert_resource(resource));
    }

    /// Inserts `R::from_world` unless `R` already exists.
    pub fn init_resource<R: Resource + FromWorld>(&mut self) {
        self.add(|world: &mut World| {
            world.init_resource::<R>();
        });
    }

    /// Removes resource `R`.
    pub fn remove_resource<R: Resource>(&mut self) {
        self.add(|world: &mut World| {
            world.remove_resource::<R>();
        });
    }

    /// Records an arbitrary world mutation.
    pub fn add<F>(&mut self, command: F)
    where
        F: FnOnce(&mut World) + Send + Sync + 'static,
    {
        self.queue.push(Command::Custom(Box::new(command)));
    }
}

/// Commands targeting one entity.
pub struct EntityCommands<'a> {
    entity: Entity,
    queue: &'a mut CommandQueue,
}

impl EntityCommands<'_> {
    /// The target entity.
    #[inline]
    pub fn id(&self) -> Entity {
        self.entity
    }

    /// Inserts `bundle`, replacing values of components already present.
    pub fn insert<B: Bundle>(&mut self, bundle: B) -> &mut Self {
        self.queue.push(Command::Insert {
            entity: self.entity,
            apply: Box::new(move |world: &mut World, entity| world.insert(entity, bundle)),
        });
        self
    }

    /// Removes the components of bundle `B`.
    pub fn remove<B: Bundle>(&mut self) -> &mut Self {
        self.queue.push(Command::Remove { entity: self.entity, apply: remove_bundle::<B> });
        self
    }

    /// Despawns the entity.
    pub fn despawn(&mut self) {
        self.queue.push(Command::Despawn { entity: self.entity });
    }
}

fn remove_bundle<B: Bundle>(world: &mut World, entity: Entity) -> bool {
    world.remove::<B>(entity)
}
