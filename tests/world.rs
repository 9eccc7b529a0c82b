use syren_ecs::prelude::*;
use syren_ecs::FromWorld;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position(i32);
impl Component for Position {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity(i32);
impl Component for Velocity {}

#[derive(Debug, PartialEq)]
struct Label(&'static str);
impl Component for Label {
    const STORAGE_TYPE: StorageType = StorageType::SparseSet;
}

#[derive(Debug, Default, PartialEq)]
struct Clock(u64);
impl Resource for Clock {}

#[derive(Debug, PartialEq)]
struct Seed(u64);
impl Resource for Seed {}

struct Derived(u64);
impl Resource for Derived {}

impl FromWorld for Derived {
    fn from_world(world: &mut World) -> Self {
        Derived(world.resource::<Seed>().0 * 2)
    }
}

#[test]
fn spawn_get_and_despawn() {
    let mut world = World::new();
    let entity = world.spawn((Position(1), Velocity(2), Label("scout")));
    assert!(world.contains(entity));
    assert_eq!(world.get::<Position>(entity), Some(&Position(1)));
    assert_eq!(world.get::<Label>(entity), Some(&Label("scout")));
    assert_eq!(world.entities().len(), 1);

    assert!(world.despawn(entity));
    assert!(!world.contains(entity));
    assert_eq!(world.get::<Position>(entity), None);
    assert!(!world.despawn(entity), "stale handles are ignored");
    assert!(world.entities().is_empty());
}

#[test]
fn insert_moves_between_archetypes_and_replaces_values() {
    let mut world = World::new();
    let entity = world.spawn(Position(1));
    let start = world.entities().get(entity).unwrap().archetype_id;

    assert!(world.insert(entity, Velocity(3)));
    let moved = world.entities().get(entity).unwrap().archetype_id;
    assert_ne!(start, moved);
    assert_eq!(world.get::<Position>(entity), Some(&Position(1)));
    assert_eq!(world.get::<Velocity>(entity), Some(&Velocity(3)));

    // Overwriting an existing component keeps the archetype.
    assert!(world.insert(entity, Position(7)));
    assert_eq!(world.entities().get(entity).unwrap().archetype_id, moved);
    assert_eq!(world.get::<Position>(entity), Some(&Position(7)));
}

#[test]
fn remove_and_take() {
    let mut world = World::new();
    let entity = world.spawn((Position(1), Velocity(2), Label("a")));

    assert!(world.remove::<(Velocity, Label)>(entity));
    assert_eq!(world.get::<Velocity>(entity), None);
    assert_eq!(world.get::<Label>(entity), None);
    assert_eq!(world.get::<Position>(entity), Some(&Position(1)));

    assert_eq!(world.take::<Position>(entity), Some(Position(1)));
    assert_eq!(world.take::<Position>(entity), None);
    assert!(world.contains(entity));
}

#[test]
fn operations_on_stale_handles_do_nothing() {
    let mut world = World::new();
    let entity = world.spawn(Position(0));
    world.despawn(entity);
    let replacement = world.spawn(Position(9));
    assert_eq!(replacement.index(), entity.index());

    assert!(!world.insert(entity, Velocity(1)));
    assert!(!world.remove::<Position>(entity));
    assert!(world.get_mut::<Position>(entity).is_none());
    assert_eq!(world.get::<Position>(replacement), Some(&Position(9)));
    assert_eq!(world.get::<Velocity>(replacement), None);
}

#[test]
fn archetypes_are_shared_by_equal_component_sets() {
    let mut world = World::new();
    let a = world.spawn((Position(0), Velocity(0)));
    let b = world.spawn((Velocity(1), Position(1)));
    let c = world.spawn(Position(2));
    world.insert(c, Velocity(2));

    let archetype_of = |entity| world.entities().get(entity).unwrap().archetype_id;
    assert_eq!(archetype_of(a), archetype_of(b));
    assert_eq!(archetype_of(a), archetype_of(c));
}

#[test]
fn resources_insert_replace_and_remove() {
    let mut world = World::new();
    assert!(!world.contains_resource::<Clock>());
    assert!(world.get_resource::<Clock>().is_none());

    world.insert_resource(Clock(1));
    world.insert_resource(Clock(2));
    assert_eq!(world.resource::<Clock>(), &Clock(2));

    world.resource_mut::<Clock>().0 += 1;
    assert_eq!(world.get_resource::<Clock>(), Some(&Clock(3)));

    assert_eq!(world.remove_resource::<Clock>(), Some(Clock(3)));
    assert!(!world.contains_resource::<Clock>());
}

#[test]
fn init_resource_uses_from_world_and_keeps_existing_values() {
    let mut world = World::new();
    world.insert_resource(Seed(21));
    world.init_resource::<Derived>();
    assert_eq!(world.resource::<Derived>().0, 42);

    world.insert_resource(Clock(5));
    world.init_resource::<Clock>();
    assert_eq!(world.resource::<Clock>(), &Clock(5));
}

#[test]
#[should_panic]
fn missing_resource_panics() {
    let world = World::new();
    let _ = world.resource::<Clock>();
}

#[test]
fn resource_change_detection() {
    let mut world = World::new();
    world.insert_resource(Clock(0));
    world.clear_trackers();

    {
        let clock = world.resource_mut::<Clock>();
        assert!(!clock.is_changed());
    }
    world.resource_mut::<Clock>().0 = 1;
    assert!(world.resource_mut::<Clock>().is_changed());
    assert!(!world.resource_mut::<Clock>().is_added());
}

#[test]
fn reserved_entities_are_flushed_into_the_empty_archetype() {
    let mut world = World::new();
    let reserved = world.entities().reserve_entity();
    assert!(world.contains(reserved));

    world.flush();
    assert!(world.entities().get(reserved).is_some());
    assert!(world.insert(reserved, Position(4)));
    assert_eq!(world.get::<Position>(reserved), Some(&Position(4)));
}

#[test]
fn run_system_once_applies_commands() {
    let mut world = World::new();
    world.insert_resource(Clock(10));

    let spawned = world.run_system_once(|mut commands: Commands, clock: Res<Clock>| {
        commands.spawn(Position(clock.0 as i32)).id()
    });
    assert_eq!(world.get::<Position>(spawned), Some(&Position(10)));
}

#[test]
fn change_ticks_advance_monotonically() {
    let world = World::new();
    let before = world.change_tick();
    let returned = world.increment_change_tick();
    assert_eq!(returned, before);
    assert_eq!(world.change_tick().get(), before.get() + 1);
}
