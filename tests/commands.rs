use syren_ecs::engine::commands::{Command, CommandQueue, Commands};
use syren_ecs::prelude::*;
use syren_ecs::ArchetypeId;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Health(u32);
impl Component for Health {}
impl Resource for Health {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Poisoned;
impl Component for Poisoned {
    const STORAGE_TYPE: StorageType = StorageType::SparseSet;
}

#[derive(Debug, Default, PartialEq)]
struct Log(Vec<&'static str>);
impl Resource for Log {}

#[test]
fn spawned_handles_are_usable_before_apply() {
    let mut world = World::new();
    let mut queue = CommandQueue::default();

    let entity = {
        let mut commands = Commands::new(&mut queue, &world);
        let entity = commands.spawn(Health(10)).id();
        commands.entity(entity).insert(Poisoned);
        entity
    };
    assert!(world.contains(entity), "reserved ids are contained immediately");
    assert_eq!(world.get::<Health>(entity), None);
    assert_eq!(queue.len(), 2);

    queue.apply(&mut world);
    assert!(queue.is_empty());
    assert_eq!(world.get::<Health>(entity), Some(&Health(10)));
    assert_eq!(world.get::<Poisoned>(entity), Some(&Poisoned));
}

#[test]
fn commands_apply_in_recording_order() {
    let mut world = World::new();
    world.init_resource::<Log>();
    let mut queue = CommandQueue::default();
    {
        let mut commands = Commands::new(&mut queue, &world);
        commands.add(|world: &mut World| world.resource_mut::<Log>().0.push("first"));
        commands.add(|world: &mut World| world.resource_mut::<Log>().0.push("second"));
        commands.add(|world: &mut World| world.resource_mut::<Log>().0.push("third"));
    }
    queue.apply(&mut world);
    assert_eq!(world.resource::<Log>().0, vec!["first", "second", "third"]);

    // A drained queue applies nothing.
    queue.apply(&mut world);
    assert_eq!(world.resource::<Log>().0.len(), 3);
}

#[test]
fn insert_then_remove_then_despawn() {
    let mut world = World::new();
    let entity = world.spawn(Health(3));
    let mut queue = CommandQueue::default();
    {
        let mut commands = Commands::new(&mut queue, &world);
        commands.entity(entity).insert((Health(4), Poisoned)).remove::<Poisoned>();
    }
    queue.apply(&mut world);
    assert_eq!(world.get::<Health>(entity), Some(&Health(4)));
    assert_eq!(world.get::<Poisoned>(entity), None);

    Commands::new(&mut queue, &world).entity(entity).despawn();
    queue.apply(&mut world);
    assert!(!world.contains(entity));
}

#[test]
fn commands_against_missing_entities_are_skipped() {
    let mut world = World::new();
    let entity = world.spawn(Health(1));
    world.despawn(entity);

    let mut queue = CommandQueue::default();
    queue.push(Command::Despawn { entity });
    {
        let mut commands = Commands::new(&mut queue, &world);
        commands.entity(entity).insert(Health(2)).remove::<Health>();
        commands.spawn(Health(5));
    }
    queue.apply(&mut world);

    let mut query = world.query::<&Health>();
    assert_eq!(query.iter(&world).copied().collect::<Vec<_>>(), vec![Health(5)]);
}

#[test]
fn resource_commands() {
    let mut world = World::new();
    let mut queue = CommandQueue::default();
    {
        let mut commands = Commands::new(&mut queue, &world);
        commands.init_resource::<Log>();
        commands.insert_resource(Health(9));
    }
    queue.apply(&mut world);
    assert!(world.contains_resource::<Log>());

    Commands::new(&mut queue, &world).remove_resource::<Log>();
    queue.apply(&mut world);
    assert!(!world.contains_resource::<Log>());
}

#[test]
fn spawn_empty_lands_in_the_empty_archetype() {
    let mut world = World::new();
    let mut queue = CommandQueue::default();
    let entity = Commands::new(&mut queue, &world).spawn_empty().id();
    queue.apply(&mut world);
    let location = world.entities().get(entity).unwrap();
    assert_eq!(location.archetype_id, ArchetypeId::EMPTY);
}
