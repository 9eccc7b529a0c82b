use syren_ecs::engine::error::{QueryEntityError, QuerySingleError};
use syren_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position(f32);
impl Component for Position {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity(f32);
impl Component for Velocity {}

#[derive(Debug)]
struct Frozen;
impl Component for Frozen {
    const STORAGE_TYPE: StorageType = StorageType::SparseSet;
}

#[derive(Debug)]
struct Tag;
impl Component for Tag {}

fn sorted(mut values: Vec<f32>) -> Vec<f32> {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    values
}

#[test]
fn iterates_every_matching_archetype() {
    let mut world = World::new();
    world.spawn(Position(1.0));
    world.spawn((Position(2.0), Velocity(1.0)));
    world.spawn((Position(3.0), Tag));
    world.spawn(Velocity(9.0));

    let mut query = world.query::<&Position>();
    let seen = sorted(query.iter(&world).map(|position| position.0).collect());
    assert_eq!(seen, vec![1.0, 2.0, 3.0]);

    let mut both = world.query::<(&Position, &Velocity)>();
    assert_eq!(both.iter(&world).count(), 1);
}

#[test]
fn mutable_iteration_writes_through() {
    let mut world = World::new();
    world.spawn((Position(0.0), Velocity(2.0)));
    world.spawn((Position(10.0), Velocity(-1.0)));

    let mut query = world.query::<(&mut Position, &Velocity)>();
    for (mut position, velocity) in query.iter_mut(&mut world) {
        position.0 += velocity.0;
    }

    let mut positions = world.query::<&Position>();
    let seen = sorted(positions.iter(&world).map(|position| position.0).collect());
    assert_eq!(seen, vec![2.0, 9.0]);
}

#[test]
fn with_and_without_filters() {
    let mut world = World::new();
    world.spawn((Position(1.0), Tag));
    world.spawn(Position(2.0));
    world.spawn((Position(3.0), Frozen));

    let mut tagged = world.query_filtered::<&Position, With<Tag>>();
    assert_eq!(tagged.iter(&world).map(|p| p.0).collect::<Vec<_>>(), vec![1.0]);

    let mut thawed = world.query_filtered::<&Position, Without<Frozen>>();
    assert_eq!(sorted(thawed.iter(&world).map(|p| p.0).collect()), vec![1.0, 2.0]);

    let mut either = world.query_filtered::<&Position, Or<(With<Tag>, With<Frozen>)>>();
    assert_eq!(sorted(either.iter(&world).map(|p| p.0).collect()), vec![1.0, 3.0]);
}

#[test]
fn optional_data_and_entity_handles() {
    let mut world = World::new();
    let a = world.spawn(Position(1.0));
    let b = world.spawn((Position(2.0), Velocity(5.0)));

    let mut query = world.query::<(Entity, &Position, Option<&Velocity>)>();
    let mut rows: Vec<_> = query
        .iter(&world)
        .map(|(entity, position, velocity)| (entity, position.0, velocity.map(|v| v.0)))
        .collect();
    rows.sort_by_key(|(entity, _, _)| *entity);
    assert_eq!(rows, vec![(a, 1.0, None), (b, 2.0, Some(5.0))]);
}

#[test]
fn get_reports_stale_and_mismatched_entities() {
    let mut world = World::new();
    let moving = world.spawn((Position(1.0), Velocity(1.0)));
    let still = world.spawn(Position(0.0));
    let gone = world.spawn((Position(0.0), Velocity(0.0)));
    world.despawn(gone);

    let mut query = world.query::<&Velocity>();
    assert_eq!(query.get(&world, moving).unwrap(), &Velocity(1.0));
    assert_eq!(query.get(&world, still), Err(QueryEntityError::QueryDoesNotMatch(still)));
    assert_eq!(query.get(&world, gone), Err(QueryEntityError::NoSuchEntity(gone)));

    let mut writer = world.query::<&mut Velocity>();
    writer.get_mut(&mut world, moving).unwrap().0 = 4.0;
    assert!(writer.get_mut(&mut world, still).is_err());
    assert_eq!(world.get::<Velocity>(moving), Some(&Velocity(4.0)));
}

#[test]
fn single_requires_exactly_one_match() {
    let mut world = World::new();
    let mut query = world.query::<&Tag>();
    assert!(matches!(query.single(&world), Err(QuerySingleError::NoEntities(_))));

    world.spawn(Tag);
    assert!(query.single(&world).is_ok());

    world.spawn(Tag);
    assert!(matches!(query.single(&world), Err(QuerySingleError::MultipleEntities(_))));
}

#[test]
fn state_picks_up_archetypes_created_later() {
    let mut world = World::new();
    let mut query = world.query::<&Position>();
    assert!(query.is_empty(&world));

    world.spawn((Position(1.0), Tag));
    world.spawn((Position(2.0), Velocity(0.0), Frozen));
    assert_eq!(query.iter(&world).count(), 2);
    assert_eq!(query.matched_archetype_ids().len(), 2);
}

#[test]
fn added_and_changed_follow_the_tracker_window() {
    let mut world = World::new();
    let first = world.spawn(Position(0.0));

    let mut added = world.query_filtered::<Entity, Added<Position>>();
    let mut changed = world.query_filtered::<Entity, Changed<Position>>();
    assert_eq!(added.iter(&world).collect::<Vec<_>>(), vec![first]);
    assert_eq!(changed.iter(&world).collect::<Vec<_>>(), vec![first]);

    world.clear_trackers();
    assert_eq!(added.iter(&world).count(), 0);
    assert_eq!(changed.iter(&world).count(), 0);

    world.get_mut::<Position>(first).unwrap().0 = 1.0;
    let second = world.spawn(Position(5.0));
    assert_eq!(added.iter(&world).collect::<Vec<_>>(), vec![second]);
    let mut recently_changed = changed.iter(&world).collect::<Vec<_>>();
    recently_changed.sort();
    assert_eq!(recently_changed, vec![first, second]);

    // Reading through `Mut` without writing does not mark a change.
    world.clear_trackers();
    let position = world.get_mut::<Position>(first).unwrap();
    assert_eq!(position.0, 1.0);
    drop(position);
    assert_eq!(changed.iter(&world).count(), 0);
}

#[test]
#[should_panic]
fn state_from_another_world_is_rejected() {
    let mut first = World::new();
    let second = World::new();
    let mut query = first.query::<&Position>();
    let _ = query.iter(&second).count();
}
