use syren_ecs::engine::system::System;
use syren_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position(i32);
impl Component for Position {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity(i32);
impl Component for Velocity {}

struct Enemy;
impl Component for Enemy {}

#[derive(Debug, Default, PartialEq)]
struct Counter(u32);
impl Resource for Counter {}

fn movement(mut query: Query<(&mut Position, &Velocity)>) {
    for (mut position, velocity) in query.iter_mut() {
        position.0 += velocity.0;
    }
}

fn count_positions(query: Query<&Position>, mut counter: ResMut<Counter>) {
    counter.0 += query.iter().count() as u32;
}

#[test]
fn function_systems_run_against_the_world() {
    let mut world = World::new();
    world.init_resource::<Counter>();
    let entity = world.spawn((Position(0), Velocity(2)));
    world.spawn(Position(5));

    let mut system = IntoSystem::into_system(movement);
    system.initialize(&mut world);
    system.run(&mut world);
    system.run(&mut world);
    assert_eq!(world.get::<Position>(entity), Some(&Position(4)));

    world.run_system_once(count_positions);
    assert_eq!(world.resource::<Counter>().0, 2);
}

#[test]
fn access_is_declared_per_parameter() {
    let mut world = World::new();
    let mut system = IntoSystem::into_system(count_positions);
    system.initialize(&mut world);

    let position = world.component_id::<Position>().unwrap();
    let access = system.component_access();
    assert!(access.has_read(position));
    assert!(!access.has_write(position));
    assert_eq!(system.component_access_set().filtered_accesses().len(), 2);
    assert!(!system.is_exclusive());
    assert!(!system.has_deferred());
    assert!(system.name().contains("count_positions"));
}

#[test]
fn commands_make_a_system_deferred() {
    fn spawner(mut commands: Commands) {
        commands.spawn(Position(1));
    }
    let mut world = World::new();
    let mut system = IntoSystem::into_system(spawner);
    system.initialize(&mut world);
    assert!(system.has_deferred());

    let cell = world.as_unsafe_world_cell();
    // SAFETY: no other borrow of the world is live.
    unsafe { system.run_unsafe(cell) };
    let mut query = world.query::<&Position>();
    assert_eq!(query.iter(&world).count(), 0);

    system.apply_deferred(&mut world);
    assert_eq!(query.iter(&world).count(), 1);
}

#[test]
fn locals_persist_between_runs() {
    fn tally(mut runs: Local<u32>, mut counter: ResMut<Counter>) {
        *runs += 1;
        counter.0 = *runs;
    }
    let mut world = World::new();
    world.init_resource::<Counter>();
    let mut system = IntoSystem::into_system(tally);
    system.initialize(&mut world);
    for _ in 0..3 {
        system.run(&mut world);
    }
    assert_eq!(world.resource::<Counter>().0, 3);
}

#[test]
fn optional_resources() {
    fn check(counter: Option<Res<Counter>>) -> bool {
        counter.is_some()
    }
    let mut world = World::new();
    assert!(!world.run_system_once(check));
    world.init_resource::<Counter>();
    assert!(world.run_system_once(check));
}

#[test]
fn systems_see_changes_since_their_last_run() {
    fn changed_positions(query: Query<Entity, Changed<Position>>) -> usize {
        query.iter().count()
    }
    let mut world = World::new();
    let entity = world.spawn(Position(0));
    world.spawn(Position(1));

    let mut system = IntoSystem::into_system(changed_positions);
    system.initialize(&mut world);
    assert_eq!(system.run(&mut world), 2, "a fresh system sees everything");
    assert_eq!(system.run(&mut world), 0);

    world.get_mut::<Position>(entity).unwrap().0 = 9;
    assert_eq!(system.run(&mut world), 1);
    assert_eq!(system.run(&mut world), 0);
}

#[test]
fn disjoint_queries_may_share_a_system() {
    fn split(
        mut enemies: Query<&mut Position, With<Enemy>>,
        mut friends: Query<&mut Position, Without<Enemy>>,
    ) {
        for mut position in enemies.iter_mut() {
            position.0 -= 1;
        }
        for mut position in friends.iter_mut() {
            position.0 += 1;
        }
    }
    let mut world = World::new();
    let enemy = world.spawn((Position(0), Enemy));
    let friend = world.spawn(Position(0));
    world.run_system_once(split);
    assert_eq!(world.get::<Position>(enemy), Some(&Position(-1)));
    assert_eq!(world.get::<Position>(friend), Some(&Position(1)));
}

#[test]
#[should_panic(expected = "conflicts with a previous system parameter")]
fn overlapping_mutable_queries_are_rejected() {
    fn aliasing(_a: Query<&mut Position>, _b: Query<&Position>) {}
    let mut world = World::new();
    world.run_system_once(aliasing);
}

#[test]
#[should_panic(expected = "conflicts with a previous Res")]
fn res_and_res_mut_of_one_resource_are_rejected() {
    fn aliasing(_a: Res<Counter>, _b: ResMut<Counter>) {}
    let mut world = World::new();
    world.init_resource::<Counter>();
    world.run_system_once(aliasing);
}

#[test]
#[should_panic(expected = "does not exist")]
fn missing_resources_panic_when_fetched() {
    fn needs_counter(_counter: Res<Counter>) {}
    let mut world = World::new();
    world.run_system_once(needs_counter);
}

#[test]
fn exclusive_systems_get_the_whole_world() {
    fn reset(world: &mut World, mut calls: Local<u32>) {
        *calls += 1;
        world.insert_resource(Counter(*calls * 10));
        world.spawn(Position(*calls as i32));
    }
    let mut world = World::new();
    let mut system = IntoSystem::into_system(reset);
    system.initialize(&mut world);
    assert!(system.is_exclusive());
    assert!(system.component_access().has_write_all());

    system.run(&mut world);
    system.run(&mut world);
    assert_eq!(world.resource::<Counter>().0, 20);
    let mut query = world.query::<&Position>();
    assert_eq!(query.iter(&world).count(), 2);
}

#[test]
fn boolean_systems_combine() {
    fn yes() -> bool {
        true
    }
    fn no() -> bool {
        false
    }
    let mut world = World::new();
    assert!(world.run_system_once(yes.and(not(no))));
    assert!(!world.run_system_once(yes.and(no)));
    assert!(world.run_system_once(no.or(yes)));
    assert!(world.run_system_once(no.nor(no)));
    assert!(world.run_system_once(yes.xor(no)));
    assert!(world.run_system_once(yes.xnor(yes)));
    assert!(!world.run_system_once(yes.nand(yes)));
}

#[test]
fn combinators_skip_or_run_the_right_operand() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    static LEFT: AtomicUsize = AtomicUsize::new(0);
    static RIGHT: AtomicUsize = AtomicUsize::new(0);

    fn left_true() -> bool {
        LEFT.fetch_add(1, Ordering::SeqCst);
        true
    }
    fn left_false() -> bool {
        LEFT.fetch_add(1, Ordering::SeqCst);
        false
    }
    fn right_true() -> bool {
        RIGHT.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn evaluate<S: System<Out = bool>>(world: &mut World, condition: S) -> (bool, usize, usize) {
        LEFT.store(0, Ordering::SeqCst);
        RIGHT.store(0, Ordering::SeqCst);
        let result = world.run_system_once(condition);
        (result, LEFT.load(Ordering::SeqCst), RIGHT.load(Ordering::SeqCst))
    }

    let mut world = World::new();

    assert_eq!(evaluate(&mut world, left_false.and(right_true)), (false, 1, 0));
    assert_eq!(evaluate(&mut world, left_true.and(right_true)), (true, 1, 1));
    assert_eq!(evaluate(&mut world, left_true.or(right_true)), (true, 1, 0));
    assert_eq!(evaluate(&mut world, left_false.or(right_true)), (true, 1, 1));

    assert_eq!(evaluate(&mut world, left_false.nand(right_true)), (true, 1, 0));
    assert_eq!(evaluate(&mut world, left_true.nand(right_true)), (false, 1, 1));
    assert_eq!(evaluate(&mut world, left_true.nor(right_true)), (false, 1, 0));
    assert_eq!(evaluate(&mut world, left_false.nor(right_true)), (false, 1, 1));

    assert_eq!(evaluate(&mut world, left_true.xor(right_true)), (false, 1, 1));
    assert_eq!(evaluate(&mut world, left_false.xor(right_true)), (true, 1, 1));
    assert_eq!(evaluate(&mut world, left_true.xnor(right_true)), (true, 1, 1));
    assert_eq!(evaluate(&mut world, left_false.xnor(right_true)), (false, 1, 1));
}

#[test]
#[should_panic(expected = "different world")]
fn a_system_stays_bound_to_its_world() {
    let mut first = World::new();
    let mut second = World::new();
    let mut system = IntoSystem::into_system(movement);
    system.initialize(&mut first);
    system.initialize(&mut second);
}
