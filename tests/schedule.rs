use std::sync::atomic::{AtomicUsize, Ordering};

use syren_ecs::engine::error::BoxedError;
use syren_ecs::engine::schedule::NodeId;
use syren_ecs::prelude::*;
use syren_ecs::{LogLevel, ScheduleBuildError, ScheduleBuildSettings};

#[derive(Debug, Default)]
struct Order(Vec<&'static str>);
impl Resource for Order {}

#[derive(Debug, Default, PartialEq)]
struct Flag(bool);
impl Resource for Flag {}

#[derive(Debug, Default)]
struct Seen(usize);
impl Resource for Seen {}

#[derive(Debug, Clone, Copy)]
struct Marker;
impl Component for Marker {}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Phase {
    Sense,
    Act,
}
impl SystemSet for Phase {}

fn s1(mut order: ResMut<Order>) {
    order.0.push("s1");
}

fn s2(mut order: ResMut<Order>) {
    order.0.push("s2");
}

fn s3(mut order: ResMut<Order>) {
    order.0.push("s3");
}

fn spawn_marker(mut commands: Commands) {
    commands.spawn(Marker);
}

fn count_markers(query: Query<&Marker>, mut seen: ResMut<Seen>) {
    seen.0 = query.iter().count();
}

fn never() -> bool {
    false
}

fn world_with_order() -> World {
    let mut world = World::new();
    world.init_resource::<Order>();
    world.init_resource::<Seen>();
    world
}

fn order(world: &World) -> Vec<&'static str> {
    world.resource::<Order>().0.clone()
}

#[test]
fn dependency_cycle_fails_the_run() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((s1.after(s3), s2.after(s1), s3.after(s1)));

    let error = schedule.run(&mut world).unwrap_err();
    assert!(matches!(error, RunError::Build(ScheduleBuildError::DependencyCycle(_))));
    let message = error.to_string();
    assert!(message.contains("cycle"), "{message}");
    assert!(message.contains("s1") && message.contains("s3"), "{message}");
    assert!(order(&world).is_empty(), "nothing runs when the build fails");
}

#[test]
fn chain_runs_in_declared_order() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((s3, s1, s2).chain());
    schedule.run(&mut world).unwrap();
    assert_eq!(order(&world), vec!["s3", "s1", "s2"]);
}

#[test]
fn before_and_after_order_systems() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((s1.after(s2), s2.after(s3), s3));
    schedule.run(&mut world).unwrap();
    assert_eq!(order(&world), vec!["s3", "s2", "s1"]);
}

#[test]
fn unordered_systems_keep_insertion_order() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems(s2);
    schedule.add_systems((s3, s1));
    schedule.run(&mut world).unwrap();
    assert_eq!(order(&world), vec!["s2", "s3", "s1"]);
}

#[test]
fn ordered_sets_order_their_members() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.configure_sets((Phase::Sense, Phase::Act).chain());
    schedule.add_systems((s1, s2).in_set(Phase::Act));
    schedule.add_systems(s3.in_set(Phase::Sense));
    schedule.run(&mut world).unwrap();

    let run = order(&world);
    assert_eq!(run[0], "s3");
    assert_eq!(run.len(), 3);
}

#[test]
fn run_conditions_skip_systems() {
    let mut world = world_with_order();
    world.insert_resource(Flag(false));
    let mut schedule = Schedule::default();
    schedule.add_systems((
        s1.run_if(resource_equals(Flag(true))),
        s2.run_if(not(resource_equals(Flag(true)))),
        s3.run_if(resource_exists::<Flag>),
    ));

    schedule.run(&mut world).unwrap();
    assert_eq!(order(&world), vec!["s2", "s3"]);

    world.insert_resource(Flag(true));
    world.resource_mut::<Order>().0.clear();
    schedule.run(&mut world).unwrap();
    assert_eq!(order(&world), vec!["s1", "s3"]);
}

#[test]
fn conditions_short_circuit() {
    static EVALUATED: AtomicUsize = AtomicUsize::new(0);
    fn counting() -> bool {
        EVALUATED.fetch_add(1, Ordering::SeqCst);
        true
    }

    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((
        s1.run_if(never).run_if(counting),
        s2.run_if(never.and(counting)),
        s3.run_if(counting.or(never)),
    ));
    schedule.run(&mut world).unwrap();

    assert_eq!(order(&world), vec!["s3"]);
    assert_eq!(EVALUATED.load(Ordering::SeqCst), 1);
}

#[test]
fn set_conditions_gate_every_member() {
    let mut world = world_with_order();
    world.insert_resource(Flag(false));
    let mut schedule = Schedule::default();
    schedule.configure_sets(Phase::Act.run_if(resource_exists_and_equals(Flag(true))));
    schedule.add_systems((s1, s2).in_set(Phase::Act));
    schedule.add_systems(s3);

    schedule.run(&mut world).unwrap();
    assert_eq!(order(&world), vec!["s3"]);

    world.insert_resource(Flag(true));
    schedule.run(&mut world).unwrap();
    assert_eq!(order(&world), vec!["s3", "s1", "s2", "s3"]);
}

#[test]
fn collective_and_distributive_conditions() {
    static EVALUATED: AtomicUsize = AtomicUsize::new(0);
    fn counting() -> bool {
        EVALUATED.fetch_add(1, Ordering::SeqCst);
        true
    }

    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((s1, s2).run_if(counting));
    schedule.run(&mut world).unwrap();
    assert_eq!(EVALUATED.load(Ordering::SeqCst), 1, "a collective condition runs once per pass");

    let mut schedule = Schedule::default();
    schedule.add_systems((s1, s2).distributive_run_if(counting));
    schedule.run(&mut world).unwrap();
    assert_eq!(EVALUATED.load(Ordering::SeqCst), 3);
}

#[test]
fn run_once_runs_once() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems(s1.run_if(run_once()));
    for _ in 0..3 {
        schedule.run(&mut world).unwrap();
    }
    assert_eq!(order(&world), vec!["s1"]);
}

#[test]
fn skipped_systems_keep_their_last_run_tick() {
    let mut world = world_with_order();
    world.insert_resource(Flag(false));
    let mut schedule = Schedule::default();
    schedule.add_systems(s1.run_if(resource_equals(Flag(true))));
    schedule.initialize(&mut world).unwrap();
    let before = schedule.systems().next().unwrap().1.get_last_run();

    schedule.run(&mut world).unwrap();
    assert_eq!(schedule.systems().next().unwrap().1.get_last_run(), before);

    world.insert_resource(Flag(true));
    schedule.run(&mut world).unwrap();
    assert_ne!(schedule.systems().next().unwrap().1.get_last_run(), before);
}

#[test]
fn auto_sync_point_makes_commands_visible() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((spawn_marker, count_markers).chain());
    schedule.run(&mut world).unwrap();

    assert_eq!(world.resource::<Seen>().0, 1);
    assert_eq!(schedule.systems_len(), 3);
    let names: Vec<_> = schedule.systems().map(|(_, system)| system.name()).collect();
    assert_eq!(names[1], "apply_deferred");
}

#[test]
fn ignore_deferred_chains_skip_the_sync_point() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((spawn_marker, count_markers).chain_ignore_deferred());
    schedule.run(&mut world).unwrap();

    assert_eq!(schedule.systems_len(), 2);
    assert_eq!(world.resource::<Seen>().0, 0);
    // The pass still applies pending commands when it ends.
    let mut query = world.query::<&Marker>();
    assert_eq!(query.iter(&world).count(), 1);
}

#[test]
fn auto_sync_can_be_disabled() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.set_build_settings(ScheduleBuildSettings {
        auto_insert_apply_deferred: false,
        ..Default::default()
    });
    schedule.add_systems((spawn_marker, count_markers).chain());
    schedule.run(&mut world).unwrap();
    assert_eq!(schedule.systems_len(), 2);
    assert_eq!(world.resource::<Seen>().0, 0);
}

#[test]
fn explicit_sync_point_is_not_duplicated() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((spawn_marker, ApplyDeferred, count_markers).chain());
    schedule.run(&mut world).unwrap();

    assert_eq!(schedule.systems_len(), 3);
    assert_eq!(world.resource::<Seen>().0, 1);
}

#[test]
fn conditional_sync_point_gets_an_unconditional_companion() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((spawn_marker, ApplyDeferred.run_if(never), count_markers).chain());
    schedule.run(&mut world).unwrap();

    assert_eq!(schedule.systems_len(), 4);
    assert_eq!(world.resource::<Seen>().0, 1);
}

#[test]
fn systems_without_commands_need_no_sync_point() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((s1, s2, s3).chain());
    schedule.run(&mut world).unwrap();
    assert_eq!(schedule.systems_len(), 3);
}

#[test]
fn ambiguities_are_collected_and_can_be_fatal() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((s1, s2));
    schedule.run(&mut world).unwrap();
    assert_eq!(schedule.graph().conflicting_systems().len(), 1);

    let mut strict = Schedule::default();
    strict.set_build_settings(ScheduleBuildSettings {
        ambiguity_detection: LogLevel::Error,
        ..Default::default()
    });
    strict.add_systems((s1, s2));
    let error = strict.run(&mut world).unwrap_err();
    match error {
        RunError::Build(ScheduleBuildError::Ambiguity(report)) => {
            assert!(report.contains("s1") && report.contains("s2"), "{report}");
            assert!(report.contains("Order"), "{report}");
        }
        other => panic!("expected an ambiguity, got {other}"),
    }
}

#[test]
fn ordering_or_exemption_resolves_ambiguity() {
    let strict = || ScheduleBuildSettings { ambiguity_detection: LogLevel::Error, ..Default::default() };
    let mut world = world_with_order();

    let mut ordered = Schedule::default();
    ordered.set_build_settings(strict());
    ordered.add_systems((s1, s2.after(s1)));
    ordered.run(&mut world).unwrap();

    let mut exempt = Schedule::default();
    exempt.set_build_settings(strict());
    exempt.add_systems((s1, s2.ambiguous_with(s1), s3.ambiguous_with_all()));
    exempt.run(&mut world).unwrap();
    assert!(exempt.graph().conflicting_systems().is_empty());
}

#[test]
fn readers_are_not_ambiguous() {
    fn read_a(_order: Res<Order>) {}
    fn read_b(_order: Res<Order>) {}
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.set_build_settings(ScheduleBuildSettings {
        ambiguity_detection: LogLevel::Error,
        ..Default::default()
    });
    schedule.add_systems((read_a, read_b));
    schedule.run(&mut world).unwrap();
}

#[derive(Debug)]
struct Exhausted;

impl std::fmt::Display for Exhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("food supply exhausted")
    }
}

impl std::error::Error for Exhausted {}

fn failing(mut order: ResMut<Order>) -> Result<(), Exhausted> {
    order.0.push("failing");
    Err(Exhausted)
}

#[test]
fn system_errors_halt_the_pass() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((s1, failing, s2).chain());

    let error = schedule.run(&mut world).unwrap_err();
    match &error {
        RunError::System { system, source } => {
            assert!(system.contains("failing"));
            assert_eq!(source.to_string(), "food supply exhausted");
        }
        other => panic!("expected a system error, got {other}"),
    }
    assert_eq!(order(&world), vec!["s1", "failing"]);
}

#[test]
fn commands_of_finished_systems_survive_an_error() {
    fn boxed_failure() -> Result<(), BoxedError> {
        Err("out of range".into())
    }
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((spawn_marker, boxed_failure).chain_ignore_deferred());

    assert!(schedule.run(&mut world).is_err());
    let mut query = world.query::<&Marker>();
    assert_eq!(query.iter(&world).count(), 1);
}

#[test]
fn self_dependencies_and_self_membership_are_rejected() {
    let mut world = World::new();

    let mut looping = Schedule::default();
    looping.configure_sets(Phase::Act.after(Phase::Act));
    assert!(matches!(
        looping.run(&mut world),
        Err(RunError::Build(ScheduleBuildError::DependencyLoop(_)))
    ));

    let mut nested = Schedule::default();
    nested.configure_sets(Phase::Act.in_set(Phase::Act));
    assert!(matches!(
        nested.run(&mut world),
        Err(RunError::Build(ScheduleBuildError::HierarchyLoop(_)))
    ));
}

#[test]
fn a_rejected_self_loop_is_reported_once() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems(s1.in_set(Phase::Act));
    schedule.configure_sets(Phase::Act.after(Phase::Act));
    assert!(matches!(
        schedule.run(&mut world),
        Err(RunError::Build(ScheduleBuildError::DependencyLoop(_)))
    ));

    schedule.run(&mut world).unwrap();
    assert_eq!(order(&world), vec!["s1"]);
}

#[test]
fn set_hierarchy_cycles_are_rejected() {
    let mut world = World::new();
    let mut schedule = Schedule::default();
    schedule.configure_sets((Phase::Sense.in_set(Phase::Act), Phase::Act.in_set(Phase::Sense)));
    assert!(matches!(
        schedule.run(&mut world),
        Err(RunError::Build(ScheduleBuildError::HierarchyCycle(_)))
    ));
}

#[test]
fn ordering_a_node_against_its_own_set_is_rejected() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems(s1.in_set(Phase::Act).after(Phase::Act));
    assert!(matches!(
        schedule.run(&mut world),
        Err(RunError::Build(ScheduleBuildError::CrossDependency(_, _)))
    ));
}

#[test]
fn ordering_against_a_duplicated_function_is_rejected() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((s1, s1, s2.after(s1)));
    assert!(matches!(
        schedule.run(&mut world),
        Err(RunError::Build(ScheduleBuildError::SystemTypeSetAmbiguity(_)))
    ));
}

#[test]
fn exclusive_systems_see_applied_commands() {
    fn census(world: &mut World) {
        let mut query = world.query::<&Marker>();
        let count = query.iter(world).count();
        world.resource_mut::<Seen>().0 = count;
    }
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((spawn_marker, census).chain());
    schedule.run(&mut world).unwrap();
    assert_eq!(world.resource::<Seen>().0, 1);
}

#[test]
fn adding_systems_rebuilds_the_schedule() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems(s1);
    schedule.run(&mut world).unwrap();
    schedule.add_systems(s2.after(s1));
    schedule.run(&mut world).unwrap();
    assert_eq!(order(&world), vec!["s1", "s1", "s2"]);
    assert_eq!(schedule.systems_len(), 2);
}

#[test]
fn executable_lists_systems_with_their_conditions() {
    let mut world = world_with_order();
    let mut schedule = Schedule::default();
    schedule.add_systems((s1.run_if(never), s2).chain());
    schedule.initialize(&mut world).unwrap();

    let conditions: Vec<(NodeId, usize)> =
        schedule.system_conditions().map(|(id, conditions)| (id, conditions.len())).collect();
    assert_eq!(conditions.len(), 2);
    assert_eq!(conditions[0].1, 1);
    assert_eq!(conditions[1].1, 0);
}

mod multi_threaded {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(i64);
    impl Component for Position {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity(i64);
    impl Component for Velocity {}

    #[derive(Debug, Default)]
    struct Total(i64);
    impl Resource for Total {}

    fn movement(mut query: Query<(&mut Position, &Velocity)>) {
        for (mut position, velocity) in query.iter_mut() {
            position.0 += velocity.0;
        }
    }

    fn accelerate(mut query: Query<&mut Velocity>) {
        for mut velocity in query.iter_mut() {
            velocity.0 += 1;
        }
    }

    fn total(query: Query<&Position>, mut total: ResMut<Total>) {
        total.0 = query.iter().map(|position| position.0).sum();
    }

    fn run_simulation(kind: ExecutorKind) -> (i64, Vec<&'static str>) {
        let mut world = world_with_order();
        world.init_resource::<Total>();
        for i in 0..64 {
            world.spawn((Position(i), Velocity(1)));
        }

        let mut schedule = Schedule::default();
        schedule.set_executor_kind(kind);
        schedule.add_systems((accelerate, movement, total).chain());
        schedule.add_systems((s1, s2, s3, spawn_marker, count_markers).chain());
        for _ in 0..4 {
            schedule.run(&mut world).unwrap();
        }
        (world.resource::<Total>().0, order(&world))
    }

    #[test]
    fn matches_the_single_threaded_executor() {
        let single = run_simulation(ExecutorKind::SingleThreaded);
        let multi = run_simulation(ExecutorKind::MultiThreaded);
        assert_eq!(single, multi);
        assert_eq!(single.1.len(), 12);
    }

    #[test]
    fn conflicting_systems_never_overlap() {
        static ACTIVE: AtomicUsize = AtomicUsize::new(0);
        static OVERLAPS: AtomicUsize = AtomicUsize::new(0);

        fn guarded(mut total: ResMut<Total>) {
            if ACTIVE.fetch_add(1, Ordering::SeqCst) != 0 {
                OVERLAPS.fetch_add(1, Ordering::SeqCst);
            }
            total.0 += 1;
            std::thread::yield_now();
            ACTIVE.fetch_sub(1, Ordering::SeqCst);
        }
        fn guarded_too(total: ResMut<Total>) {
            guarded(total);
        }

        let mut world = World::new();
        world.init_resource::<Total>();
        let mut schedule = Schedule::default();
        schedule.set_executor_kind(ExecutorKind::MultiThreaded);
        schedule.add_systems((guarded, guarded_too));
        for _ in 0..16 {
            schedule.run(&mut world).unwrap();
        }
        assert_eq!(world.resource::<Total>().0, 32);
        assert_eq!(OVERLAPS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn errors_propagate_from_worker_threads() {
        let mut world = world_with_order();
        let mut schedule = Schedule::default();
        schedule.set_executor_kind(ExecutorKind::MultiThreaded);
        schedule.add_systems((s1, failing).chain());
        assert!(matches!(schedule.run(&mut world), Err(RunError::System { .. })));
        assert_eq!(schedule.executor_kind(), ExecutorKind::MultiThreaded);
    }
}
