use syren_ecs::engine::access::{Access, AccessConflicts, FilteredAccess, FilteredAccessSet};
use syren_ecs::engine::component::Component;
use syren_ecs::engine::query::{With, Without};
use syren_ecs::engine::types::ComponentId;
use syren_ecs::engine::world::World;

struct Health(u32);
impl Component for Health {}

struct Enemy;
impl Component for Enemy {}

fn id(index: usize) -> ComponentId {
    ComponentId::new(index)
}

#[test]
fn readers_never_conflict() {
    let mut a = Access::new();
    let mut b = Access::new();
    a.add_read(id(0));
    b.add_read(id(0));
    assert!(a.is_compatible(&b));
    assert!(a.get_conflicts(&b).is_empty());
}

#[test]
fn a_write_conflicts_with_overlapping_reads_and_writes() {
    let mut reader = Access::new();
    reader.add_read(id(1));
    let mut writer = Access::new();
    writer.add_write(id(1));
    let mut other_writer = Access::new();
    other_writer.add_write(id(2));

    assert!(writer.has_read(id(1)), "a write implies a read");
    assert!(!reader.is_compatible(&writer));
    assert!(!writer.is_compatible(&writer.clone()));
    assert!(writer.is_compatible(&other_writer));
    assert_eq!(reader.get_conflicts(&writer).ids(), vec![id(1)]);
}

#[test]
fn world_wide_access_rules() {
    let mut read_all = Access::new();
    read_all.read_all();
    let mut write_all = Access::new();
    write_all.write_all();
    let mut reader = Access::new();
    reader.add_read(id(3));
    let mut writer = Access::new();
    writer.add_write(id(3));
    let mut archetypal = Access::new();
    archetypal.add_archetypal(id(3));

    assert!(read_all.is_compatible(&read_all.clone()));
    assert!(read_all.is_compatible(&reader));
    assert!(!read_all.is_compatible(&writer));
    assert!(!write_all.is_compatible(&reader));
    assert!(!write_all.is_compatible(&archetypal));
    assert!(write_all.is_compatible(&Access::new()));
    assert!(write_all.has_read_all());
    assert_eq!(read_all.get_conflicts(&write_all), AccessConflicts::All);
}

#[test]
fn archetypal_access_only_conflicts_with_structural_writes() {
    let mut archetypal = Access::new();
    archetypal.add_archetypal(id(4));
    let mut writer = Access::new();
    writer.add_write(id(4));
    assert!(archetypal.is_compatible(&writer));
    assert!(!archetypal.has_read(id(4)));
    assert!(archetypal.has_archetypal(id(4)));
}

#[test]
fn disjoint_filters_exempt_a_conflict() {
    let (health, enemy) = (id(0), id(1));

    let mut enemies = FilteredAccess::default();
    enemies.add_write(health);
    enemies.and_with(enemy);

    let mut friends = FilteredAccess::default();
    friends.add_write(health);
    friends.and_without(enemy);

    let mut everyone = FilteredAccess::default();
    everyone.add_read(health);

    assert!(enemies.is_compatible(&friends));
    assert!(enemies.get_conflicts(&friends).is_empty());
    assert!(!enemies.is_compatible(&everyone));
    assert_eq!(friends.get_conflicts(&everyone).ids(), vec![health]);
}

#[test]
fn filter_alternatives_must_all_be_ruled_out() {
    let (health, a, b) = (id(0), id(1), id(2));

    // Or<(With<A>, With<B>)>
    let mut with_a = FilteredAccess::default();
    with_a.and_with(a);
    let mut with_b = FilteredAccess::default();
    with_b.and_with(b);
    let mut either = with_a.clone();
    either.append_or(&with_b);
    either.add_write(health);

    let mut without_a = FilteredAccess::default();
    without_a.add_write(health);
    without_a.and_without(a);

    // The `With<B>` branch may still match entities without `A`.
    assert!(!either.is_compatible(&without_a));

    let mut without_both = without_a.clone();
    without_both.and_without(b);
    assert!(either.is_compatible(&without_both));
}

#[test]
fn filtered_access_set_checks_every_pair() {
    let mut first = FilteredAccessSet::default();
    first.add_unfiltered_read(id(0));
    first.add_unfiltered_write(id(5));

    let mut second = FilteredAccessSet::default();
    second.add_unfiltered_read(id(0));
    assert!(first.is_compatible(&second));

    second.add_unfiltered_read(id(5));
    assert!(!first.is_compatible(&second));
    assert_eq!(first.get_conflicts(&second).ids(), vec![id(5)]);
    assert!(first.combined_access().has_write(id(5)));
    assert_eq!(first.filtered_accesses().len(), 2);

    let mut world_writer = FilteredAccessSet::default();
    world_writer.write_all();
    assert!(!world_writer.is_compatible(&first));
}

#[test]
fn query_state_access_reflects_filters() {
    let mut world = World::new();
    let enemies = world.query_filtered::<&mut Health, With<Enemy>>();
    let friends = world.query_filtered::<&mut Health, Without<Enemy>>();
    let everyone = world.query::<&Health>();

    let health = world.component_id::<Health>().unwrap();
    let enemy = world.component_id::<Enemy>().unwrap();
    assert!(enemies.component_access().access().has_write(health));
    assert!(enemies.component_access().access().has_archetypal(enemy));
    assert!(enemies.component_access().required().has(health.index()));

    assert!(enemies.component_access().is_compatible(friends.component_access()));
    assert!(!everyone.component_access().is_compatible(friends.component_access()));
}
