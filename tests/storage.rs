use syren_ecs::engine::component::{Component, ComponentDescriptor, StorageType};
use syren_ecs::engine::error::RegistryError;
use syren_ecs::engine::sparse_set::SparseSet;
use syren_ecs::engine::types::{table_capacity, ComponentId, Signature, TableRow};
use syren_ecs::engine::world::World;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
}
impl Component for Velocity {}

#[derive(Debug, PartialEq)]
struct Marked(u32);
impl Component for Marked {
    const STORAGE_TYPE: StorageType = StorageType::SparseSet;
}

#[test]
fn sparse_set_keeps_dense_values_packed() {
    let mut set: SparseSet<usize, &str> = SparseSet::new();
    set.insert(3, "three");
    set.insert(1, "one");
    set.insert(7, "seven");
    assert_eq!(set.len(), 3);
    assert_eq!(set.get(1), Some(&"one"));
    assert!(!set.contains(2));

    // Removing the first dense value moves the last one into its place.
    assert_eq!(set.remove(3), Some("three"));
    assert_eq!(set.len(), 2);
    assert_eq!(set.values().copied().collect::<Vec<_>>(), vec!["seven", "one"]);
    assert_eq!(set.indices().collect::<Vec<_>>(), vec![7, 1]);
    assert_eq!(set.get(7), Some(&"seven"));
    assert_eq!(set.remove(3), None);
}

#[test]
fn sparse_set_insert_overwrites_in_place() {
    let mut set: SparseSet<u32, i32> = SparseSet::new();
    set.insert(4, 10);
    set.insert(4, 20);
    assert_eq!(set.len(), 1);
    assert_eq!(set.get(4), Some(&20));

    *set.get_or_insert_with(4, || 0) += 1;
    *set.get_or_insert_with(5, || 100) += 1;
    assert_eq!(set.get(4), Some(&21));
    assert_eq!(set.get(5), Some(&101));

    for (_, value) in set.iter_mut() {
        *value = 0;
    }
    assert!(set.values().all(|value| *value == 0));

    set.clear();
    assert!(set.is_empty());
    assert!(!set.contains(4));
}

#[test]
fn signature_set_operations() {
    let mut a = Signature::from_indices([1, 5, 70]);
    let b = Signature::from_indices([5, 70]);
    assert!(b.is_subset(&a));
    assert!(a.contains_all(&b));
    assert!(!a.is_subset(&b));
    assert_eq!(a.count_ones(), 3);

    let c = Signature::from_indices([2]);
    assert!(a.is_disjoint(&c));
    assert_eq!(a.intersection(&b).ones().collect::<Vec<_>>(), vec![5, 70]);

    a.difference_with(&b);
    assert_eq!(a.ones().collect::<Vec<_>>(), vec![1]);
    a.union_with(&c);
    assert!(a.has(1) && a.has(2));
    a.clear(1);
    assert!(!a.has(1));
}

#[test]
fn registry_assigns_dense_ids_and_rejects_storage_changes() {
    let mut world = World::new();
    let position = world.init_component::<Position>();
    let velocity = world.init_component::<Velocity>();
    assert_ne!(position, velocity);
    assert_eq!(world.init_component::<Position>(), position);
    assert_eq!(world.component_id::<Velocity>(), Some(velocity));
    assert_eq!(world.component_id::<Marked>(), None);

    let descriptor = ComponentDescriptor::with_storage::<Position>(StorageType::SparseSet);
    let result = world.register_component_with_descriptor(descriptor);
    assert!(matches!(
        result,
        Err(RegistryError::DuplicateRegistration { requested: StorageType::SparseSet, .. })
    ));
}

#[test]
fn worlds_keep_separate_registries() {
    let mut first = World::new();
    let mut second = World::new();
    first.init_component::<Position>();
    let velocity_first = first.init_component::<Velocity>();
    let velocity_second = second.init_component::<Velocity>();
    assert_eq!(velocity_first, ComponentId::new(1));
    assert_eq!(velocity_second, ComponentId::new(0));
}

#[test]
fn table_rows_stay_dense_after_despawn() {
    let mut world = World::new();
    let a = world.spawn((Position { x: 1.0, y: 1.0 }, Velocity { dx: 0.1, dy: 0.1 }));
    let b = world.spawn((Position { x: 2.0, y: 2.0 }, Velocity { dx: 0.2, dy: 0.2 }));
    let c = world.spawn((Position { x: 3.0, y: 3.0 }, Velocity { dx: 0.3, dy: 0.3 }));

    let location = world.entities().get(a).unwrap();
    assert!(world.despawn(a));

    let position = world.component_id::<Position>().unwrap();
    let table = &world.storages().tables[location.table_id];
    assert_eq!(table.entity_count(), 2);
    assert!(table.has_column(position));
    assert_eq!(table.entities(), &[c, b]);

    // `c` was swapped into the row `a` vacated.
    let moved = world.entities().get(c).unwrap();
    assert_eq!(moved.table_row, TableRow::new(0));
    assert_eq!(
        table.get_component::<Position>(position, moved.table_row),
        Some(&Position { x: 3.0, y: 3.0 })
    );
    assert_eq!(world.get::<Velocity>(b), Some(&Velocity { dx: 0.2, dy: 0.2 }));
}

#[test]
fn sparse_components_live_outside_tables() {
    let mut world = World::new();
    let entity = world.spawn((Position { x: 0.0, y: 0.0 }, Marked(9)));
    let marked = world.component_id::<Marked>().unwrap();

    let location = world.entities().get(entity).unwrap();
    let table = &world.storages().tables[location.table_id];
    assert!(!table.has_column(marked));

    let sparse = world.storages().sparse_sets.get(marked).unwrap();
    assert!(sparse.contains(entity));
    assert_eq!(sparse.get::<Marked>(entity), Some(&Marked(9)));

    assert!(world.remove::<Marked>(entity));
    let sparse = world.storages().sparse_sets.get(marked).unwrap();
    assert!(sparse.is_empty());
    assert_eq!(world.get::<Position>(entity), Some(&Position { x: 0.0, y: 0.0 }));
}

#[test]
fn table_capacity_doubles_from_four() {
    assert_eq!(table_capacity(0), 4);
    assert_eq!(table_capacity(1), 4);
    assert_eq!(table_capacity(4), 8);
    assert_eq!(table_capacity(5), 8);
    assert_eq!(table_capacity(8), 16);
    assert_eq!(table_capacity(9), 16);
    assert_eq!(table_capacity(200), 256);

    let mut world = World::new();
    let first = world.spawn(Position { x: 0.0, y: 0.0 });
    let table_id = world.entities().get(first).unwrap().table_id;
    assert_eq!(world.storages().tables[table_id].capacity(), 4);
    for i in 1..5 {
        world.spawn(Position { x: i as f32, y: 0.0 });
    }
    assert_eq!(world.storages().tables[table_id].capacity(), 8);
    for i in 5..9 {
        world.spawn(Position { x: i as f32, y: 0.0 });
    }
    assert_eq!(world.storages().tables[table_id].capacity(), 16);
}

#[test]
fn moving_to_a_superset_table_preserves_values() {
    let mut world = World::new();
    let a = world.spawn(Position { x: 1.0, y: 1.0 });
    let b = world.spawn(Position { x: 2.0, y: 2.0 });
    let c = world.spawn(Position { x: 3.0, y: 3.0 });
    let source = world.entities().get(a).unwrap().table_id;

    assert!(world.insert(a, Velocity { dx: 0.5, dy: 0.5 }));

    let destination = world.entities().get(a).unwrap();
    assert_ne!(destination.table_id, source);
    assert_eq!(world.get::<Position>(a), Some(&Position { x: 1.0, y: 1.0 }));
    assert_eq!(world.get::<Velocity>(a), Some(&Velocity { dx: 0.5, dy: 0.5 }));

    let table = &world.storages().tables[source];
    assert_eq!(table.entity_count(), 2);
    assert_eq!(table.entities(), &[c, b]);
    assert_eq!(world.entities().get(c).unwrap().table_row, TableRow::new(0));
    assert_eq!(world.get::<Position>(c), Some(&Position { x: 3.0, y: 3.0 }));

    // Removing the added component moves the row back into the subset table.
    assert!(world.remove::<Velocity>(a));
    let back = world.entities().get(a).unwrap();
    assert_eq!(back.table_id, source);
    assert_eq!(back.table_row, TableRow::new(2));
    assert_eq!(world.get::<Position>(a), Some(&Position { x: 1.0, y: 1.0 }));
    assert!(world.storages().tables[destination.table_id].is_empty());
}
