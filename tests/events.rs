use syren_ecs::engine::event::event_update_system;
use syren_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Damage(u32);
impl Event for Damage {}

#[derive(Debug, Default)]
struct Received(Vec<u32>);
impl Resource for Received {}

#[test]
fn events_survive_exactly_one_update() {
    let mut events = Events::<Damage>::default();
    let mut cursor = events.get_cursor();

    events.send(Damage(1));
    events.update();
    events.send(Damage(2));
    assert_eq!(events.len(), 2);
    assert_eq!(cursor.read(&events).copied().collect::<Vec<_>>(), vec![Damage(1), Damage(2)]);
    assert!(cursor.is_empty(&events));

    events.update();
    assert_eq!(events.len(), 1);
    events.update();
    assert!(events.is_empty());
}

#[test]
fn cursors_track_their_own_position() {
    let mut events = Events::<Damage>::default();
    events.send_batch([Damage(1), Damage(2)]);

    let mut early = events.get_cursor();
    let mut late = events.get_cursor_current();
    events.send(Damage(3));

    assert_eq!(early.len(&events), 3);
    assert_eq!(late.read(&events).copied().collect::<Vec<_>>(), vec![Damage(3)]);
    assert_eq!(early.read(&events).count(), 3);
    assert_eq!(early.read(&events).count(), 0);
}

#[test]
fn slow_readers_miss_events() {
    let mut events = Events::<Damage>::default();
    let mut cursor = events.get_cursor();
    events.send(Damage(1));
    events.update();
    events.update();
    events.send(Damage(2));

    assert_eq!(cursor.missed_events(&events), 1);
    assert_eq!(cursor.read(&events).copied().collect::<Vec<_>>(), vec![Damage(2)]);
}

#[test]
fn drain_and_clear() {
    let mut events = Events::<Damage>::default();
    events.send_default();
    events.update();
    events.send(Damage(7));
    assert_eq!(events.drain().collect::<Vec<_>>(), vec![Damage(0), Damage(7)]);
    assert!(events.is_empty());

    let mut cursor = events.get_cursor();
    events.send(Damage(8));
    events.clear();
    assert_eq!(cursor.read(&events).count(), 0);
}

#[test]
fn world_send_event_requires_registration() {
    let mut world = World::new();
    assert!(world.send_event(Damage(1)).is_none());

    world.add_event::<Damage>();
    assert!(world.send_event(Damage(1)).is_some());
    let mut cursor = world.get_event_cursor::<Damage>();
    let events = world.resource::<Events<Damage>>();
    assert_eq!(cursor.read(events).count(), 1);
}

fn send_damage(mut writer: EventWriter<Damage>) {
    writer.send(Damage(3));
    writer.send(Damage(4));
}

fn record_damage(mut reader: EventReader<Damage>, mut received: ResMut<Received>) {
    received.0.extend(reader.read().map(|damage| damage.0));
}

#[test]
fn readers_see_each_event_once_across_runs() {
    let mut world = World::new();
    world.add_event::<Damage>();
    world.init_resource::<Received>();

    let mut schedule = Schedule::default();
    schedule.add_systems((event_update_system::<Damage>, send_damage, record_damage).chain());

    schedule.run(&mut world).unwrap();
    assert_eq!(world.resource::<Received>().0, vec![3, 4]);

    schedule.run(&mut world).unwrap();
    assert_eq!(world.resource::<Received>().0, vec![3, 4, 3, 4]);
    assert_eq!(world.resource::<Events<Damage>>().len(), 4);

    schedule.run(&mut world).unwrap();
    assert_eq!(world.resource::<Events<Damage>>().len(), 4);
}
