use criterion::*;
use std::hint::black_box;

use syren_ecs::prelude::*;

mod common;
use common::*;

#[derive(Default)]
struct GdpTotal(f32);
impl Resource for GdpTotal {}

fn production(mut query: Query<(&Productivity, &mut Wealth)>) {
    for (productivity, mut wealth) in query.iter_mut() {
        wealth.value += productivity.rate;
    }
}

fn decay(mut query: Query<&mut Wealth>) {
    for mut wealth in query.iter_mut() {
        wealth.value *= 0.9999;
    }
}

fn wander(mut query: Query<&mut Position>) {
    for mut position in query.iter_mut() {
        position.x += 0.5;
        position.y -= 0.5;
    }
}

fn measure(query: Query<&Wealth>, mut total: ResMut<GdpTotal>) {
    total.0 = query.iter().map(|w| w.value).sum();
}

fn economy(kind: ExecutorKind) -> (World, Schedule) {
    let mut world = setup_world(AGENTS_MED);
    world.init_resource::<GdpTotal>();
    let mut schedule = Schedule::default();
    schedule.set_executor_kind(kind);
    schedule.add_systems(((production, decay, measure).chain(), wander));
    (world, schedule)
}

fn tick_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for (label, kind) in [
        ("single_threaded", ExecutorKind::SingleThreaded),
        ("multi_threaded", ExecutorKind::MultiThreaded),
    ] {
        group.bench_function(format!("economy_4_systems_100k/{label}"), |b| {
            let (mut world, mut schedule) = economy(kind);
            schedule.initialize(&mut world).unwrap();
            b.iter(|| {
                schedule.run(&mut world).unwrap();
                black_box(world.resource::<GdpTotal>().0);
            });
        });
    }

    group.bench_function("build_schedule_4_systems", |b| {
        b.iter_batched(
            || economy(ExecutorKind::SingleThreaded),
            |(mut world, mut schedule)| {
                schedule.initialize(&mut world).unwrap();
                black_box(schedule.systems_len());
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, tick_benchmark);
criterion_main!(benches);
