use std::hint::black_box;

use criterion::*;
use syren_ecs::engine::commands::{CommandQueue, Commands};
use syren_ecs::prelude::*;

mod common;
use common::*;

fn spawn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    for &count in &[AGENTS_SMALL, AGENTS_MED] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("direct", count), &count, |b, &count| {
            b.iter(|| {
                let mut world = World::new();
                for _ in 0..count {
                    world.spawn(agent());
                }
                black_box(world);
            });
        });

        group.bench_with_input(BenchmarkId::new("deferred", count), &count, |b, &count| {
            b.iter(|| {
                let mut world = World::new();
                let mut queue = CommandQueue::default();
                {
                    let mut commands = Commands::new(&mut queue, &world);
                    for _ in 0..count {
                        commands.spawn(agent());
                    }
                }
                queue.apply(&mut world);
                black_box(world);
            });
        });
    }

    group.bench_function("despawn_respawn_10k", |b| {
        b.iter_batched(
            || {
                let mut world = World::new();
                let entities: Vec<Entity> = (0..AGENTS_SMALL).map(|_| world.spawn(agent())).collect();
                (world, entities)
            },
            |(mut world, entities)| {
                for &entity in &entities {
                    world.despawn(entity);
                }
                for _ in 0..entities.len() {
                    world.spawn(agent());
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark);
criterion_main!(benches);
