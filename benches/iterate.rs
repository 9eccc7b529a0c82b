use criterion::*;
use std::hint::black_box;

use syren_ecs::prelude::*;

mod common;
use common::*;

fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");
    group.throughput(Throughput::Elements(AGENTS_MED as u64));

    group.bench_function("write_wealth_100k", |b| {
        let mut world = setup_world(AGENTS_MED);
        let mut query = world.query::<&mut Wealth>();
        b.iter(|| {
            for mut wealth in query.iter_mut(&mut world) {
                wealth.value *= 1.0001;
            }
        });
    });

    group.bench_function("read_productivity_100k", |b| {
        let mut world = setup_world(AGENTS_MED);
        let mut query = world.query::<&Productivity>();
        b.iter(|| {
            let total: f32 = query.iter(&world).map(|p| p.rate).sum();
            black_box(total);
        });
    });

    group.bench_function("read_write_prod_to_wealth_100k", |b| {
        let mut world = setup_world(AGENTS_MED);
        let mut query = world.query::<(&Productivity, &mut Wealth)>();
        b.iter(|| {
            for (productivity, mut wealth) in query.iter_mut(&mut world) {
                wealth.value += productivity.rate;
            }
        });
    });

    group.bench_function("filtered_sparse_100k", |b| {
        let mut world = setup_world(AGENTS_MED);
        let mut query = world.query_filtered::<&Wealth, With<Employed>>();
        b.iter(|| {
            let total: f32 = query.iter(&world).map(|w| w.value).sum();
            black_box(total);
        });
    });

    group.bench_function("changed_wealth_100k", |b| {
        let mut world = setup_world(AGENTS_MED);
        let mut query = world.query_filtered::<Entity, Changed<Wealth>>();
        b.iter(|| {
            world.clear_trackers();
            black_box(query.iter(&world).count());
        });
    });

    group.finish();
}

criterion_group!(benches, iterate_benchmark);
criterion_main!(benches);
