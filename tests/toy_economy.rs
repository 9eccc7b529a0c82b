use syren_ecs::prelude::*;
use syren_ecs::{LogLevel, ScheduleBuildSettings};

#[derive(Clone, Copy)]
struct AgentTag;
impl Component for AgentTag {}

#[derive(Clone, Copy)]
struct FirmTag;
impl Component for FirmTag {}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Cash(f32);
impl Component for Cash {}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Hunger(f32);
impl Component for Hunger {}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Inventory(f32);
impl Component for Inventory {}

#[derive(Clone, Copy)]
struct Production(f32);
impl Component for Production {}

#[derive(Clone, Copy)]
struct Wage(f32);
impl Component for Wage {}

#[derive(Clone, Copy)]
struct TargetInventory(f32);
impl Component for TargetInventory {}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Price(f32);
impl Component for Price {}

#[derive(Default)]
struct Step(u32);
impl Resource for Step {}

const FIRMS: usize = 10;
const AGENTS: usize = 1_000;
const STEPS: u32 = 30;

fn production(mut firms: Query<(&Production, &TargetInventory, &mut Inventory)>) {
    for (production, target, mut inventory) in firms.iter_mut() {
        if inventory.0 < target.0 {
            inventory.0 += production.0;
        }
    }
}

fn wage_payment(mut firms: Query<(&Production, &Wage, &mut Cash)>) {
    for (production, wage, mut cash) in firms.iter_mut() {
        cash.0 -= production.0 * wage.0;
    }
}

fn pricing(mut firms: Query<(&Inventory, &TargetInventory, &mut Price)>) {
    for (inventory, target, mut price) in firms.iter_mut() {
        if inventory.0 < target.0 {
            price.0 *= 1.01;
        } else {
            price.0 *= 0.99;
        }
    }
}

fn spending(mut agents: Query<&mut Cash, With<AgentTag>>) {
    for mut cash in agents.iter_mut() {
        if cash.0 >= 1.0 {
            cash.0 -= 1.0;
        }
    }
}

fn hunger(mut agents: Query<(&Cash, &mut Hunger)>) {
    for (cash, mut hunger) in agents.iter_mut() {
        if cash.0 >= 0.0 {
            hunger.0 = (hunger.0 - 1.0).max(0.0);
        } else {
            hunger.0 += 1.0;
        }
    }
}

fn advance(mut step: ResMut<Step>) {
    step.0 += 1;
}

fn populate() -> World {
    let mut world = World::new();
    world.init_resource::<Step>();
    for _ in 0..FIRMS {
        world.spawn((
            FirmTag,
            Cash(10_000.0),
            Inventory(100.0),
            Production(5.0),
            Wage(1.0),
            TargetInventory(200.0),
            Price(1.0),
        ));
    }
    for _ in 0..AGENTS {
        world.spawn((AgentTag, Cash(100.0), Hunger(0.0)));
    }
    world
}

fn economy(kind: ExecutorKind) -> Schedule {
    let mut schedule = Schedule::default();
    schedule.set_executor_kind(kind);
    schedule.set_build_settings(ScheduleBuildSettings {
        ambiguity_detection: LogLevel::Error,
        ..Default::default()
    });
    schedule.add_systems((
        production,
        wage_payment,
        pricing.after(production),
        spending.after(wage_payment),
        hunger.after(spending),
        advance,
    ));
    schedule
}

fn simulate(kind: ExecutorKind) -> World {
    let mut world = populate();
    let mut schedule = economy(kind);
    for _ in 0..STEPS {
        schedule.run(&mut world).unwrap();
    }
    world
}

fn firm_prices(world: &mut World) -> Vec<f32> {
    let mut query = world.query_filtered::<&Price, With<FirmTag>>();
    query.iter(world).map(|price| price.0).collect()
}

#[test]
fn toy_economy_reaches_expected_state() {
    let mut world = simulate(ExecutorKind::SingleThreaded);
    assert_eq!(world.resource::<Step>().0, STEPS);

    let mut firms = world.query_filtered::<(&Cash, &Inventory), With<FirmTag>>();
    for (cash, inventory) in firms.iter(&world) {
        assert_eq!(cash.0, 10_000.0 - 5.0 * STEPS as f32);
        assert_eq!(inventory.0, 200.0);
    }

    // Inventory is below target for the first 19 steps.
    let expected = 1.01f32.powi(19) * 0.99f32.powi(STEPS as i32 - 19);
    let prices = firm_prices(&mut world);
    assert_eq!(prices.len(), FIRMS);
    for price in prices {
        assert!((price - expected).abs() < 1e-4, "{price} vs {expected}");
    }

    let mut agents = world.query_filtered::<(&Cash, &Hunger), With<AgentTag>>();
    assert_eq!(agents.iter(&world).count(), AGENTS);
    for (cash, hunger) in agents.iter(&world) {
        assert_eq!(*cash, Cash(100.0 - STEPS as f32));
        assert_eq!(*hunger, Hunger(0.0));
    }
}

#[test]
fn toy_economy_is_deterministic_across_executors() {
    let mut single = simulate(ExecutorKind::SingleThreaded);
    let mut multi = simulate(ExecutorKind::MultiThreaded);
    assert_eq!(firm_prices(&mut single), firm_prices(&mut multi));

    let cash = |world: &mut World| -> Vec<f32> {
        let mut query = world.query::<&Cash>();
        query.iter(world).map(|cash| cash.0).collect()
    };
    assert_eq!(cash(&mut single), cash(&mut multi));
}

#[test]
fn unordered_cash_writers_are_reported() {
    let mut world = populate();
    let mut schedule = Schedule::default();
    schedule.set_build_settings(ScheduleBuildSettings {
        ambiguity_detection: LogLevel::Error,
        ..Default::default()
    });
    schedule.add_systems((wage_payment, spending));
    assert!(matches!(
        schedule.run(&mut world),
        Err(RunError::Build(syren_ecs::ScheduleBuildError::Ambiguity(_)))
    ));
}
