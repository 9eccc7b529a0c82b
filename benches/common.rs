#![allow(dead_code)]

use syren_ecs::prelude::*;

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;
pub const AGENTS_LARGE: usize = 1_000_000;

#[derive(Clone, Copy)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}
impl Component for Position {}

#[derive(Clone, Copy)]
pub struct Wealth {
    pub value: f32,
}
impl Component for Wealth {}

#[derive(Clone, Copy)]
pub struct Productivity {
    pub rate: f32,
}
impl Component for Productivity {}

/// Marks every tenth agent; sparse so toggling it does not move rows.
#[derive(Clone, Copy)]
pub struct Employed;
impl Component for Employed {
    const STORAGE_TYPE: StorageType = StorageType::SparseSet;
}

pub fn agent() -> (Position, Wealth, Productivity) {
    (Position { x: 0.0, y: 0.0 }, Wealth { value: 100.0 }, Productivity { rate: 1.0 })
}

pub fn setup_world(agent_count: usize) -> World {
    let mut world = World::new();
    for i in 0..agent_count {
        let entity = world.spawn(agent());
        if i % 10 == 0 {
            world.insert(entity, Employed);
        }
    }
    world
}
