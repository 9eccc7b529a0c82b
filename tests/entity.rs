use syren_ecs::engine::entity::{Entities, Entity};
use std::num::NonZeroU32;

use syren_ecs::engine::identifier::{inc_masked_high_by, IdKind, Identifier, HIGH_MASK};
use syren_ecs::engine::types::ArchetypeId;

#[test]
fn identifier_packs_low_high_and_kind() {
    let id = Identifier::new(7, 3, IdKind::Entity).unwrap();
    assert_eq!(id.low(), 7);
    assert_eq!(id.masked_high(), 3);
    assert_eq!(id.kind(), IdKind::Entity);
    assert_eq!(Identifier::from_bits(id.to_bits()), Some(id));

    let placeholder = Identifier::new(7, 3, IdKind::Placeholder).unwrap();
    assert_eq!(placeholder.kind(), IdKind::Placeholder);
    assert_ne!(placeholder.to_bits(), id.to_bits());
}

#[test]
fn identifier_rejects_zero_masked_high() {
    assert!(Identifier::new(0, HIGH_MASK, IdKind::Entity).is_some());
    assert!(Identifier::new(0, HIGH_MASK + 1, IdKind::Entity).is_none());
}

#[test]
fn entity_bits_round_trip() {
    let entity = Entity::from_raw(42);
    assert_eq!(entity.index(), 42);
    assert_eq!(entity.generation(), 1);
    assert_eq!(Entity::try_from_bits(entity.to_bits()), Some(entity));

    // A zero generation is never a valid handle.
    assert_eq!(Entity::try_from_bits(42), None);
}

#[test]
fn freed_indices_are_reused_last_in_first_out() {
    let mut entities = Entities::new();
    let a = entities.alloc();
    let b = entities.alloc();
    let c = entities.alloc();
    assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));
    assert_eq!(entities.len(), 3);

    entities.free(a);
    entities.free(c);
    assert_eq!(entities.len(), 1);

    let first = entities.alloc();
    let second = entities.alloc();
    assert_eq!(first.index(), c.index());
    assert_eq!(second.index(), a.index());
    assert_eq!(first.generation(), 2);
    assert_eq!(second.generation(), 2);
    assert_eq!(entities.total_count(), 3);
}

#[test]
fn five_entities_reuse_freed_indices_in_lifo_order() {
    let mut entities = Entities::new();
    let spawned: Vec<Entity> = (0..5).map(|_| entities.alloc()).collect();
    for (index, entity) in spawned.iter().enumerate() {
        assert_eq!((entity.index(), entity.generation()), (index as u32, 1));
    }

    for entity in &spawned[1..4] {
        assert!(entities.free(*entity).is_some());
    }

    let reused: Vec<(u32, u32)> = (0..3)
        .map(|_| {
            let entity = entities.alloc();
            (entity.index(), entity.generation())
        })
        .collect();
    assert_eq!(reused, vec![(3, 2), (2, 2), (1, 2)]);

    assert!(entities.contains(spawned[0]));
    assert!(entities.contains(spawned[4]));
    assert!(!entities.contains(spawned[2]));
    assert_eq!(entities.len(), 5);
}

#[test]
fn masked_generation_stays_in_range() {
    let nz = |value: u32| NonZeroU32::new(value).unwrap();
    let top = nz(HIGH_MASK);

    assert_eq!(inc_masked_high_by(nz(HIGH_MASK - 1), 1).get(), HIGH_MASK);
    assert_eq!(inc_masked_high_by(top, 1).get(), 1);
    assert_eq!(inc_masked_high_by(top, 2).get(), 2);
    assert_eq!(inc_masked_high_by(top, u32::MAX).get(), HIGH_MASK);
    assert_eq!(inc_masked_high_by(nz(1), u32::MAX).get(), 1);

    // The kind bit is ignored, so u32::MAX wraps exactly like HIGH_MASK.
    for increment in [0, 1, 2, 1_000, HIGH_MASK - 1, HIGH_MASK, HIGH_MASK + 1, u32::MAX] {
        let from_mask = inc_masked_high_by(top, increment);
        let from_max = inc_masked_high_by(nz(u32::MAX), increment);
        assert_eq!(from_mask, from_max, "increment {increment}");
        assert!(from_mask.get() <= HIGH_MASK, "increment {increment}");
    }

    for start in [1, 2, HIGH_MASK / 2, HIGH_MASK - 2, HIGH_MASK - 1, HIGH_MASK] {
        for increment in [1, 3, HIGH_MASK - 1, HIGH_MASK, u32::MAX - 1, u32::MAX] {
            let next = inc_masked_high_by(nz(start), increment).get();
            assert!(next >= 1 && next <= HIGH_MASK, "{start} + {increment} gave {next}");
        }
    }
}

#[test]
fn stale_handles_are_rejected() {
    let mut entities = Entities::new();
    let old = entities.alloc();
    assert!(entities.contains(old));

    assert!(entities.free(old).is_some());
    assert!(!entities.contains(old));
    assert!(entities.free(old).is_none(), "double free must be refused");

    let new = entities.alloc();
    assert_eq!(new.index(), old.index());
    assert_ne!(new, old);
    assert!(entities.contains(new));
    assert!(!entities.contains(old));
    assert!(entities.get(old).is_none());
}

#[test]
fn generation_wraps_without_reaching_zero() {
    let mut entities = Entities::new();
    let entity = entities.alloc();
    entities.free(entity);

    // The freed slot sits at generation 2; push it to the top of the range.
    assert!(entities.reserve_generations(entity.index(), HIGH_MASK - 2));
    let last = entities.alloc();
    assert_eq!(last.generation(), HIGH_MASK);

    entities.free(last);
    let wrapped = entities.alloc();
    assert_eq!(wrapped.index(), entity.index());
    assert_eq!(wrapped.generation(), 1);
    assert_ne!(wrapped.to_bits(), last.to_bits());
}

#[test]
fn reserve_generations_refuses_bound_slots() {
    let mut entities = Entities::new();
    let entity = entities.reserve_entity();
    entities.flush(|_, location| location.archetype_id = ArchetypeId::EMPTY);

    assert!(!entities.reserve_generations(entity.index(), 1));
    assert!(!entities.reserve_generations(99, 1));

    entities.free(entity);
    assert!(entities.reserve_generations(entity.index(), 1));
    assert_eq!(entities.alloc().generation(), 3);
}

#[test]
fn reserve_generations_refuses_allocated_but_unplaced_ids() {
    let mut entities = Entities::new();
    let allocated = entities.alloc();
    assert!(entities.get(allocated).is_none());
    assert!(!entities.reserve_generations(allocated.index(), 1));
    assert!(entities.contains(allocated));

    let reserved = entities.reserve_entity();
    entities.flush_as_invalid();
    assert!(!entities.reserve_generations(reserved.index(), 1));
    assert!(entities.contains(reserved));
}

#[test]
fn reserved_ids_become_live_on_flush() {
    let mut entities = Entities::new();
    let reused = entities.alloc();
    entities.free(reused);

    let from_free_list = entities.reserve_entity();
    let brand_new = entities.reserve_entity();
    assert_eq!(from_free_list.index(), reused.index());
    assert_eq!(brand_new.index(), 1);
    assert!(entities.contains(from_free_list));
    assert!(entities.contains(brand_new));
    assert!(entities.needs_flush());

    let mut flushed = Vec::new();
    entities.flush(|entity, location| {
        location.archetype_id = ArchetypeId::EMPTY;
        flushed.push(entity);
    });
    flushed.sort();
    assert_eq!(flushed, vec![from_free_list, brand_new]);
    assert!(!entities.needs_flush());
    assert_eq!(entities.len(), 2);
    assert!(entities.get(brand_new).is_some());
}

#[test]
fn flush_as_invalid_leaves_ids_contained_but_unbound() {
    let mut entities = Entities::new();
    let reserved = entities.reserve_entity();
    entities.flush_as_invalid();
    assert!(entities.contains(reserved));
    assert!(entities.get(reserved).is_none());
    assert_eq!(entities.resolve_from_id(reserved.index()), Some(reserved));
}
