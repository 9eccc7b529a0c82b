//! Entity handles and the generational allocator.
//!
//! ## Purpose
//! An [`Entity`] is a lightweight `(index, generation)` handle. The index
//! selects a slot in the [`Entities`] table; the generation detects handles
//! that outlived the entity they named.
//!
//! ## Design
//! - Freed indices are pushed onto a LIFO free list and their generation is
//!   bumped immediately, so a stale handle never matches the slot again.
//! - [`Entities::reserve_entity`] hands out ids through `&self` using an
//!   atomic cursor into the free list. Reserved ids become real only at the
//!   next [`Entities::flush`].
//! - Every slot stores an [`EntityLocation`] pointing into archetype and
//!   table storage. Storage never points back into the allocator.
//!
//! ## Invariants
//! - Generations start at `1`, never decrease and skip `0` on wrap.
//! - `get` returns a location only for the live generation of a bound slot.
//! - Mutating operations require that no reservation is pending.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicIsize, Ordering};

use crate::engine::identifier::{inc_masked_high_by, IdKind, Identifier};
use crate::engine::types::{ArchetypeId, ArchetypeRow, TableId, TableRow};


/// Generational entity handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: NonZeroU32,
}

impl Entity {
    /// Handle that never names a live entity.
    pub const PLACEHOLDER: Entity = Entity::from_raw(u32::MAX);

    /// Builds a handle for `index` at generation `1`.
    #[inline]
    pub const fn from_raw(index: u32) -> Entity {
        Entity { index, generation: NonZeroU32::MIN }
    }

    #[inline]
    pub(crate) const fn from_raw_and_generation(index: u32, generation: NonZeroU32) -> Entity {
        Entity { index, generation }
    }

    /// Slot index of this handle.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of this handle.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation.get()
    }

    /// Packs the handle into a `u64` (index low, generation high).
    #[inline]
    pub const fn to_bits(self) -> u64 {
        (self.generation.get() as u64) << 32 | self.index as u64
    }

    /// Rebuilds a handle from [`Entity::to_bits`].
    ///
    /// Returns `None` for values that are not entity identifiers.
    pub const fn try_from_bits(bits: u64) -> Option<Entity> {
        match Identifier::from_bits(bits) {
            Some(id) => match id.kind() {
                IdKind::Entity => match NonZeroU32::new(id.masked_high()) {
                    Some(generation) => Some(Entity { index: id.low(), generation }),
                    None => None,
                },
                IdKind::Placeholder => None,
            },
            None => None,
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Where an entity's data currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    /// Archetype the entity belongs to.
    pub archetype_id: ArchetypeId,
    /// Row in the archetype's entity list.
    pub archetype_row: ArchetypeRow,
    /// Table holding the entity's table components.
    pub table_id: TableId,
    /// Row in that table.
    pub table_row: TableRow,
}

impl EntityLocation {
    /// Location of a slot that is reserved or dead.
    pub const INVALID: EntityLocation = EntityLocation {
        archetype_id: ArchetypeId::INVALID,
        archetype_row: ArchetypeRow::INVALID,
        table_id: TableId::INVALID,
        table_row: TableRow::INVALID,
    };
}

#[derive(Clone, Copy, Debug)]
struct EntityMeta {
    generation: NonZeroU32,
    location: EntityLocation,
}

impl EntityMeta {
    const EMPTY: EntityMeta = EntityMeta {
        generation: NonZeroU32::MIN,
        location: EntityLocation::INVALID,
    };
}

/// Generational free-list allocator with entity locations.
///
/// ## Reservation
/// `free_cursor` indexes into `pending`. Values `> 0` mean that many freed
/// indices are still available for reservation. Negative values count how
/// many brand-new indices past `meta.len()` have been reserved.
#[derive(Debug, Default)]
pub struct Entities {
    meta: Vec<EntityMeta>,
    pending: Vec<u32>,
    free_cursor: AtomicIsize,
    len: u32,
}

impl Entities {
    /// Creates an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an entity, reusing the most recently freed index first.
    pub fn alloc(&mut self) -> Entity {
        self.verify_flushed();
        self.len += 1;
        if let Some(index) = self.pending.pop() {
            *self.free_cursor.get_mut() = self.pending.len() as isize;
            Entity::from_raw_and_generation(index, self.meta[index as usize].generation)
        } else {
            let index = u32::try_from(self.meta.len())
                .unwrap_or_else(|_| panic!("too many entities"));
            self.meta.push(EntityMeta::EMPTY);
            Entity::from_raw(index)
        }
    }

    /// Reserves an entity id through a shared reference.
    ///
    /// The id is handed a location at the next [`Entities::flush`].
    pub fn reserve_entity(&self) -> Entity {
        let n = self.free_cursor.fetch_sub(1, Ordering::Relaxed);
        if n > 0 {
            let index = self.pending[(n - 1) as usize];
            Entity::from_raw_and_generation(index, self.meta[index as usize].generation)
        } else {
            let index = u32::try_from(self.meta.len() as isize - n)
                .unwrap_or_else(|_| panic!("too many entities"));
            Entity::from_raw(index)
        }
    }

    /// Frees `entity`, returning its last location.
    ///
    /// Returns `None` if the handle is stale or was already freed.
    pub fn free(&mut self, entity: Entity) -> Option<EntityLocation> {
        self.verify_flushed();
        let meta = self.meta.get_mut(entity.index() as usize)?;
        if meta.generation != entity.generation {
            return None;
        }
        meta.generation = inc_masked_high_by(meta.generation, 1);
        let location = std::mem::replace(&mut meta.location, EntityLocation::INVALID);

        self.pending.push(entity.index());
        *self.free_cursor.get_mut() = self.pending.len() as isize;
        self.len -= 1;
        Some(location)
    }

    /// Advances the generation of a free index by `generations`.
    ///
    /// Only indices on the free list qualify. Returns `false` for live ids,
    /// including ids that are allocated but not yet bound to a location, and
    /// for out-of-range indices.
    pub fn reserve_generations(&mut self, index: u32, generations: u32) -> bool {
        self.verify_flushed();
        if !self.pending.contains(&index) {
            return false;
        }
        match self.meta.get_mut(index as usize) {
            Some(meta) => {
                meta.generation = inc_masked_high_by(meta.generation, generations);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if `entity` is allocated or reserved at its generation.
    pub fn contains(&self, entity: Entity) -> bool {
        self.resolve_from_id(entity.index())
            .is_some_and(|resolved| resolved.generation == entity.generation)
    }

    /// Location of a live, flushed entity.
    pub fn get(&self, entity: Entity) -> Option<EntityLocation> {
        let meta = self.meta.get(entity.index() as usize)?;
        if meta.generation != entity.generation
            || meta.location.archetype_id == ArchetypeId::INVALID
        {
            return None;
        }
        Some(meta.location)
    }

    /// Rebinds the location of a live index.
    ///
    /// ## Invariants
    /// `index` must name a flushed, live slot.
    #[inline]
    pub(crate) fn set(&mut self, index: u32, location: EntityLocation) {
        self.meta[index as usize].location = location;
    }

    /// Returns the current handle for `index`, including reserved indices.
    pub fn resolve_from_id(&self, index: u32) -> Option<Entity> {
        let idu = index as usize;
        if let Some(meta) = self.meta.get(idu) {
            return Some(Entity::from_raw_and_generation(index, meta.generation));
        }
        let free_cursor = self.free_cursor.load(Ordering::Relaxed);
        let num_pending = usize::try_from(-free_cursor).unwrap_or(0);
        (idu < self.meta.len() + num_pending).then_some(Entity::from_raw(index))
    }

    /// Returns `true` if reserved ids are waiting for [`Entities::flush`].
    #[inline]
    pub fn needs_flush(&mut self) -> bool {
        *self.free_cursor.get_mut() != self.pending.len() as isize
    }

    #[inline]
    fn verify_flushed(&mut self) {
        debug_assert!(
            !self.needs_flush(),
            "flush() needs to be called before this operation is legal"
        );
    }

    /// Binds every reserved id by calling `init` with its location slot.
    ///
    /// Ids whose slot `init` leaves untouched stay contained but invalid.
    pub fn flush(&mut self, mut init: impl FnMut(Entity, &mut EntityLocation)) {
        let free_cursor = self.free_cursor.get_mut();
        let current_free_cursor = *free_cursor;

        let new_free_cursor = if current_free_cursor >= 0 {
            current_free_cursor as usize
        } else {
            let old_meta_len = self.meta.len();
            let new_meta_len = old_meta_len + current_free_cursor.unsigned_abs();
            self.meta.resize(new_meta_len, EntityMeta::EMPTY);
            self.len += current_free_cursor.unsigned_abs() as u32;
            for (index, meta) in self.meta.iter_mut().enumerate().skip(old_meta_len) {
                init(
                    Entity::from_raw_and_generation(index as u32, meta.generation),
                    &mut meta.location,
                );
            }
            *free_cursor = 0;
            0
        };

        self.len += (self.pending.len() - new_free_cursor) as u32;
        for index in self.pending.drain(new_free_cursor..) {
            let meta = &mut self.meta[index as usize];
            init(
                Entity::from_raw_and_generation(index, meta.generation),
                &mut meta.location,
            );
        }
    }

    /// Flushes reserved ids without binding them to storage.
    pub fn flush_as_invalid(&mut self) {
        self.flush(|_entity, location| {
            location.archetype_id = ArchetypeId::INVALID;
        });
    }

    /// Number of live (allocated or flushed) entities.
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Returns `true` if no entity is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever created.
    #[inline]
    pub fn total_count(&self) -> usize {
        self.meta.len()
    }
}
