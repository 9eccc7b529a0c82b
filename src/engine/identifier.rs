//! Packed generational identifiers.
//!
//! An [`Identifier`] is a 64-bit value split into a 32-bit low segment and a
//! 32-bit high segment:
//!
//! ```text
//! | kind (1 bit) | masked high (31 bits) | low (32 bits) |
//! ```
//!
//! For entities the low segment is the slot index and the masked high segment
//! is the generation. The top bit discriminates between real entities and
//! placeholder identifiers.
//!
//! ## Invariants
//! - The masked high value is never `0` and never exceeds [`HIGH_MASK`].
//! - Incrementing past [`HIGH_MASK`] wraps to `1`, skipping `0`.

use std::num::NonZeroU32;

/// Mask of the 31 generation bits of the high segment.
pub const HIGH_MASK: u32 = 0x7FFF_FFFF;

/// Mask of the kind discriminant bit of the high segment.
pub const KIND_MASK: u32 = !HIGH_MASK;

/// Discriminates what an [`Identifier`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// A live or dead entity.
    Entity,
    /// A stand-in identifier that does not name an allocator slot.
    Placeholder,
}

/// A packed `(low, high, kind)` identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    low: u32,
    high: NonZeroU32,
}

impl Identifier {
    /// Packs `low` and `high` with the given kind.
    ///
    /// Returns `None` if the masked high value is `0`.
    #[inline]
    pub const fn new(low: u32, high: u32, kind: IdKind) -> Option<Self> {
        if high & HIGH_MASK == 0 {
            return None;
        }
        let packed_high = match kind {
            IdKind::Entity => high & HIGH_MASK,
            IdKind::Placeholder => (high & HIGH_MASK) | KIND_MASK,
        };
        match NonZeroU32::new(packed_high) {
            Some(high) => Some(Self { low, high }),
            None => None,
        }
    }

    /// Low segment (the entity index).
    #[inline]
    pub const fn low(self) -> u32 {
        self.low
    }

    /// Masked high segment (the entity generation), always in `1..=HIGH_MASK`.
    #[inline]
    pub const fn masked_high(self) -> u32 {
        self.high.get() & HIGH_MASK
    }

    /// Kind stored in the discriminant bit.
    #[inline]
    pub const fn kind(self) -> IdKind {
        if self.high.get() & KIND_MASK == 0 {
            IdKind::Entity
        } else {
            IdKind::Placeholder
        }
    }

    /// Packs into a single `u64`.
    #[inline]
    pub const fn to_bits(self) -> u64 {
        (self.high.get() as u64) << 32 | self.low as u64
    }

    /// Unpacks a value produced by [`Identifier::to_bits`].
    ///
    /// Returns `None` if the masked high value is `0`.
    #[inline]
    pub const fn from_bits(bits: u64) -> Option<Self> {
        let high = (bits >> 32) as u32;
        let low = bits as u32;
        if high & HIGH_MASK == 0 {
            return None;
        }
        match NonZeroU32::new(high) {
            Some(high) => Some(Self { low, high }),
            None => None,
        }
    }
}

/// Adds `rhs` to the masked part of `lhs`, wrapping from [`HIGH_MASK`] to `1`.
///
/// The kind bit of `lhs` and `rhs` is ignored, so wrapping from `u32::MAX`
/// behaves exactly like wrapping from [`HIGH_MASK`]. The result never exceeds
/// [`HIGH_MASK`] and is never `0`.
#[inline]
pub const fn inc_masked_high_by(lhs: NonZeroU32, rhs: u32) -> NonZeroU32 {
    let lo = (lhs.get() & HIGH_MASK).wrapping_add(rhs & HIGH_MASK);
    // Bit 31 is set exactly when the 31-bit sum overflowed.
    let overflowed = lo >> 31;
    match NonZeroU32::new(lo.wrapping_add(overflowed) & HIGH_MASK) {
        Some(value) => value,
        None => NonZeroU32::MIN,
    }
}
