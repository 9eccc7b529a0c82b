//! Core ECS Types, Identifiers, and Bitsets
//!
//! This module defines the small, copyable identifiers shared by every layer
//! of the engine, the growable [`Signature`] bitset used for component sets
//! and access tracking, and the table capacity policy.
//!
//! ## Identifiers
//!
//! All identifiers are newtypes over plain integers. They index into arenas
//! owned by a single [`World`](crate::engine::world::World):
//!
//! - [`ComponentId`] indexes the component registry,
//! - [`ArchetypeId`] indexes the archetype arena,
//! - [`TableId`] indexes the table arena,
//! - [`TableRow`] / [`ArchetypeRow`] index rows within those.
//!
//! Entities never hold references into storage. They resolve through the
//! allocator's location table to these indices.
//!
//! ## Signatures
//!
//! A [`Signature`] is a bitset over a dense index domain. It describes
//! archetype component sets, access read/write sets, matched archetypes of a
//! query, and set membership in the scheduler.
//!
//! Unlike a fixed-width array, a signature grows on demand so that the number
//! of registered component types is not bounded at compile time.

use std::fmt;

/// Minimum non-zero capacity of a table.
pub const MIN_TABLE_CAPACITY: usize = 4;

/// Returns the capacity a table must have to append a row when it already
/// holds `len` rows.
///
/// Capacity doubles starting at [`MIN_TABLE_CAPACITY`]:
///
/// ```text
/// len:      0  1  4  5  8  9  200
/// capacity: 4  4  8  8  16 16 256
/// ```
#[inline]
pub fn table_capacity(len: usize) -> usize {
    (len + 1).next_power_of_two().max(MIN_TABLE_CAPACITY)
}

/// Types usable as the index of a sparse array or signature.
pub trait SparseSetIndex: Copy + Eq {
    /// Returns the dense index of this value.
    fn sparse_set_index(&self) -> usize;

    /// Rebuilds the value from its dense index.
    fn get_sparse_set_index(value: usize) -> Self;
}

impl SparseSetIndex for usize {
    #[inline]
    fn sparse_set_index(&self) -> usize { *self }

    #[inline]
    fn get_sparse_set_index(value: usize) -> Self { value }
}

impl SparseSetIndex for u32 {
    #[inline]
    fn sparse_set_index(&self) -> usize { *self as usize }

    #[inline]
    fn get_sparse_set_index(value: usize) -> Self { value as u32 }
}

macro_rules! index_newtype {
    ($(#[$meta:meta])* $name:ident($repr:ty)) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name($repr);

        impl $name {
            /// Creates the identifier from a dense index.
            #[inline]
            pub const fn new(index: usize) -> Self {
                Self(index as $repr)
            }

            /// Returns the dense index.
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl SparseSetIndex for $name {
            #[inline]
            fn sparse_set_index(&self) -> usize { self.index() }

            #[inline]
            fn get_sparse_set_index(value: usize) -> Self { Self::new(value) }
        }
    };
}

index_newtype!(
    /// Identifier of a component or resource type within one world's registry.
    ComponentId(usize)
);

index_newtype!(
    /// Identifier of an archetype: a unique set of table and sparse-set components.
    ArchetypeId(u32)
);

index_newtype!(
    /// Identifier of a table: a unique set of table-stored components.
    TableId(u32)
);

index_newtype!(
    /// Row of an entity inside its table.
    TableRow(u32)
);

index_newtype!(
    /// Row of an entity inside its archetype's entity list.
    ArchetypeRow(u32)
);

index_newtype!(
    /// Identifier of a registered bundle type.
    BundleId(usize)
);

impl ArchetypeId {
    /// The archetype with no components.
    pub const EMPTY: ArchetypeId = ArchetypeId(0);
    /// Marker for a location that is not bound to any archetype.
    pub const INVALID: ArchetypeId = ArchetypeId(u32::MAX);
}

impl TableId {
    /// The table with no columns.
    pub const EMPTY: TableId = TableId(0);
    /// Marker for a location that is not bound to any table.
    pub const INVALID: TableId = TableId(u32::MAX);
}

impl TableRow {
    /// Marker row for unbound locations.
    pub const INVALID: TableRow = TableRow(u32::MAX);
}

impl ArchetypeRow {
    /// Marker row for unbound locations.
    pub const INVALID: ArchetypeRow = ArchetypeRow(u32::MAX);
}

/// Snapshot of how many archetypes existed at some point.
///
/// Queries and systems remember the generation they last saw so that only
/// archetypes created afterwards need to be matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArchetypeGeneration(pub(crate) usize);

impl ArchetypeGeneration {
    /// Generation before any archetype existed.
    #[inline]
    pub const fn initial() -> Self {
        ArchetypeGeneration(0)
    }
}

/// Growable bitset over a dense index domain.
#[derive(Clone, Default)]
pub struct Signature {
    words: Vec<u64>,
}

impl Signature {
    /// Creates an empty signature with room for `bits` bits.
    pub fn with_capacity(bits: usize) -> Self {
        Self { words: Vec::with_capacity(bits.div_ceil(64)) }
    }

    /// Builds a signature with every index in `indices` set.
    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        let mut signature = Signature::default();
        for index in indices {
            signature.set(index);
        }
        signature
    }

    #[inline]
    fn grow(&mut self, word: usize) {
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
    }

    /// Sets bit `index`.
    #[inline]
    pub fn set(&mut self, index: usize) {
        let word = index / 64;
        self.grow(word);
        self.words[word] |= 1u64 << (index % 64);
    }

    /// Clears bit `index`.
    #[inline]
    pub fn clear(&mut self, index: usize) {
        if let Some(word) = self.words.get_mut(index / 64) {
            *word &= !(1u64 << (index % 64));
        }
    }

    /// Returns `true` if bit `index` is set.
    #[inline]
    pub fn has(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .is_some_and(|word| (word >> (index % 64)) & 1 == 1)
    }

    /// Clears every bit.
    pub fn clear_all(&mut self) {
        self.words.clear();
    }

    /// Returns `true` if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// `self |= other`
    pub fn union_with(&mut self, other: &Signature) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (word, other_word) in self.words.iter_mut().zip(&other.words) {
            *word |= *other_word;
        }
    }

    /// `self &= other`
    pub fn intersect_with(&mut self, other: &Signature) {
        for (index, word) in self.words.iter_mut().enumerate() {
            *word &= other.words.get(index).copied().unwrap_or(0);
        }
    }

    /// `self &= !other`
    pub fn difference_with(&mut self, other: &Signature) {
        for (word, other_word) in self.words.iter_mut().zip(&other.words) {
            *word &= !*other_word;
        }
    }

    /// Returns the intersection of both signatures.
    pub fn intersection(&self, other: &Signature) -> Signature {
        let mut out = self.clone();
        out.intersect_with(other);
        out
    }

    /// Returns `true` if the two signatures share no set bit.
    pub fn is_disjoint(&self, other: &Signature) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .all(|(word, other_word)| word & other_word == 0)
    }

    /// Returns `true` if every bit of `self` is also set in `other`.
    pub fn is_subset(&self, other: &Signature) -> bool {
        self.words.iter().enumerate().all(|(index, word)| {
            let other_word = other.words.get(index).copied().unwrap_or(0);
            word & other_word == *word
        })
    }

    /// Returns `true` if every bit of `signature` is also set in `self`.
    #[inline]
    pub fn contains_all(&self, signature: &Signature) -> bool {
        signature.is_subset(self)
    }

    /// Iterates over the set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let base = word_index * 64;
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some(base + tz)
                })
            })
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        let len = self.words.len().max(other.words.len());
        (0..len).all(|index| {
            self.words.get(index).copied().unwrap_or(0)
                == other.words.get(index).copied().unwrap_or(0)
        })
    }
}

impl Eq for Signature {}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ones()).finish()
    }
}

impl FromIterator<usize> for Signature {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Signature::from_indices(iter)
    }
}

impl Extend<usize> for Signature {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        for index in iter {
            self.set(index);
        }
    }
}
