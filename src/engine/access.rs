//! # Access and Conflict Model
//!
//! Static descriptions of what a query or system touches, used to decide
//! which systems may run concurrently and to report ambiguous orderings.
//!
//! ## Purpose
//! Every query, resource parameter and exclusive system declares its
//! footprint as an [`Access`]. Queries add filters on top ([`FilteredAccess`])
//! so that two queries that can never match the same entity are recognized
//! as disjoint even when their read/write sets overlap. A system's parameters
//! are collected in a [`FilteredAccessSet`].
//!
//! ## Design
//! - All sets are [`Signature`] bitsets over [`ComponentId`] indices.
//!   Components and resources share the id space.
//! - A write implies a read: `reads_and_writes` always contains `writes`.
//! - `reads_all` / `writes_all` stand for "the whole world" (`&World` and
//!   `&mut World`). `write_all` implies `read_all`.
//! - Archetypal entries record that a query inspects *whether* an entity has
//!   a component without touching its value (`With`, `Without`). They never
//!   conflict with value access, only with `writes_all`, which can change
//!   archetypes structurally.
//! - Filters are kept in disjunctive normal form: `filter_sets` is a list of
//!   OR-alternatives, each an AND of `with` and `without` constraints.
//!
//! ## Invariants
//! - Two accesses that only read never conflict.
//! - A write conflicts with any overlapping read or write.
//! - `reads_all` conflicts with any write; two `reads_all` are compatible.
//! - Conflict reporting errs on the side of false positives: a missed
//!   conflict is a soundness bug, an extra one only serializes systems.

use std::fmt;

use crate::engine::component::Components;
use crate::engine::types::{ComponentId, Signature};


/// Read/write footprint over component and resource ids.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Access {
    reads_and_writes: Signature,
    writes: Signature,
    archetypal: Signature,
    reads_all: bool,
    writes_all: bool,
}

impl fmt::Debug for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Access")
            .field("read_and_writes", &self.reads_and_writes)
            .field("writes", &self.writes)
            .field("archetypal", &self.archetypal)
            .field("reads_all", &self.reads_all)
            .field("writes_all", &self.writes_all)
            .finish()
    }
}

impl Access {
    /// Empty access.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a read of `id`.
    pub fn add_read(&mut self, id: ComponentId) {
        self.reads_and_writes.set(id.index());
    }

    /// Adds a write of `id`. Writes imply reads.
    pub fn add_write(&mut self, id: ComponentId) {
        self.reads_and_writes.set(id.index());
        self.writes.set(id.index());
    }

    /// Adds an archetypal observation of `id`.
    pub fn add_archetypal(&mut self, id: ComponentId) {
        self.archetypal.set(id.index());
    }

    /// Returns `true` if `id` may be read.
    pub fn has_read(&self, id: ComponentId) -> bool {
        self.reads_all || self.reads_and_writes.has(id.index())
    }

    /// Returns `true` if anything may be read.
    pub fn has_any_read(&self) -> bool {
        self.reads_all || !self.reads_and_writes.is_empty()
    }

    /// Returns `true` if `id` may be written.
    pub fn has_write(&self, id: ComponentId) -> bool {
        self.writes_all || self.writes.has(id.index())
    }

    /// Returns `true` if anything may be written.
    pub fn has_any_write(&self) -> bool {
        self.writes_all || !self.writes.is_empty()
    }

    /// Returns `true` if `id` is observed archetypally.
    pub fn has_archetypal(&self, id: ComponentId) -> bool {
        self.archetypal.has(id.index())
    }

    /// Grants read access to everything.
    pub fn read_all(&mut self) {
        self.reads_all = true;
    }

    /// Grants write access to everything, which implies reading everything.
    pub fn write_all(&mut self) {
        self.reads_all = true;
        self.writes_all = true;
    }

    /// Returns `true` if everything may be read.
    pub fn has_read_all(&self) -> bool {
        self.reads_all
    }

    /// Returns `true` if everything may be written.
    pub fn has_write_all(&self) -> bool {
        self.writes_all
    }

    /// Removes all accesses.
    pub fn clear(&mut self) {
        self.reads_all = false;
        self.writes_all = false;
        self.reads_and_writes.clear_all();
        self.writes.clear_all();
        self.archetypal.clear_all();
    }

    /// Adds every access of `other`.
    pub fn extend(&mut self, other: &Access) {
        self.reads_all |= other.reads_all;
        self.writes_all |= other.writes_all;
        self.reads_and_writes.union_with(&other.reads_and_writes);
        self.writes.union_with(&other.writes);
        self.archetypal.union_with(&other.archetypal);
    }

    fn has_any_observation(&self) -> bool {
        self.has_any_read() || !self.archetypal.is_empty()
    }

    /// Returns `true` if both accesses can be held at the same time.
    pub fn is_compatible(&self, other: &Access) -> bool {
        if self.writes_all {
            return !other.has_any_observation();
        }
        if other.writes_all {
            return !self.has_any_observation();
        }
        if self.reads_all {
            return !other.has_any_write();
        }
        if other.reads_all {
            return !self.has_any_write();
        }
        self.writes.is_disjoint(&other.reads_and_writes)
            && other.writes.is_disjoint(&self.reads_and_writes)
    }

    /// Returns `true` if everything this access touches is also touched by `other`.
    pub fn is_subset(&self, other: &Access) -> bool {
        if self.writes_all {
            return other.writes_all;
        }
        if other.writes_all {
            return true;
        }
        if self.reads_all {
            return other.reads_all;
        }
        if other.reads_all {
            return self.writes.is_subset(&other.writes);
        }
        self.reads_and_writes.is_subset(&other.reads_and_writes) && self.writes.is_subset(&other.writes)
    }

    /// Component ids on which the two accesses conflict.
    pub fn get_conflicts(&self, other: &Access) -> AccessConflicts {
        let mut conflicts = Signature::default();
        if self.reads_all {
            if other.writes_all {
                return AccessConflicts::All;
            }
            conflicts.union_with(&other.writes);
        }
        if other.reads_all {
            if self.writes_all {
                return AccessConflicts::All;
            }
            conflicts.union_with(&self.writes);
        }
        if self.writes_all {
            conflicts.union_with(&other.reads_and_writes);
            conflicts.union_with(&other.archetypal);
        }
        if other.writes_all {
            conflicts.union_with(&self.reads_and_writes);
            conflicts.union_with(&self.archetypal);
        }
        conflicts.union_with(&self.writes.intersection(&other.reads_and_writes));
        conflicts.union_with(&self.reads_and_writes.intersection(&other.writes));
        AccessConflicts::Individual(conflicts)
    }

    /// Ids read, including those written.
    pub fn reads_and_writes(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.reads_and_writes.ones().map(ComponentId::new)
    }

    /// Ids written.
    pub fn writes(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.writes.ones().map(ComponentId::new)
    }

    /// Ids observed archetypally.
    pub fn archetypal(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.archetypal.ones().map(ComponentId::new)
    }
}

/// Result of a conflict check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessConflicts {
    /// Conflict on the entire world.
    All,
    /// Conflict on these ids. Empty means no conflict.
    Individual(Signature),
}

impl AccessConflicts {
    /// No conflicts.
    pub fn empty() -> Self {
        AccessConflicts::Individual(Signature::default())
    }

    /// Returns `true` if there is no conflict.
    pub fn is_empty(&self) -> bool {
        match self {
            AccessConflicts::All => false,
            AccessConflicts::Individual(set) => set.is_empty(),
        }
    }

    /// Merges `other` into `self`.
    pub fn add(&mut self, other: &AccessConflicts) {
        match (self, other) {
            (this, AccessConflicts::All) => *this = AccessConflicts::All,
            (AccessConflicts::Individual(this), AccessConflicts::Individual(other)) => {
                this.union_with(other);
            }
            (AccessConflicts::All, AccessConflicts::Individual(_)) => {}
        }
    }

    /// Conflicting ids, empty for [`AccessConflicts::All`].
    pub fn ids(&self) -> Vec<ComponentId> {
        match self {
            AccessConflicts::All => Vec::new(),
            AccessConflicts::Individual(set) => set.ones().map(ComponentId::new).collect(),
        }
    }

    /// Human-readable description using registered type names.
    pub fn describe(&self, components: &Components) -> String {
        match self {
            AccessConflicts::All => "world".to_string(),
            AccessConflicts::Individual(set) => set
                .ones()
                .map(|index| components.get_name(ComponentId::new(index)).into_owned())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl From<Vec<ComponentId>> for AccessConflicts {
    fn from(ids: Vec<ComponentId>) -> Self {
        AccessConflicts::Individual(ids.into_iter().map(|id| id.index()).collect())
    }
}

/// One AND-clause of a filter: required present and required absent ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessFilters {
    with: Signature,
    without: Signature,
}

impl AccessFilters {
    /// Returns `true` if no entity can satisfy both clauses.
    fn is_ruled_out_by(&self, other: &AccessFilters) -> bool {
        !self.with.is_disjoint(&other.without) || !self.without.is_disjoint(&other.with)
    }

    /// Ids that must be present.
    pub fn with(&self) -> &Signature {
        &self.with
    }

    /// Ids that must be absent.
    pub fn without(&self) -> &Signature {
        &self.without
    }
}

/// An [`Access`] restricted by entity filters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilteredAccess {
    access: Access,
    required: Signature,
    filter_sets: Vec<AccessFilters>,
}

impl Default for FilteredAccess {
    fn default() -> Self {
        Self::matches_everything()
    }
}

impl From<FilteredAccess> for FilteredAccessSet {
    fn from(filtered_access: FilteredAccess) -> Self {
        let mut set = FilteredAccessSet::default();
        set.add(filtered_access);
        set
    }
}

impl FilteredAccess {
    /// Access with no filter constraints.
    pub fn matches_everything() -> Self {
        Self { access: Access::default(), required: Signature::default(), filter_sets: vec![AccessFilters::default()] }
    }

    /// Access whose filter can never be satisfied.
    pub fn matches_nothing() -> Self {
        Self { access: Access::default(), required: Signature::default(), filter_sets: Vec::new() }
    }

    /// Unfiltered access.
    #[inline]
    pub fn access(&self) -> &Access {
        &self.access
    }

    /// Mutable unfiltered access.
    #[inline]
    pub fn access_mut(&mut self) -> &mut Access {
        &mut self.access
    }

    /// Ids an entity must have to be matched.
    #[inline]
    pub fn required(&self) -> &Signature {
        &self.required
    }

    #[inline]
    pub(crate) fn required_mut(&mut self) -> &mut Signature {
        &mut self.required
    }

    /// Filter clauses in disjunctive normal form.
    #[inline]
    pub fn filter_sets(&self) -> &[AccessFilters] {
        &self.filter_sets
    }

    /// Adds a read of `id`, requiring the component to be present.
    pub fn add_read(&mut self, id: ComponentId) {
        self.access.add_read(id);
        self.add_required(id);
        self.and_with(id);
    }

    /// Adds a write of `id`, requiring the component to be present.
    pub fn add_write(&mut self, id: ComponentId) {
        self.access.add_write(id);
        self.add_required(id);
        self.and_with(id);
    }

    fn add_required(&mut self, id: ComponentId) {
        self.required.set(id.index());
    }

    /// Requires `id` to be present in every alternative.
    pub fn and_with(&mut self, id: ComponentId) {
        for filter in &mut self.filter_sets {
            filter.with.set(id.index());
        }
    }

    /// Requires `id` to be absent in every alternative.
    pub fn and_without(&mut self, id: ComponentId) {
        for filter in &mut self.filter_sets {
            filter.without.set(id.index());
        }
    }

    /// Adds `other`'s filter alternatives as OR-branches.
    pub fn append_or(&mut self, other: &FilteredAccess) {
        self.filter_sets.extend(other.filter_sets.iter().cloned());
    }

    /// Adds `other`'s accesses without touching filters.
    pub fn extend_access(&mut self, other: &FilteredAccess) {
        self.access.extend(&other.access);
    }

    /// Returns `true` if both can be held at the same time, either because
    /// their accesses are compatible or because their filters are disjoint.
    pub fn is_compatible(&self, other: &FilteredAccess) -> bool {
        if self.access.is_compatible(&other.access) {
            return true;
        }
        self.filter_sets.iter().all(|filter| {
            other.filter_sets.iter().all(|other_filter| filter.is_ruled_out_by(other_filter))
        })
    }

    /// Component ids on which the two conflict, honoring filter disjointness.
    pub fn get_conflicts(&self, other: &FilteredAccess) -> AccessConflicts {
        if !self.is_compatible(other) {
            return self.access.get_conflicts(&other.access);
        }
        AccessConflicts::empty()
    }

    /// ANDs `other` into `self`: accesses and requirements union, filters
    /// combine pairwise.
    pub fn extend(&mut self, other: &FilteredAccess) {
        self.access.extend(&other.access);
        self.required.union_with(&other.required);

        if let [only] = other.filter_sets.as_slice() {
            for filter in &mut self.filter_sets {
                filter.with.union_with(&only.with);
                filter.without.union_with(&only.without);
            }
            return;
        }

        let mut new_filters = Vec::with_capacity(self.filter_sets.len() * other.filter_sets.len());
        for filter in &self.filter_sets {
            for other_filter in &other.filter_sets {
                let mut combined = filter.clone();
                combined.with.union_with(&other_filter.with);
                combined.without.union_with(&other_filter.without);
                new_filters.push(combined);
            }
        }
        self.filter_sets = new_filters;
    }

    /// Grants read access to everything.
    pub fn read_all(&mut self) {
        self.access.read_all();
    }

    /// Grants write access to everything.
    pub fn write_all(&mut self) {
        self.access.write_all();
    }

    /// Returns `true` if `self` accesses and requires no more than `other`.
    pub fn is_subset(&self, other: &FilteredAccess) -> bool {
        self.required.is_subset(&other.required) && self.access.is_subset(&other.access)
    }
}

/// All filtered accesses of one system plus their union.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilteredAccessSet {
    combined_access: Access,
    filtered_accesses: Vec<FilteredAccess>,
}

impl FilteredAccessSet {
    /// Union of every access in the set, ignoring filters.
    #[inline]
    pub fn combined_access(&self) -> &Access {
        &self.combined_access
    }

    /// Individual filtered accesses.
    #[inline]
    pub fn filtered_accesses(&self) -> &[FilteredAccess] {
        &self.filtered_accesses
    }

    /// Returns `true` if the two sets can be held at the same time.
    pub fn is_compatible(&self, other: &FilteredAccessSet) -> bool {
        if self.combined_access.is_compatible(&other.combined_access) {
            return true;
        }
        self.filtered_accesses.iter().all(|filtered| {
            other.filtered_accesses.iter().all(|other_filtered| filtered.is_compatible(other_filtered))
        })
    }

    /// Conflicts between the two sets.
    pub fn get_conflicts(&self, other: &FilteredAccessSet) -> AccessConflicts {
        let mut conflicts = AccessConflicts::empty();
        if !self.combined_access.is_compatible(&other.combined_access) {
            for filtered in &self.filtered_accesses {
                for other_filtered in &other.filtered_accesses {
                    conflicts.add(&filtered.get_conflicts(other_filtered));
                }
            }
        }
        conflicts
    }

    /// Conflicts between this set and a single filtered access.
    pub fn get_conflicts_single(&self, filtered_access: &FilteredAccess) -> AccessConflicts {
        let mut conflicts = AccessConflicts::empty();
        if !self.combined_access.is_compatible(filtered_access.access()) {
            for filtered in &self.filtered_accesses {
                conflicts.add(&filtered.get_conflicts(filtered_access));
            }
        }
        conflicts
    }

    /// Adds a filtered access.
    pub fn add(&mut self, filtered_access: FilteredAccess) {
        self.combined_access.extend(&filtered_access.access);
        self.filtered_accesses.push(filtered_access);
    }

    /// Adds an unfiltered read of `id`, such as a resource read.
    pub fn add_unfiltered_read(&mut self, id: ComponentId) {
        let mut filter = FilteredAccess::default();
        filter.add_read(id);
        self.add(filter);
    }

    /// Adds an unfiltered write of `id`, such as a resource write.
    pub fn add_unfiltered_write(&mut self, id: ComponentId) {
        let mut filter = FilteredAccess::default();
        filter.add_write(id);
        self.add(filter);
    }

    /// Adds every access of `other`.
    pub fn extend(&mut self, other: FilteredAccessSet) {
        self.combined_access.extend(&other.combined_access);
        self.filtered_accesses.extend(other.filtered_accesses);
    }

    /// Grants read access to everything.
    pub fn read_all(&mut self) {
        let mut filter = FilteredAccess::matches_everything();
        filter.read_all();
        self.add(filter);
    }

    /// Grants write access to everything.
    pub fn write_all(&mut self) {
        let mut filter = FilteredAccess::matches_everything();
        filter.write_all();
        self.add(filter);
    }

    /// Removes every access.
    pub fn clear(&mut self) {
        self.combined_access.clear();
        self.filtered_accesses.clear();
    }
}
