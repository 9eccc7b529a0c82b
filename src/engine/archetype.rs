//! # Archetypes
//!
//! An archetype groups every entity that has exactly the same set of
//! components, table-stored and sparse-set alike.
//!
//! ## Purpose
//! Archetypes are the unit of query matching. A query decides once per
//! archetype whether it applies, then iterates the archetype's entities
//! without per-entity signature checks.
//!
//! ## Design
//! - Archetype identity is the pair (sorted table components, sorted
//!   sparse-set components). The table components select the backing
//!   [`Table`](crate::engine::table::Table); archetypes that differ only in
//!   sparse-set components share one table.
//! - [`ArchetypeId::EMPTY`] is created with the arena and holds entities with
//!   no components, including freshly flushed reserved entities.
//! - Each archetype caches insert and remove edges per [`BundleId`], so
//!   repeated migrations with the same bundle skip set arithmetic.
//! - Archetypes are never destroyed. [`ArchetypeGeneration`] lets queries
//!   match only archetypes created since they last looked.
//!
//! ## Invariants
//! - `entities[row].table_row` is the entity's row in the archetype's table.
//! - After a swap-remove, the entity moved into the vacated row must have
//!   its location updated by the caller.
//! - An archetype's signature is the union of its table and sparse-set
//!   component ids.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use crate::engine::entity::Entity;
use crate::engine::types::{
    ArchetypeGeneration, ArchetypeId, ArchetypeRow, BundleId, ComponentId, Signature, TableId,
    TableRow,
};


/// Whether a bundle component is new to the target archetype or overwrites an existing value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentStatus {
    /// The entity did not have the component before.
    Added,
    /// The entity already had the component; the value is replaced.
    Mutated,
}

/// Cached result of inserting a bundle into an archetype.
#[derive(Clone, Debug)]
pub struct AddBundle {
    /// Archetype the entity lands in.
    pub archetype_id: ArchetypeId,
    /// Status of each bundle component, in bundle order.
    pub bundle_status: Vec<ComponentStatus>,
}

/// Cached archetype transitions keyed by bundle.
#[derive(Default, Debug)]
pub struct Edges {
    insert_bundle: HashMap<BundleId, AddBundle>,
    remove_bundle: HashMap<BundleId, ArchetypeId>,
}

impl Edges {
    /// Cached insert edge for `bundle_id`.
    #[inline]
    pub fn get_add_bundle(&self, bundle_id: BundleId) -> Option<&AddBundle> {
        self.insert_bundle.get(&bundle_id)
    }

    #[inline]
    pub(crate) fn insert_add_bundle(&mut self, bundle_id: BundleId, add_bundle: AddBundle) {
        self.insert_bundle.insert(bundle_id, add_bundle);
    }

    /// Cached remove edge for `bundle_id`.
    #[inline]
    pub fn get_remove_bundle(&self, bundle_id: BundleId) -> Option<ArchetypeId> {
        self.remove_bundle.get(&bundle_id).copied()
    }

    #[inline]
    pub(crate) fn insert_remove_bundle(&mut self, bundle_id: BundleId, archetype_id: ArchetypeId) {
        self.remove_bundle.insert(bundle_id, archetype_id);
    }
}

/// One entity of an archetype with its table row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchetypeEntity {
    entity: Entity,
    table_row: TableRow,
}

impl ArchetypeEntity {
    /// Entity handle.
    #[inline]
    pub fn id(&self) -> Entity {
        self.entity
    }

    /// Row in the archetype's table.
    #[inline]
    pub fn table_row(&self) -> TableRow {
        self.table_row
    }
}

/// Outcome of removing an entity from an archetype.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ArchetypeSwapRemoveResult {
    /// Entity moved into the vacated archetype row, if any.
    pub(crate) swapped_entity: Option<Entity>,
    /// Table row of the removed entity.
    pub(crate) table_row: TableRow,
}

/// A unique set of components and the entities that have exactly that set.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    table_id: TableId,
    entities: Vec<ArchetypeEntity>,
    signature: Signature,
    table_components: Box<[ComponentId]>,
    sparse_set_components: Box<[ComponentId]>,
    edges: Edges,
}

impl Archetype {
    fn new(
        id: ArchetypeId,
        table_id: TableId,
        table_components: Box<[ComponentId]>,
        sparse_set_components: Box<[ComponentId]>,
    ) -> Self {
        let signature = table_components
            .iter()
            .chain(sparse_set_components.iter())
            .map(|id| id.index())
            .collect();
        Self {
            id,
            table_id,
            entities: Vec::new(),
            signature,
            table_components,
            sparse_set_components,
            edges: Edges::default(),
        }
    }

    /// Id of this archetype.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Backing table.
    #[inline]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Entities in archetype-row order.
    #[inline]
    pub fn entities(&self) -> &[ArchetypeEntity] {
        &self.entities
    }

    /// Number of entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity lives here.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Component set as a bitset.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Returns `true` if the archetype has `component_id`.
    #[inline]
    pub fn contains(&self, component_id: ComponentId) -> bool {
        self.signature.has(component_id.index())
    }

    /// Sorted table-stored components.
    #[inline]
    pub fn table_components(&self) -> &[ComponentId] {
        &self.table_components
    }

    /// Sorted sparse-set components.
    #[inline]
    pub fn sparse_set_components(&self) -> &[ComponentId] {
        &self.sparse_set_components
    }

    /// All components, table components first.
    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.table_components.iter().chain(self.sparse_set_components.iter()).copied()
    }

    /// Cached transitions.
    #[inline]
    pub fn edges(&self) -> &Edges {
        &self.edges
    }

    #[inline]
    pub(crate) fn edges_mut(&mut self) -> &mut Edges {
        &mut self.edges
    }

    pub(crate) fn allocate(&mut self, entity: Entity, table_row: TableRow) -> ArchetypeRow {
        let row = ArchetypeRow::new(self.entities.len());
        self.entities.push(ArchetypeEntity { entity, table_row });
        row
    }

    pub(crate) fn set_entity_table_row(&mut self, row: ArchetypeRow, table_row: TableRow) {
        self.entities[row.index()].table_row = table_row;
    }

    pub(crate) fn swap_remove(&mut self, row: ArchetypeRow) -> ArchetypeSwapRemoveResult {
        let removed = self.entities.swap_remove(row.index());
        ArchetypeSwapRemoveResult {
            swapped_entity: self.entities.get(row.index()).map(|moved| moved.entity),
            table_row: removed.table_row,
        }
    }
}

/// Arena of all archetypes in a world.
#[derive(Debug)]
pub struct Archetypes {
    archetypes: Vec<Archetype>,
    by_components: HashMap<(Box<[ComponentId]>, Box<[ComponentId]>), ArchetypeId>,
}

impl Default for Archetypes {
    fn default() -> Self {
        let mut archetypes = Archetypes { archetypes: Vec::new(), by_components: HashMap::new() };
        archetypes.get_id_or_insert(TableId::EMPTY, Vec::new(), Vec::new());
        archetypes
    }
}

impl Archetypes {
    /// Current generation: the number of archetypes created so far.
    #[inline]
    pub fn generation(&self) -> ArchetypeGeneration {
        ArchetypeGeneration(self.archetypes.len())
    }

    /// Number of archetypes, including the empty archetype.
    #[inline]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Always `false`: the empty archetype exists from the start.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// The archetype with no components.
    #[inline]
    pub fn empty(&self) -> &Archetype {
        &self.archetypes[ArchetypeId::EMPTY.index()]
    }

    /// Archetype `id`.
    #[inline]
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.index())
    }

    /// Iterates over all archetypes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Archetypes created at or after `generation`.
    pub fn since(&self, generation: ArchetypeGeneration) -> &[Archetype] {
        &self.archetypes[generation.0.min(self.archetypes.len())..]
    }

    /// Id of the archetype with exactly these components, creating it if needed.
    ///
    /// Both component lists must be sorted.
    pub(crate) fn get_id_or_insert(
        &mut self,
        table_id: TableId,
        table_components: Vec<ComponentId>,
        sparse_set_components: Vec<ComponentId>,
    ) -> ArchetypeId {
        let key = (table_components.into_boxed_slice(), sparse_set_components.into_boxed_slice());
        if let Some(&id) = self.by_components.get(&key) {
            return id;
        }
        let id = ArchetypeId::new(self.archetypes.len());
        tracing::trace!(
            archetype = id.index(),
            table = table_id.index(),
            components = key.0.len() + key.1.len(),
            "created archetype"
        );
        self.archetypes.push(Archetype::new(id, table_id, key.0.clone(), key.1.clone()));
        self.by_components.insert(key, id);
        id
    }
}

impl Index<ArchetypeId> for Archetypes {
    type Output = Archetype;

    #[inline]
    fn index(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[id.index()]
    }
}

impl IndexMut<ArchetypeId> for Archetypes {
    #[inline]
    fn index_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        &mut self.archetypes[id.index()]
    }
}
