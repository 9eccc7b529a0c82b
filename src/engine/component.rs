//! # Component Registry
//!
//! This module assigns stable [`ComponentId`] values to component and resource
//! types and records how each component is stored.
//!
//! ## Purpose
//! The registry decouples type information (`TypeId`, name, storage kind)
//! from runtime storage. Tables and sparse sets hold type-erased columns built
//! from the factory function recorded at registration.
//!
//! ## Design
//! - The registry is owned by a single [`World`](crate::engine::world::World).
//!   Two worlds may assign different ids to the same type.
//! - Components and resources share one id space so that
//!   [`Access`](crate::engine::access::Access) can describe both.
//! - Each descriptor carries a factory producing an empty column for its type.
//!
//! ## Invariants
//! - Ids are dense, assigned in registration order and never reused.
//! - A type registered as a component keeps its [`StorageType`] forever.
//!   Re-registering it with a different storage type is rejected with
//!   [`RegistryError::DuplicateRegistration`].

use std::any::{type_name, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;

use crate::engine::error::RegistryError;
use crate::engine::storage::{new_typed_vec, ErasedVec};
use crate::engine::types::ComponentId;


/// Data attached to entities.
///
/// Implement by hand; the storage type defaults to [`StorageType::Table`]:
///
/// ```ignore
/// struct Position { x: f32, y: f32 }
/// impl Component for Position {}
///
/// struct Stunned;
/// impl Component for Stunned {
///     const STORAGE_TYPE: StorageType = StorageType::SparseSet;
/// }
/// ```
pub trait Component: Send + Sync + 'static {
    /// Where values of this component live.
    const STORAGE_TYPE: StorageType = StorageType::Table;
}

/// Singleton data stored on the world rather than on entities.
pub trait Resource: Send + Sync + 'static {}

/// Storage backend of a component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StorageType {
    /// Dense columns in archetype tables. Fast iteration, slower insert/remove.
    #[default]
    Table,
    /// Per-component sparse set keyed by entity index. Fast insert/remove.
    SparseSet,
}

/// Factory function for an empty type-erased column.
pub(crate) type ColumnFactory = fn() -> Box<dyn ErasedVec>;

/// Everything the registry needs to know about a type before assigning an id.
#[derive(Clone, Debug)]
pub struct ComponentDescriptor {
    name: Cow<'static, str>,
    storage_type: StorageType,
    type_id: Option<TypeId>,
    new_column: ColumnFactory,
}

impl ComponentDescriptor {
    /// Descriptor for a typed component using its declared storage.
    pub fn new<T: Component>() -> Self {
        Self::with_storage::<T>(T::STORAGE_TYPE)
    }

    /// Descriptor for a resource type.
    pub fn new_resource<T: Resource>() -> Self {
        Self::with_storage::<T>(StorageType::Table)
    }

    /// Descriptor for any thread-safe type with an explicit storage type.
    pub fn with_storage<T: Send + Sync + 'static>(storage_type: StorageType) -> Self {
        Self {
            name: Cow::Borrowed(type_name::<T>()),
            storage_type,
            type_id: Some(TypeId::of::<T>()),
            new_column: new_typed_vec::<T>,
        }
    }

    /// Type name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested storage type.
    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    /// Rust type id, if the descriptor names a Rust type.
    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }
}

/// Registered metadata for one [`ComponentId`].
#[derive(Clone, Debug)]
pub struct ComponentInfo {
    id: ComponentId,
    descriptor: ComponentDescriptor,
}

impl ComponentInfo {
    /// Id assigned by the registry.
    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Type name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Storage type.
    #[inline]
    pub fn storage_type(&self) -> StorageType {
        self.descriptor.storage_type
    }

    /// Rust type id.
    #[inline]
    pub fn type_id(&self) -> Option<TypeId> {
        self.descriptor.type_id
    }

    #[inline]
    pub(crate) fn new_column(&self) -> Box<dyn ErasedVec> {
        (self.descriptor.new_column)()
    }
}

/// Per-world component and resource registry.
#[derive(Debug, Default)]
pub struct Components {
    components: Vec<ComponentInfo>,
    indices: HashMap<TypeId, ComponentId>,
    resource_indices: HashMap<TypeId, ComponentId>,
}

impl Components {
    /// Registers `T` as a component, returning its id.
    ///
    /// ## Panics
    /// Panics if `T` was registered earlier with a different storage type.
    pub fn init_component<T: Component>(&mut self) -> ComponentId {
        self.try_init_component::<T>()
            .unwrap_or_else(|error| panic!("{error}"))
    }

    /// Registers `T` as a component, returning its id.
    pub fn try_init_component<T: Component>(&mut self) -> Result<ComponentId, RegistryError> {
        if let Some(&id) = self.indices.get(&TypeId::of::<T>()) {
            if self.components[id.index()].storage_type() == T::STORAGE_TYPE {
                return Ok(id);
            }
        }
        self.register_component_with_descriptor(ComponentDescriptor::new::<T>())
    }

    /// Registers a component from an explicit descriptor.
    ///
    /// Registering the same Rust type twice with the same storage type returns
    /// the existing id. Descriptors without a type id always get a fresh id.
    pub fn register_component_with_descriptor(
        &mut self,
        descriptor: ComponentDescriptor,
    ) -> Result<ComponentId, RegistryError> {
        if let Some(type_id) = descriptor.type_id {
            if let Some(&id) = self.indices.get(&type_id) {
                let existing = self.components[id.index()].storage_type();
                if existing != descriptor.storage_type {
                    return Err(RegistryError::DuplicateRegistration {
                        name: descriptor.name.clone(),
                        existing,
                        requested: descriptor.storage_type,
                    });
                }
                return Ok(id);
            }
        }

        let id = self.push_info(descriptor.clone());
        if let Some(type_id) = descriptor.type_id {
            self.indices.insert(type_id, id);
        }
        Ok(id)
    }

    /// Registers `T` as a resource, returning its id.
    pub fn init_resource<T: Resource>(&mut self) -> ComponentId {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.resource_indices.get(&type_id) {
            return id;
        }
        let id = self.push_info(ComponentDescriptor::new_resource::<T>());
        self.resource_indices.insert(type_id, id);
        id
    }

    fn push_info(&mut self, descriptor: ComponentDescriptor) -> ComponentId {
        let id = ComponentId::new(self.components.len());
        tracing::trace!(component = %descriptor.name, id = id.index(), "registered component");
        self.components.push(ComponentInfo { id, descriptor });
        id
    }

    /// Id of component type `T`, if registered.
    #[inline]
    pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
        self.get_id(TypeId::of::<T>())
    }

    /// Id of the component with the given type id, if registered.
    #[inline]
    pub fn get_id(&self, type_id: TypeId) -> Option<ComponentId> {
        self.indices.get(&type_id).copied()
    }

    /// Id of resource type `T`, if registered.
    #[inline]
    pub fn resource_id<T: Resource>(&self) -> Option<ComponentId> {
        self.resource_indices.get(&TypeId::of::<T>()).copied()
    }

    /// Metadata of `id`.
    #[inline]
    pub fn get_info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.components.get(id.index())
    }

    /// Type name of `id`, or `"<unknown>"`.
    pub fn get_name(&self, id: ComponentId) -> Cow<'_, str> {
        self.get_info(id)
            .map_or(Cow::Borrowed("<unknown>"), |info| Cow::Borrowed(info.name()))
    }

    /// Number of registered ids.
    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Iterates over all registered metadata.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> + '_ {
        self.components.iter()
    }
}
