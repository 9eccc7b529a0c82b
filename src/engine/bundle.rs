//! # Bundles
//!
//! A [`Bundle`] is a static set of components inserted or removed together.
//! Every [`Component`] is a bundle of one, and tuples of bundles are bundles.
//!
//! ## Design
//! - Component values cross into storage as `Box<dyn Any + Send>` together
//!   with their [`StorageType`], in the same order as
//!   [`Bundle::component_ids`] reports ids.
//! - [`Bundles`] interns each bundle type once per world and records its
//!   component ids, which archetype edges use as cache keys.
//!
//! ## Invariants
//! - A bundle never names the same component twice. Registering such a bundle
//!   panics with the offending component names.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use crate::engine::component::{Component, Components, StorageType};
use crate::engine::types::{BundleId, ComponentId};


/// A static set of components.
///
/// ```ignore
/// world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { x: 1.0, y: 0.0 }));
/// world.remove::<(Velocity, Stunned)>(entity);
/// ```
pub trait Bundle: Send + Sync + 'static {
    /// Reports the component ids of this bundle, registering them if needed.
    fn component_ids(components: &mut Components, ids: &mut impl FnMut(ComponentId));

    /// Hands out every component value in [`Bundle::component_ids`] order.
    fn get_components(self, func: &mut impl FnMut(StorageType, Box<dyn Any + Send>));
}

impl<C: Component> Bundle for C {
    fn component_ids(components: &mut Components, ids: &mut impl FnMut(ComponentId)) {
        ids(components.init_component::<C>());
    }

    #[inline]
    fn get_components(self, func: &mut impl FnMut(StorageType, Box<dyn Any + Send>)) {
        func(C::STORAGE_TYPE, Box::new(self));
    }
}

macro_rules! tuple_bundle {
    ($($name:ident),*) => {
        impl<$($name: Bundle),*> Bundle for ($($name,)*) {
            #[allow(unused_variables)]
            fn component_ids(components: &mut Components, ids: &mut impl FnMut(ComponentId)) {
                $(<$name as Bundle>::component_ids(components, ids);)*
            }

            #[allow(unused_variables, non_snake_case)]
            fn get_components(self, func: &mut impl FnMut(StorageType, Box<dyn Any + Send>)) {
                let ($($name,)*) = self;
                $($name.get_components(func);)*
            }
        }
    };
}

tuple_bundle!();
tuple_bundle!(B0);
tuple_bundle!(B0, B1);
tuple_bundle!(B0, B1, B2);
tuple_bundle!(B0, B1, B2, B3);
tuple_bundle!(B0, B1, B2, B3, B4);
tuple_bundle!(B0, B1, B2, B3, B4, B5);
tuple_bundle!(B0, B1, B2, B3, B4, B5, B6);
tuple_bundle!(B0, B1, B2, B3, B4, B5, B6, B7);
tuple_bundle!(B0, B1, B2, B3, B4, B5, B6, B7, B8);
tuple_bundle!(B0, B1, B2, B3, B4, B5, B6, B7, B8, B9);
tuple_bundle!(B0, B1, B2, B3, B4, B5, B6, B7, B8, B9, B10);
tuple_bundle!(B0, B1, B2, B3, B4, B5, B6, B7, B8, B9, B10, B11);

/// Registered metadata of one bundle type.
#[derive(Clone, Debug)]
pub struct BundleInfo {
    id: BundleId,
    component_ids: Vec<ComponentId>,
}

impl BundleInfo {
    /// Id of the bundle.
    #[inline]
    pub fn id(&self) -> BundleId {
        self.id
    }

    /// Component ids in value order.
    #[inline]
    pub fn components(&self) -> &[ComponentId] {
        &self.component_ids
    }
}

/// Per-world bundle registry.
#[derive(Debug, Default)]
pub struct Bundles {
    bundle_infos: Vec<BundleInfo>,
    bundle_ids: HashMap<TypeId, BundleId>,
}

impl Bundles {
    /// Registers bundle `B`, returning its id.
    ///
    /// ## Panics
    /// Panics if `B` contains the same component more than once.
    pub fn init_info<B: Bundle>(&mut self, components: &mut Components) -> BundleId {
        if let Some(&id) = self.bundle_ids.get(&TypeId::of::<B>()) {
            return id;
        }
        let mut component_ids = Vec::new();
        B::component_ids(components, &mut |id| component_ids.push(id));

        let mut sorted = component_ids.clone();
        sorted.sort_unstable();
        let duplicates: Vec<String> = sorted
            .windows(2)
            .filter(|pair| pair[0] == pair[1])
            .map(|pair| components.get_name(pair[0]).into_owned())
            .collect();
        if !duplicates.is_empty() {
            panic!(
                "bundle `{}` has duplicate components: {}",
                type_name::<B>(),
                duplicates.join(", ")
            );
        }

        let id = BundleId::new(self.bundle_infos.len());
        self.bundle_infos.push(BundleInfo { id, component_ids });
        self.bundle_ids.insert(TypeId::of::<B>(), id);
        id
    }

    /// Metadata of bundle `id`.
    #[inline]
    pub fn get(&self, id: BundleId) -> Option<&BundleInfo> {
        self.bundle_infos.get(id.index())
    }

    #[inline]
    pub(crate) fn info(&self, id: BundleId) -> &BundleInfo {
        &self.bundle_infos[id.index()]
    }

    /// Id of bundle type `B`, if registered.
    #[inline]
    pub fn get_id<B: Bundle>(&self) -> Option<BundleId> {
        self.bundle_ids.get(&TypeId::of::<B>()).copied()
    }

    /// Number of registered bundles.
    pub fn len(&self) -> usize {
        self.bundle_infos.len()
    }

    /// Returns `true` if no bundle is registered.
    pub fn is_empty(&self) -> bool {
        self.bundle_infos.is_empty()
    }
}
