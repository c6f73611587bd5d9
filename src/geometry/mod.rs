//! Geometry bundles: a small set of independently owned components, at most one per type.
//!
//! Components are held in [`Arc`]s, so copying a [`GeometrySet`] only copies pointers. Mutable
//! access goes through `Arc::make_mut`, which copies a component the first time it is written
//! while still shared.

pub mod curves;
pub mod edit_data;
pub mod mesh;
pub mod pointcloud;
pub mod volume;

use std::sync::Arc;

use crate::attributes::{AttrDomain, AttributeOwner};
use crate::instances::Instances;

pub use curves::Curves;
pub use edit_data::GeometryEditData;
pub use mesh::Mesh;
pub use pointcloud::PointCloud;
pub use volume::{Volume, VolumeGrid};

/// The kinds of components a [`GeometrySet`] can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Mesh,
    PointCloud,
    Instances,
    Volume,
    Curve,
    Edit,
}

impl ComponentType {
    /// Every component type, in the order joins process them.
    pub const ALL: [ComponentType; 6] = [
        ComponentType::Mesh,
        ComponentType::PointCloud,
        ComponentType::Instances,
        ComponentType::Volume,
        ComponentType::Curve,
        ComponentType::Edit,
    ];

    fn index(self) -> usize {
        match self {
            ComponentType::Mesh => 0,
            ComponentType::PointCloud => 1,
            ComponentType::Instances => 2,
            ComponentType::Volume => 3,
            ComponentType::Curve => 4,
            ComponentType::Edit => 5,
        }
    }
}

/// One component of a geometry bundle.
#[derive(Clone, Debug)]
pub enum GeometryComponent {
    Mesh(Arc<Mesh>),
    PointCloud(Arc<PointCloud>),
    Instances(Arc<Instances>),
    Volume(Arc<Volume>),
    Curve(Arc<Curves>),
    Edit(Arc<GeometryEditData>),
}

impl GeometryComponent {
    pub fn component_type(&self) -> ComponentType {
        match self {
            GeometryComponent::Mesh(_) => ComponentType::Mesh,
            GeometryComponent::PointCloud(_) => ComponentType::PointCloud,
            GeometryComponent::Instances(_) => ComponentType::Instances,
            GeometryComponent::Volume(_) => ComponentType::Volume,
            GeometryComponent::Curve(_) => ComponentType::Curve,
            GeometryComponent::Edit(_) => ComponentType::Edit,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            GeometryComponent::Mesh(mesh) => mesh.is_empty(),
            GeometryComponent::PointCloud(points) => points.is_empty(),
            GeometryComponent::Instances(instances) => instances.instances_num() == 0,
            GeometryComponent::Volume(volume) => volume.is_empty(),
            GeometryComponent::Curve(curves) => curves.is_empty(),
            GeometryComponent::Edit(edit_data) => edit_data.is_empty(),
        }
    }

    /// The attribute interface, for the component types that store attributes.
    pub fn attribute_owner(&self) -> Option<&dyn AttributeOwner> {
        match self {
            GeometryComponent::Mesh(mesh) => Some(&**mesh as &dyn AttributeOwner),
            GeometryComponent::PointCloud(points) => Some(&**points as &dyn AttributeOwner),
            GeometryComponent::Instances(instances) => Some(&**instances as &dyn AttributeOwner),
            GeometryComponent::Curve(curves) => Some(&**curves as &dyn AttributeOwner),
            GeometryComponent::Volume(_) | GeometryComponent::Edit(_) => None,
        }
    }

    pub fn attribute_domain_size(&self, domain: AttrDomain) -> usize {
        self.attribute_owner()
            .map_or(0, |owner| owner.attribute_domain_size(domain))
    }

    /// Address of the shared payload. Two components with the same address hold the same data.
    pub(crate) fn data_address(&self) -> usize {
        match self {
            GeometryComponent::Mesh(data) => Arc::as_ptr(data) as usize,
            GeometryComponent::PointCloud(data) => Arc::as_ptr(data) as usize,
            GeometryComponent::Instances(data) => Arc::as_ptr(data) as usize,
            GeometryComponent::Volume(data) => Arc::as_ptr(data) as usize,
            GeometryComponent::Curve(data) => Arc::as_ptr(data) as usize,
            GeometryComponent::Edit(data) => Arc::as_ptr(data) as usize,
        }
    }

    fn is_shared(&self) -> bool {
        match self {
            GeometryComponent::Mesh(data) => Arc::strong_count(data) > 1,
            GeometryComponent::PointCloud(data) => Arc::strong_count(data) > 1,
            GeometryComponent::Instances(data) => Arc::strong_count(data) > 1,
            GeometryComponent::Volume(data) => Arc::strong_count(data) > 1,
            GeometryComponent::Curve(data) => Arc::strong_count(data) > 1,
            GeometryComponent::Edit(data) => Arc::strong_count(data) > 1,
        }
    }

    /// `true` if no part of this component (including nested instance references) is shared
    /// with another owner.
    pub fn owns_direct_data(&self) -> bool {
        if self.is_shared() {
            return false;
        }
        match self {
            GeometryComponent::Instances(instances) => instances.owns_direct_data(),
            _ => true,
        }
    }

    /// Copy whatever is shared so this component can be mutated without affecting anyone else.
    pub fn ensure_owns_direct_data(&mut self) {
        match self {
            GeometryComponent::Mesh(data) => {
                Arc::make_mut(data);
            }
            GeometryComponent::PointCloud(data) => {
                Arc::make_mut(data);
            }
            GeometryComponent::Instances(data) => Arc::make_mut(data).ensure_owns_direct_data(),
            GeometryComponent::Volume(data) => {
                Arc::make_mut(data);
            }
            GeometryComponent::Curve(data) => {
                Arc::make_mut(data);
            }
            GeometryComponent::Edit(data) => {
                Arc::make_mut(data);
            }
        }
    }
}

impl From<Mesh> for GeometryComponent {
    fn from(value: Mesh) -> Self {
        GeometryComponent::Mesh(Arc::new(value))
    }
}

impl From<PointCloud> for GeometryComponent {
    fn from(value: PointCloud) -> Self {
        GeometryComponent::PointCloud(Arc::new(value))
    }
}

impl From<Instances> for GeometryComponent {
    fn from(value: Instances) -> Self {
        GeometryComponent::Instances(Arc::new(value))
    }
}

impl From<Volume> for GeometryComponent {
    fn from(value: Volume) -> Self {
        GeometryComponent::Volume(Arc::new(value))
    }
}

impl From<Curves> for GeometryComponent {
    fn from(value: Curves) -> Self {
        GeometryComponent::Curve(Arc::new(value))
    }
}

impl From<GeometryEditData> for GeometryComponent {
    fn from(value: GeometryEditData) -> Self {
        GeometryComponent::Edit(Arc::new(value))
    }
}

/// Generates the typed getters of [`GeometrySet`] for one component type.
macro_rules! component_accessors {
    ($variant:ident, $ty:ty, $get:ident, $get_for_write:ident, $replace:ident, $from:ident) => {
        pub fn $get(&self) -> Option<&$ty> {
            match self.get_component(ComponentType::$variant) {
                Some(GeometryComponent::$variant(data)) => Some(data.as_ref()),
                _ => None,
            }
        }

        /// Mutable access, copying the data first if it's shared.
        pub fn $get_for_write(&mut self) -> Option<&mut $ty> {
            match self.components[ComponentType::$variant.index()].as_mut() {
                Some(GeometryComponent::$variant(data)) => Some(Arc::make_mut(data)),
                _ => None,
            }
        }

        pub fn $replace(&mut self, data: $ty) {
            self.add(GeometryComponent::$variant(Arc::new(data)));
        }

        pub fn $from(data: $ty) -> Self {
            let mut geometry = Self::new();
            geometry.$replace(data);
            geometry
        }
    };
}

/// A bundle of geometry components.
#[derive(Clone, Debug, Default)]
pub struct GeometrySet {
    components: [Option<GeometryComponent>; 6],
}

impl GeometrySet {
    pub fn new() -> Self {
        Self::default()
    }

    component_accessors!(Mesh, Mesh, get_mesh, get_mesh_for_write, replace_mesh, from_mesh);
    component_accessors!(
        PointCloud,
        PointCloud,
        get_pointcloud,
        get_pointcloud_for_write,
        replace_pointcloud,
        from_pointcloud
    );
    component_accessors!(
        Instances,
        Instances,
        get_instances,
        get_instances_for_write,
        replace_instances,
        from_instances
    );
    component_accessors!(Volume, Volume, get_volume, get_volume_for_write, replace_volume, from_volume);
    component_accessors!(Curve, Curves, get_curves, get_curves_for_write, replace_curves, from_curves);
    component_accessors!(
        Edit,
        GeometryEditData,
        get_edit_data,
        get_edit_data_for_write,
        replace_edit_data,
        from_edit_data
    );

    /// `true` if a component of this type is present (it may still be empty).
    pub fn has(&self, component_type: ComponentType) -> bool {
        self.components[component_type.index()].is_some()
    }

    pub fn has_instances(&self) -> bool {
        self.get_instances().is_some_and(|instances| instances.instances_num() > 0)
    }

    pub fn get_component(&self, component_type: ComponentType) -> Option<&GeometryComponent> {
        self.components[component_type.index()].as_ref()
    }

    /// Add a component, replacing the one of the same type if present.
    pub fn add(&mut self, component: GeometryComponent) {
        let index = component.component_type().index();
        self.components[index] = Some(component);
    }

    pub fn remove(&mut self, component_type: ComponentType) -> Option<GeometryComponent> {
        self.components[component_type.index()].take()
    }

    /// Present components, in [`ComponentType::ALL`] order.
    pub fn components(&self) -> impl Iterator<Item = &GeometryComponent> {
        self.components.iter().flatten()
    }

    pub fn count_components(&self) -> usize {
        self.components().count()
    }

    /// `true` if there is no non-empty component.
    pub fn is_empty(&self) -> bool {
        self.components().all(GeometryComponent::is_empty)
    }

    /// Number of elements in a domain of one component, zero if it's missing.
    pub fn attribute_domain_size(&self, component_type: ComponentType, domain: AttrDomain) -> usize {
        self.get_component(component_type)
            .map_or(0, |component| component.attribute_domain_size(domain))
    }

    /// Move every component except instances out into a new set.
    pub fn extract_real_geometry(&mut self) -> GeometrySet {
        let mut real = GeometrySet::new();
        for component_type in ComponentType::ALL {
            if component_type == ComponentType::Instances {
                continue;
            }
            if let Some(component) = self.remove(component_type) {
                real.add(component);
            }
        }
        real
    }

    /// `true` if nothing in this set is shared with another set.
    pub fn owns_direct_data(&self) -> bool {
        self.components().all(GeometryComponent::owns_direct_data)
    }

    /// Copy all shared data so that in-place edits can't leak into other sets.
    pub fn ensure_owns_direct_data(&mut self) {
        for component in self.components.iter_mut().flatten() {
            component.ensure_owns_direct_data();
        }
    }

    /// Addresses of the non-instance payloads, `None` if there are none.
    ///
    /// Two sets with the same key hold the very same real geometry.
    pub(crate) fn real_data_key(&self) -> Option<Vec<(ComponentType, usize)>> {
        let key: Vec<_> = self
            .components()
            .filter(|c| c.component_type() != ComponentType::Instances)
            .map(|c| (c.component_type(), c.data_address()))
            .collect();
        (!key.is_empty()).then_some(key)
    }
}
