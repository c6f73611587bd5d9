use crate::{
    geometry::GeometrySet,
    scene::{CollectionId, ObjectId},
};

/// What an instance places: nothing, a scene object, a scene collection, or its own geometry.
///
/// Equality and hashing go by identity: object and collection references compare their IDs,
/// geometry references compare the address of the owned bundle. Cloning a geometry reference
/// copies the bundle, so the clone is a different reference.
#[derive(Clone, Debug, Default)]
pub enum InstanceReference {
    #[default]
    None,
    Object(ObjectId),
    Collection(CollectionId),
    GeometrySet(Box<GeometrySet>),
}

/// The tag of an [`InstanceReference`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    None,
    Object,
    Collection,
    GeometrySet,
}

/// What equality of [`InstanceReference`]s is decided on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ReferenceIdentity {
    None,
    Object(ObjectId),
    Collection(CollectionId),
    GeometrySet(usize),
}

impl InstanceReference {
    pub fn kind(&self) -> ReferenceKind {
        match self {
            InstanceReference::None => ReferenceKind::None,
            InstanceReference::Object(_) => ReferenceKind::Object,
            InstanceReference::Collection(_) => ReferenceKind::Collection,
            InstanceReference::GeometrySet(_) => ReferenceKind::GeometrySet,
        }
    }

    pub(crate) fn identity(&self) -> ReferenceIdentity {
        match self {
            InstanceReference::None => ReferenceIdentity::None,
            InstanceReference::Object(id) => ReferenceIdentity::Object(*id),
            InstanceReference::Collection(id) => ReferenceIdentity::Collection(*id),
            InstanceReference::GeometrySet(geometry) => {
                ReferenceIdentity::GeometrySet(geometry.as_ref() as *const GeometrySet as usize)
            }
        }
    }

    /// The referenced object.
    ///
    /// # Panics
    /// If this isn't an object reference.
    pub fn object(&self) -> ObjectId {
        match self {
            InstanceReference::Object(id) => *id,
            other => panic!("expected an object reference, found {:?}", other.kind()),
        }
    }

    /// The referenced collection.
    ///
    /// # Panics
    /// If this isn't a collection reference.
    pub fn collection(&self) -> CollectionId {
        match self {
            InstanceReference::Collection(id) => *id,
            other => panic!("expected a collection reference, found {:?}", other.kind()),
        }
    }

    /// The owned geometry.
    ///
    /// # Panics
    /// If this isn't a geometry reference.
    pub fn geometry_set(&self) -> &GeometrySet {
        match self {
            InstanceReference::GeometrySet(geometry) => geometry,
            other => panic!("expected a geometry reference, found {:?}", other.kind()),
        }
    }

    /// Mutable access to the owned geometry.
    ///
    /// # Panics
    /// If this isn't a geometry reference.
    pub fn geometry_set_mut(&mut self) -> &mut GeometrySet {
        match self {
            InstanceReference::GeometrySet(geometry) => geometry,
            other => panic!("expected a geometry reference, found {:?}", other.kind()),
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            InstanceReference::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<CollectionId> {
        match self {
            InstanceReference::Collection(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_geometry_set(&self) -> Option<&GeometrySet> {
        match self {
            InstanceReference::GeometrySet(geometry) => Some(geometry),
            _ => None,
        }
    }

    /// Move the reference out, leaving `None` behind.
    pub fn take(&mut self) -> InstanceReference {
        std::mem::take(self)
    }

    /// `true` unless this is a geometry reference whose bundle shares data with another.
    pub fn owns_direct_data(&self) -> bool {
        match self {
            InstanceReference::GeometrySet(geometry) => geometry.owns_direct_data(),
            _ => true,
        }
    }

    /// Make sure a referenced bundle can be edited without touching data owned elsewhere.
    pub fn ensure_owns_direct_data(&mut self) {
        if let InstanceReference::GeometrySet(geometry) = self {
            geometry.ensure_owns_direct_data();
        }
    }
}

impl PartialEq for InstanceReference {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for InstanceReference {}

impl std::hash::Hash for InstanceReference {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl From<ObjectId> for InstanceReference {
    fn from(value: ObjectId) -> Self {
        InstanceReference::Object(value)
    }
}

impl From<CollectionId> for InstanceReference {
    fn from(value: CollectionId) -> Self {
        InstanceReference::Collection(value)
    }
}

impl From<GeometrySet> for InstanceReference {
    fn from(value: GeometrySet) -> Self {
        InstanceReference::GeometrySet(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geometry::PointCloud,
        scene::{Object, SceneData},
    };
    use cgmath::{Matrix4, SquareMatrix};

    #[test]
    fn object_references_compare_by_id() {
        let mut scene = SceneData::new();
        let a = scene.add_object(Object::new("a", Matrix4::identity(), GeometrySet::new()));
        let b = scene.add_object(Object::new("b", Matrix4::identity(), GeometrySet::new()));

        assert_eq!(InstanceReference::from(a), InstanceReference::from(a));
        assert_ne!(InstanceReference::from(a), InstanceReference::from(b));
        assert_eq!(InstanceReference::from(a).object(), a);
    }

    #[test]
    fn geometry_copies_are_distinct_references() {
        let reference = InstanceReference::from(GeometrySet::from_pointcloud(PointCloud::new(1)));
        let copy = reference.clone();

        assert_eq!(reference, reference);
        assert_ne!(reference, copy);
        assert_eq!(copy.geometry_set().get_pointcloud().unwrap().points_num(), 1);
    }

    #[test]
    fn take_leaves_none() {
        let mut reference = InstanceReference::from(GeometrySet::new());
        let before = reference.identity();
        let taken = reference.take();

        assert_eq!(reference.kind(), ReferenceKind::None);
        assert_eq!(taken.identity(), before);
    }

    #[test]
    #[should_panic]
    fn wrong_accessor_panics() {
        InstanceReference::None.geometry_set();
    }

    #[test]
    fn owned_geometry_is_unshared_after_ensure() {
        let geometry = GeometrySet::from_pointcloud(PointCloud::new(1));
        let mut reference = InstanceReference::from(geometry.clone());
        assert!(!reference.owns_direct_data());
        reference.ensure_owns_direct_data();
        assert!(reference.owns_direct_data());
    }
}
