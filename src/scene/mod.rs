use cgmath::{Matrix4, Vector3};
use rustc_hash::FxHashSet;
use slotmap::{SlotMap, new_key_type};
use thiserror::Error;

use crate::{
    geometry::GeometrySet,
    instances::{InstanceReference, Instances},
};

new_key_type! {
    /// Used to reference an `Object`.
    pub struct ObjectId;
    /// Used to reference a `Collection`.
    pub struct CollectionId;
}

/// A placed piece of geometry in the scene.
#[derive(Clone, Debug)]
pub struct Object {
    name: String,
    transform: Matrix4<f32>,
    geometry: GeometrySet,
}

impl Object {
    /// Create an object with its evaluated geometry.
    pub fn new(name: impl Into<String>, transform: Matrix4<f32>, geometry: GeometrySet) -> Self {
        Self {
            name: name.into(),
            transform,
            geometry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The object's world transform.
    pub fn transform(&self) -> &Matrix4<f32> {
        &self.transform
    }

    pub fn geometry(&self) -> &GeometrySet {
        &self.geometry
    }
}

/// A named group of objects and child collections.
#[derive(Clone, Debug)]
pub struct Collection {
    name: String,
    objects: Vec<ObjectId>,
    children: Vec<CollectionId>,
    instance_offset: Vector3<f32>,
}

impl Collection {
    /// Create an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
            children: Vec::new(),
            instance_offset: Vector3::new(0.0, 0.0, 0.0),
        }
    }

    pub fn with_objects(mut self, objects: impl IntoIterator<Item = ObjectId>) -> Self {
        self.objects.extend(objects);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = CollectionId>) -> Self {
        self.children.extend(children);
        self
    }

    /// The point of the collection that ends up at the instance origin.
    pub fn with_instance_offset(mut self, offset: Vector3<f32>) -> Self {
        self.instance_offset = offset;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    pub fn children(&self) -> &[CollectionId] {
        &self.children
    }

    pub fn instance_offset(&self) -> Vector3<f32> {
        self.instance_offset
    }
}

/// The objects and collections that instance references can point at.
#[derive(Clone, Debug, Default)]
pub struct SceneData {
    objects: SlotMap<ObjectId, Object>,
    collections: SlotMap<CollectionId, Collection>,
}

impl SceneData {
    /// Initialize empty scene data.
    pub fn new() -> Self {
        Self {
            objects: SlotMap::with_key(),
            collections: SlotMap::with_key(),
        }
    }

    /// Add an object, returning its ID.
    pub fn add_object(&mut self, object: Object) -> ObjectId {
        self.objects.insert(object)
    }

    /// Add a collection, returning its ID.
    pub fn add_collection(&mut self, collection: Collection) -> CollectionId {
        self.collections.insert(collection)
    }

    /// Get an object.
    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id)
    }

    /// Get a collection.
    pub fn collection(&self, id: CollectionId) -> Option<&Collection> {
        self.collections.get(id)
    }

    /// Remove an object. Collections keep their (now dangling) ID.
    pub fn remove_object(&mut self, id: ObjectId) -> Option<Object> {
        self.objects.remove(id)
    }

    /// Snapshot an object's evaluated geometry, in the object's local space.
    pub fn object_geometry(&self, id: ObjectId) -> Result<GeometrySet, SceneError> {
        self.object(id)
            .map(|object| object.geometry.clone())
            .ok_or(SceneError::ObjectNotFound(id))
    }

    /// Instance every object of a collection and its children.
    ///
    /// Each object appears once, even if several child collections contain it, placed at its
    /// world transform shifted by the collection's instance offset.
    pub fn collection_instances(&self, id: CollectionId) -> Result<Instances, SceneError> {
        let collection = self
            .collection(id)
            .ok_or(SceneError::CollectionNotFound(id))?;
        let offset = Matrix4::from_translation(-collection.instance_offset);

        let mut objects = Vec::new();
        let mut visited_collections = FxHashSet::default();
        let mut seen_objects = FxHashSet::default();
        self.gather_collection_objects(id, &mut visited_collections, &mut seen_objects, &mut objects)?;

        let mut instances = Instances::new();
        instances.reserve(objects.len());
        for object_id in objects {
            let object = self
                .object(object_id)
                .ok_or(SceneError::ObjectNotFound(object_id))?;
            let handle = instances.add_reference(InstanceReference::Object(object_id));
            instances.add_instance(handle, offset * object.transform);
        }
        Ok(instances)
    }

    fn gather_collection_objects(
        &self,
        id: CollectionId,
        visited_collections: &mut FxHashSet<CollectionId>,
        seen_objects: &mut FxHashSet<ObjectId>,
        objects: &mut Vec<ObjectId>,
    ) -> Result<(), SceneError> {
        if !visited_collections.insert(id) {
            return Ok(());
        }
        let collection = self
            .collection(id)
            .ok_or(SceneError::CollectionNotFound(id))?;
        for &object in &collection.objects {
            if seen_objects.insert(object) {
                objects.push(object);
            }
        }
        for &child in &collection.children {
            self.gather_collection_objects(child, visited_collections, seen_objects, objects)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Couldn't find object of ID {0:?}")]
    ObjectNotFound(ObjectId),
    #[error("Couldn't find collection of ID {0:?}")]
    CollectionNotFound(CollectionId),
}
