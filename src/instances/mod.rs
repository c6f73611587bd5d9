//! Many placements of a few shared things.
//!
//! [`Instances`] keeps a deduplicated list of [`InstanceReference`]s and, per instance, a handle
//! into that list plus a transform. Per-instance attributes live on the instance domain.

pub mod reference;

use std::sync::Arc;

use cgmath::{Matrix4, SquareMatrix};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    attributes::{AttrDomain, AttrType, AttributeFilter, AttributeMap, AttributeOwner},
    constants::ID_ATTRIBUTE,
    core::hash::hash_ids,
    geometry::GeometrySet,
    scene::{SceneData, SceneError},
};

pub use reference::{InstanceReference, ReferenceKind};
use reference::ReferenceIdentity;

/// How often a colliding instance id is re-rolled before giving up.
const MAX_ID_RETRIES: i32 = 100;

#[derive(Debug, Default)]
pub struct Instances {
    references: Vec<InstanceReference>,
    /// First handle for each reference identity.
    reference_index: FxHashMap<ReferenceIdentity, usize>,
    reference_handles: Vec<usize>,
    transforms: Vec<Matrix4<f32>>,
    attributes: AttributeMap,
    /// Computed on first use, cleared by mutations that change instance ids.
    almost_unique_ids: RwLock<Option<Arc<[i32]>>>,
}

impl Clone for Instances {
    fn clone(&self) -> Self {
        let mut instances = Self {
            references: self.references.clone(),
            reference_index: FxHashMap::default(),
            reference_handles: self.reference_handles.clone(),
            transforms: self.transforms.clone(),
            attributes: self.attributes.clone(),
            almost_unique_ids: RwLock::new(self.almost_unique_ids.read().clone()),
        };
        instances.rebuild_reference_index();
        instances
    }
}

impl Instances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capacity hint for `count` instances.
    pub fn reserve(&mut self, count: usize) {
        self.reference_handles.reserve(count);
        self.transforms.reserve(count);
    }

    /// Set the number of instances. New instances use handle 0 and the identity transform,
    /// and should be filled in by the caller.
    pub fn resize(&mut self, count: usize) {
        self.reference_handles.resize(count, 0);
        self.transforms.resize(count, Matrix4::identity());
        self.attributes.resize_domain(AttrDomain::Instance, count);
        self.invalidate_almost_unique_ids();
    }

    /// Get the handle of a reference, adding it if there's no equal one yet.
    pub fn add_reference(&mut self, reference: InstanceReference) -> usize {
        if let Some(&handle) = self.reference_index.get(&reference.identity()) {
            return handle;
        }
        self.add_new_reference(reference)
    }

    /// Append a reference without looking for an equal one.
    pub fn add_new_reference(&mut self, reference: InstanceReference) -> usize {
        let handle = self.references.len();
        self.reference_index.entry(reference.identity()).or_insert(handle);
        self.references.push(reference);
        handle
    }

    /// Append one instance of an existing reference.
    pub fn add_instance(&mut self, handle: usize, transform: Matrix4<f32>) {
        debug_assert!(
            handle < self.references.len(),
            "instance handle {handle} out of range ({} references)",
            self.references.len()
        );
        self.reference_handles.push(handle);
        self.transforms.push(transform);
        self.attributes
            .resize_domain(AttrDomain::Instance, self.reference_handles.len());
        self.invalidate_almost_unique_ids();
    }

    pub fn references(&self) -> &[InstanceReference] {
        &self.references
    }

    pub fn reference_handles(&self) -> &[usize] {
        &self.reference_handles
    }

    /// Handles must stay below `references_num()`.
    pub fn reference_handles_for_write(&mut self) -> &mut [usize] {
        &mut self.reference_handles
    }

    pub fn transforms(&self) -> &[Matrix4<f32>] {
        &self.transforms
    }

    pub fn transforms_for_write(&mut self) -> &mut [Matrix4<f32>] {
        &mut self.transforms
    }

    pub fn instances_num(&self) -> usize {
        self.reference_handles.len()
    }

    pub fn references_num(&self) -> usize {
        self.references.len()
    }

    /// Drop references no instance uses, keeping the order of the rest.
    pub fn remove_unused_references(&mut self) {
        if self.reference_handles.is_empty() {
            self.references.clear();
            self.reference_index.clear();
            return;
        }

        let mut used = vec![false; self.references.len()];
        for &handle in &self.reference_handles {
            used[handle] = true;
        }
        if used.iter().all(|&used| used) {
            return;
        }

        let mut new_handles = vec![0; self.references.len()];
        let mut next = 0;
        for (old, &used) in used.iter().enumerate() {
            if used {
                new_handles[old] = next;
                next += 1;
            }
        }

        let mut old_handle = 0;
        self.references.retain(|_| {
            let keep = used[old_handle];
            old_handle += 1;
            keep
        });
        for handle in &mut self.reference_handles {
            *handle = new_handles[*handle];
        }
        self.rebuild_reference_index();
    }

    /// Keep only the instances at `selection` (sorted, unique indices).
    ///
    /// Anonymous attributes the filter allows to skip are dropped on the way.
    pub fn remove(&mut self, selection: &[usize], filter: &AttributeFilter) {
        debug_assert!(selection.windows(2).all(|pair| pair[0] < pair[1]));
        if selection.len() == self.instances_num() {
            return;
        }

        self.reference_handles = selection.iter().map(|&i| self.reference_handles[i]).collect();
        self.transforms = selection.iter().map(|&i| self.transforms[i]).collect();
        self.attributes
            .retain(|attribute| !filter.allow_skip(attribute.name()));
        self.attributes.gather_domain(AttrDomain::Instance, selection);
        self.invalidate_almost_unique_ids();

        self.remove_unused_references();
    }

    /// Replace object and collection references with the geometry they stand for, taken from
    /// the scene. Nested instances in that geometry are converted too.
    pub fn ensure_geometry_instances(&mut self, scene: &SceneData) -> Result<(), SceneError> {
        let mut changed = false;
        let result = self.convert_scene_references(scene, &mut changed);
        // References converted before a failure stay converted, so the index has to follow.
        if changed {
            self.rebuild_reference_index();
        }
        result
    }

    fn convert_scene_references(&mut self, scene: &SceneData, changed: &mut bool) -> Result<(), SceneError> {
        for reference in &mut self.references {
            let mut geometry = match reference {
                InstanceReference::None | InstanceReference::GeometrySet(_) => continue,
                InstanceReference::Object(id) => scene.object_geometry(*id)?,
                InstanceReference::Collection(id) => {
                    GeometrySet::from_instances(scene.collection_instances(*id)?)
                }
            };
            if geometry.has_instances() {
                if let Some(instances) = geometry.get_instances_for_write() {
                    instances.ensure_geometry_instances(scene)?;
                }
            }
            *reference = InstanceReference::from(geometry);
            *changed = true;
        }
        Ok(())
    }

    /// The geometry owned by a reference.
    ///
    /// # Panics
    /// If the reference isn't a geometry reference, see [`Self::ensure_geometry_instances`].
    pub fn geometry_set_from_reference(&mut self, handle: usize) -> &mut GeometrySet {
        self.references[handle].geometry_set_mut()
    }

    /// One id per instance, from the `id` attribute if there is one, otherwise the index.
    ///
    /// Repeated ids are replaced by hashed ones where possible, so the result is usually but
    /// not always unique.
    pub fn almost_unique_ids(&self) -> Arc<[i32]> {
        {
            let cached = self.almost_unique_ids.read();
            if let Some(ids) = cached.as_ref() {
                return Arc::clone(ids);
            }
        }

        let cached = self.almost_unique_ids.upgradable_read();
        if let Some(ids) = cached.as_ref() {
            return Arc::clone(ids);
        }
        let ids: Arc<[i32]> = self.compute_almost_unique_ids().into();
        let mut cached = RwLockUpgradableReadGuard::upgrade(cached);
        *cached = Some(Arc::clone(&ids));
        ids
    }

    fn compute_almost_unique_ids(&self) -> Vec<i32> {
        let stored = self
            .attributes
            .lookup(ID_ATTRIBUTE)
            .filter(|attribute| attribute.domain() == AttrDomain::Instance)
            .map(|attribute| attribute.values().convert(AttrType::Int32));
        let Some(stored) = stored.as_ref().and_then(|values| values.typed::<i32>()) else {
            return (0..self.instances_num() as i32).collect();
        };

        // Every original id is reserved first, so only true repeats get re-rolled.
        let mut ids = stored.to_vec();
        let mut used = FxHashSet::default();
        used.reserve(ids.len());
        let repeated: Vec<usize> = ids
            .iter()
            .enumerate()
            .filter(|&(_, &id)| !used.insert(id))
            .map(|(index, _)| index)
            .collect();

        for index in repeated {
            let original = ids[index];
            if let Some(candidate) = (0..MAX_ID_RETRIES)
                .map(|iteration| hash_ids(original, iteration))
                .find(|&candidate| used.insert(candidate))
            {
                ids[index] = candidate;
            }
        }
        ids
    }

    /// Number of instances using each reference.
    pub fn reference_user_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.references.len()];
        for &handle in &self.reference_handles {
            counts[handle] += 1;
        }
        counts
    }

    /// Visit the geometry of every geometry reference.
    pub fn foreach_referenced_geometry(&self, mut callback: impl FnMut(&GeometrySet)) {
        for reference in &self.references {
            if let InstanceReference::GeometrySet(geometry) = reference {
                callback(geometry);
            }
        }
    }

    /// `true` if no referenced geometry shares data with another owner.
    pub fn owns_direct_data(&self) -> bool {
        self.references.iter().all(InstanceReference::owns_direct_data)
    }

    pub fn ensure_owns_direct_data(&mut self) {
        for reference in &mut self.references {
            reference.ensure_owns_direct_data();
        }
    }

    fn rebuild_reference_index(&mut self) {
        self.reference_index.clear();
        for (handle, reference) in self.references.iter().enumerate() {
            self.reference_index.entry(reference.identity()).or_insert(handle);
        }
    }

    fn invalidate_almost_unique_ids(&mut self) {
        *self.almost_unique_ids.get_mut() = None;
    }
}

impl AttributeOwner for Instances {
    fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    fn attributes_for_write(&mut self) -> &mut AttributeMap {
        self.invalidate_almost_unique_ids();
        &mut self.attributes
    }

    fn attribute_domain_size(&self, domain: AttrDomain) -> usize {
        match domain {
            AttrDomain::Instance => self.instances_num(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geometry::PointCloud,
        scene::{Collection, Object},
    };
    use cgmath::Vector3;

    fn translation(x: f32) -> Matrix4<f32> {
        Matrix4::from_translation(Vector3::new(x, 0.0, 0.0))
    }

    fn scene_with_objects(count: usize) -> (SceneData, Vec<crate::scene::ObjectId>) {
        let mut scene = SceneData::new();
        let ids = (0..count)
            .map(|i| {
                scene.add_object(Object::new(
                    format!("object {i}"),
                    translation(i as f32),
                    GeometrySet::from_pointcloud(PointCloud::new(i + 1)),
                ))
            })
            .collect();
        (scene, ids)
    }

    fn assert_consistent(instances: &Instances) {
        assert_eq!(instances.reference_handles().len(), instances.transforms().len());
        assert!(
            instances
                .reference_handles()
                .iter()
                .all(|&handle| handle < instances.references_num())
        );
        for attribute in instances.attributes().iter() {
            assert_eq!(attribute.values().len(), instances.instances_num());
        }
    }

    #[test]
    fn adding_the_same_reference_twice_reuses_the_handle() {
        let (_, objects) = scene_with_objects(1);
        let mut instances = Instances::new();

        let handle = instances.add_reference(InstanceReference::Object(objects[0]));
        instances.add_instance(handle, Matrix4::identity());
        let second = instances.add_reference(InstanceReference::Object(objects[0]));

        assert_eq!(handle, second);
        assert_eq!(instances.references_num(), 1);
    }

    #[test]
    fn references_are_deduplicated_by_identity() {
        let (_, objects) = scene_with_objects(3);
        let geometry = InstanceReference::from(GeometrySet::from_pointcloud(PointCloud::new(2)));
        let geometry_copy = geometry.clone();
        let mut instances = Instances::new();

        let sequence = [
            InstanceReference::Object(objects[2]),
            InstanceReference::Object(objects[0]),
            InstanceReference::Object(objects[2]),
            InstanceReference::None,
            InstanceReference::Object(objects[0]),
            InstanceReference::None,
        ];
        for reference in sequence {
            instances.add_reference(reference);
        }
        let geometry_handle = instances.add_reference(geometry);
        let copy_handle = instances.add_reference(geometry_copy);

        assert_eq!(instances.references_num(), 5);
        assert_ne!(geometry_handle, copy_handle);
        assert_eq!(instances.references()[0], InstanceReference::Object(objects[2]));
        assert_eq!(instances.references()[1], InstanceReference::Object(objects[0]));
    }

    #[test]
    fn add_new_reference_allows_duplicates() {
        let (_, objects) = scene_with_objects(1);
        let mut instances = Instances::new();
        let first = instances.add_new_reference(InstanceReference::Object(objects[0]));
        let second = instances.add_new_reference(InstanceReference::Object(objects[0]));

        assert_ne!(first, second);
        assert_eq!(instances.add_reference(InstanceReference::Object(objects[0])), first);
    }

    #[test]
    fn mutations_keep_arrays_in_sync() {
        let (_, objects) = scene_with_objects(3);
        let mut instances = Instances::new();
        instances
            .attributes_for_write()
            .add("scale", AttrDomain::Instance, Vec::<f32>::new());
        assert_consistent(&instances);

        for (i, &object) in objects.iter().enumerate() {
            let handle = instances.add_reference(InstanceReference::Object(object));
            instances.add_instance(handle, translation(i as f32));
            assert_consistent(&instances);
        }
        instances.resize(6);
        assert_consistent(&instances);
        instances.remove(&[1, 2, 4], &AttributeFilter::default());
        assert_consistent(&instances);
        instances.resize(1);
        assert_consistent(&instances);
        instances.remove_unused_references();
        assert_consistent(&instances);
        assert_eq!(instances.references_num(), 1);
    }

    #[test]
    fn remove_unused_references_compacts_stably() {
        let (_, objects) = scene_with_objects(4);
        let mut instances = Instances::new();
        for &object in &objects {
            instances.add_reference(InstanceReference::Object(object));
        }
        instances.add_instance(3, Matrix4::identity());
        instances.add_instance(1, Matrix4::identity());
        instances.add_instance(3, Matrix4::identity());

        instances.remove_unused_references();
        assert_eq!(instances.references_num(), 2);
        assert_eq!(instances.reference_handles(), &[1, 0, 1]);
        assert_eq!(instances.references()[0], InstanceReference::Object(objects[1]));

        let references: Vec<_> = instances.references().iter().map(InstanceReference::identity).collect();
        let handles = instances.reference_handles().to_vec();
        instances.remove_unused_references();
        let again: Vec<_> = instances.references().iter().map(InstanceReference::identity).collect();
        assert_eq!(references, again);
        assert_eq!(handles, instances.reference_handles());

        // Removed references can be added again under a new handle.
        assert_eq!(instances.add_reference(InstanceReference::Object(objects[0])), 2);
    }

    #[test]
    fn remove_keeps_selected_rows_and_drops_skippable_attributes() {
        let (_, objects) = scene_with_objects(2);
        let mut instances = Instances::new();
        let a = instances.add_reference(InstanceReference::Object(objects[0]));
        let b = instances.add_reference(InstanceReference::Object(objects[1]));
        for (i, handle) in [a, b, a].into_iter().enumerate() {
            instances.add_instance(handle, translation(i as f32));
        }
        let attributes = instances.attributes_for_write();
        attributes.add("weight", AttrDomain::Instance, vec![1.0_f32, 2.0, 3.0]);
        attributes.add(".a_temp", AttrDomain::Instance, vec![1_i32, 2, 3]);

        instances.remove(&[1, 2], &AttributeFilter::propagate_only(Vec::<String>::new()));

        assert_eq!(instances.instances_num(), 2);
        assert_eq!(instances.reference_handles(), &[1, 0]);
        assert_eq!(instances.transforms()[0], translation(1.0));
        assert_eq!(
            instances.attributes().lookup_typed::<f32>("weight"),
            Some(&[2.0, 3.0][..])
        );
        assert!(!instances.attributes().contains(".a_temp"));
    }

    #[test]
    fn remove_selecting_everything_changes_nothing() {
        let (_, objects) = scene_with_objects(2);
        let mut instances = Instances::new();
        instances.add_reference(InstanceReference::Object(objects[0]));
        instances.add_reference(InstanceReference::Object(objects[1]));
        instances.add_instance(1, Matrix4::identity());
        instances
            .attributes_for_write()
            .add(".a_temp", AttrDomain::Instance, vec![1_i32]);

        instances.remove(&[0], &AttributeFilter::propagate_only(Vec::<String>::new()));
        assert_eq!(instances.references_num(), 2);
        assert!(instances.attributes().contains(".a_temp"));
    }

    #[test]
    fn ensure_geometry_instances_converts_scene_references() {
        let (mut scene, objects) = scene_with_objects(2);
        let collection = scene.add_collection(Collection::new("both").with_objects(objects.clone()));
        let mut instances = Instances::new();
        let object_handle = instances.add_reference(InstanceReference::Object(objects[1]));
        let collection_handle = instances.add_reference(InstanceReference::Collection(collection));
        instances.add_reference(InstanceReference::None);
        instances.add_instance(object_handle, Matrix4::identity());
        instances.add_instance(collection_handle, Matrix4::identity());

        instances.ensure_geometry_instances(&scene).unwrap();
        let kinds: Vec<_> = instances.references().iter().map(InstanceReference::kind).collect();
        assert_eq!(
            kinds,
            [ReferenceKind::GeometrySet, ReferenceKind::GeometrySet, ReferenceKind::None]
        );
        assert_eq!(
            instances
                .geometry_set_from_reference(object_handle)
                .get_pointcloud()
                .unwrap()
                .points_num(),
            2
        );

        let nested = instances
            .geometry_set_from_reference(collection_handle)
            .get_instances()
            .unwrap();
        assert_eq!(nested.instances_num(), 2);
        assert!(
            nested
                .references()
                .iter()
                .all(|reference| reference.kind() == ReferenceKind::GeometrySet)
        );

        let before: Vec<_> = instances.references().iter().map(InstanceReference::identity).collect();
        instances.ensure_geometry_instances(&scene).unwrap();
        let after: Vec<_> = instances.references().iter().map(InstanceReference::identity).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn ensure_geometry_instances_reports_missing_objects() {
        let (mut scene, objects) = scene_with_objects(1);
        let mut instances = Instances::new();
        let handle = instances.add_reference(InstanceReference::Object(objects[0]));
        instances.add_instance(handle, Matrix4::identity());
        scene.remove_object(objects[0]);

        assert!(matches!(
            instances.ensure_geometry_instances(&scene),
            Err(SceneError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn failed_conversion_keeps_handles_pointing_at_equal_references() {
        let (mut scene, objects) = scene_with_objects(2);
        let mut instances = Instances::new();
        for &object in &objects {
            let handle = instances.add_reference(InstanceReference::Object(object));
            instances.add_instance(handle, Matrix4::identity());
        }
        scene.remove_object(objects[1]);

        assert!(instances.ensure_geometry_instances(&scene).is_err());
        assert_eq!(instances.references()[0].kind(), ReferenceKind::GeometrySet);

        let handle = instances.add_reference(InstanceReference::Object(objects[0]));
        assert!(instances.references()[handle] == InstanceReference::Object(objects[0]));
        let handle = instances.add_reference(InstanceReference::Object(objects[1]));
        assert_eq!(handle, 1);
        assert_consistent(&instances);
    }

    #[test]
    fn almost_unique_ids_fall_back_to_indices() {
        let mut instances = Instances::new();
        let handle = instances.add_reference(InstanceReference::None);
        for _ in 0..3 {
            instances.add_instance(handle, Matrix4::identity());
        }
        assert_eq!(&*instances.almost_unique_ids(), &[0, 1, 2]);
    }

    #[test]
    fn almost_unique_ids_resolve_collisions_and_follow_mutation() {
        let mut instances = Instances::new();
        let handle = instances.add_reference(InstanceReference::None);
        for _ in 0..3 {
            instances.add_instance(handle, Matrix4::identity());
        }
        instances
            .attributes_for_write()
            .add(ID_ATTRIBUTE, AttrDomain::Instance, vec![7_i32, 7, 9]);

        let ids = instances.almost_unique_ids();
        assert_eq!(ids[0], 7);
        assert_ne!(ids[1], 7);
        assert_eq!(ids[2], 9);
        assert!(Arc::ptr_eq(&ids, &instances.almost_unique_ids()));

        instances.add_instance(handle, Matrix4::identity());
        assert_eq!(instances.almost_unique_ids().len(), 4);
    }

    #[test]
    fn rerolled_ids_never_take_a_unique_original() {
        let mut instances = Instances::new();
        let handle = instances.add_reference(InstanceReference::None);
        for _ in 0..3 {
            instances.add_instance(handle, Matrix4::identity());
        }
        let taken = hash_ids(7, 0);
        instances
            .attributes_for_write()
            .add(ID_ATTRIBUTE, AttrDomain::Instance, vec![7_i32, 7, taken]);

        let ids = instances.almost_unique_ids();
        assert_eq!(ids[0], 7);
        assert_eq!(ids[2], taken);
        assert!(ids[1] != 7 && ids[1] != taken);
    }

    #[test]
    fn almost_unique_ids_from_many_threads_agree() {
        let mut instances = Instances::new();
        let handle = instances.add_reference(InstanceReference::None);
        for _ in 0..64 {
            instances.add_instance(handle, Matrix4::identity());
        }
        let results: Vec<Arc<[i32]>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| instances.almost_unique_ids()))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });
        assert!(results.iter().all(|ids| Arc::ptr_eq(ids, &results[0])));
    }

    #[test]
    fn user_counts_and_referenced_geometry() {
        let mut instances = Instances::new();
        let a = instances.add_reference(GeometrySet::from_pointcloud(PointCloud::new(1)).into());
        let b = instances.add_reference(InstanceReference::None);
        instances.add_instance(a, Matrix4::identity());
        instances.add_instance(a, Matrix4::identity());
        instances.add_instance(b, Matrix4::identity());

        assert_eq!(instances.reference_user_counts(), vec![2, 1]);
        let mut visited = 0;
        instances.foreach_referenced_geometry(|_| visited += 1);
        assert_eq!(visited, 1);
    }

    #[test]
    fn clones_own_separate_geometry() {
        let mut instances = Instances::new();
        let handle = instances.add_reference(GeometrySet::from_pointcloud(PointCloud::new(1)).into());
        instances.add_instance(handle, Matrix4::identity());

        let mut copy = instances.clone();
        assert!(!copy.owns_direct_data());
        copy.ensure_owns_direct_data();
        assert!(copy.owns_direct_data());
        assert_ne!(copy.references()[0], instances.references()[0]);
        assert_eq!(copy.add_reference(copy.references()[0].clone()), 1);
    }
}
