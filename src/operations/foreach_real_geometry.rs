use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::{
    constants::FOREACH_GRAIN_SIZE,
    geometry::{ComponentType, GeometrySet},
    instances::ReferenceKind,
    operations::join_geometries::{JoinOptions, join_geometries},
    scene::{SceneData, SceneError},
};

/// Settings for [`foreach_real_geometry`].
#[derive(Clone, Debug)]
pub struct ForeachOptions {
    /// Minimum number of geometries handed to one parallel task.
    pub grain_size: usize,
}

impl Default for ForeachOptions {
    fn default() -> Self {
        Self {
            grain_size: FOREACH_GRAIN_SIZE,
        }
    }
}

/// Real geometry taken out of the tree, and every place it was taken from.
struct ExtractedGeometry {
    geometry: GeometrySet,
    /// Reference indices leading from the root to each place.
    paths: Vec<Vec<usize>>,
}

/// Call `callback` on every distinct non-instance geometry in `geometry`, including geometry
/// nested in instances at any depth, and put the results back where they came from.
///
/// Geometry shared between several places is processed once. Object and collection
/// references are converted to geometry references on the way, so nested edits have somewhere
/// to go.
pub fn foreach_real_geometry<F>(
    geometry: &mut GeometrySet,
    scene: &SceneData,
    options: &ForeachOptions,
    callback: F,
) -> Result<(), SceneError>
where
    F: Fn(&mut GeometrySet) + Send + Sync,
{
    let mut extracted = Vec::new();
    let mut index_by_data = FxHashMap::default();
    let mut path = Vec::new();
    let gathered = gather_real_geometries(geometry, scene, &mut path, &mut extracted, &mut index_by_data);
    log::debug!(
        "Extracted {} geometries from {} places",
        extracted.len(),
        extracted.iter().map(|e| e.paths.len()).sum::<usize>()
    );

    // On failure the extracted geometry still goes back, unprocessed.
    if gathered.is_ok() {
        extracted
            .par_iter_mut()
            .with_min_len(options.grain_size.max(1))
            .for_each(|entry| callback(&mut entry.geometry));
    }

    let join_options = JoinOptions {
        allow_merging_instance_references: false,
        ..JoinOptions::default()
    };
    for entry in &extracted {
        for path in &entry.paths {
            let Some(target) = geometry_at_path(geometry, path) else {
                debug_assert!(false, "extracted geometry path {path:?} no longer exists");
                continue;
            };
            let existing = std::mem::take(target);
            *target = join_geometries(&[existing, entry.geometry.clone()], &join_options);
        }
    }
    gathered
}

fn gather_real_geometries(
    geometry: &mut GeometrySet,
    scene: &SceneData,
    path: &mut Vec<usize>,
    extracted: &mut Vec<ExtractedGeometry>,
    index_by_data: &mut FxHashMap<Vec<(ComponentType, usize)>, usize>,
) -> Result<(), SceneError> {
    let has_instances = geometry.has(ComponentType::Instances);
    let real = geometry.extract_real_geometry();
    match real.real_data_key() {
        Some(key) => match index_by_data.get(&key) {
            Some(&index) => extracted[index].paths.push(path.clone()),
            None => {
                index_by_data.insert(key, extracted.len());
                extracted.push(ExtractedGeometry {
                    geometry: real,
                    paths: vec![path.clone()],
                });
            }
        },
        None if !has_instances => extracted.push(ExtractedGeometry {
            geometry: real,
            paths: vec![path.clone()],
        }),
        None => {}
    }

    let Some(instances) = geometry.get_instances_for_write() else {
        return Ok(());
    };
    instances.ensure_geometry_instances(scene)?;
    for index in 0..instances.references_num() {
        if instances.references()[index].kind() != ReferenceKind::GeometrySet {
            continue;
        }
        path.push(index);
        gather_real_geometries(
            instances.geometry_set_from_reference(index),
            scene,
            path,
            extracted,
            index_by_data,
        )?;
        path.pop();
    }
    Ok(())
}

fn geometry_at_path<'a>(geometry: &'a mut GeometrySet, path: &[usize]) -> Option<&'a mut GeometrySet> {
    let mut current = geometry;
    for &index in path {
        current = current.get_instances_for_write()?.geometry_set_from_reference(index);
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        geometry::{Mesh, PointCloud},
        instances::{InstanceReference, Instances},
        scene::Object,
    };
    use cgmath::{Matrix4, SquareMatrix, Vector3, Zero};

    fn translation(x: f32) -> Matrix4<f32> {
        Matrix4::from_translation(Vector3::new(x, 0.0, 0.0))
    }

    fn add_point(geometry: &mut GeometrySet) {
        if let Some(points) = geometry.get_pointcloud_for_write() {
            points.add_point(Vector3::new(1.0, 1.0, 1.0));
        }
    }

    #[test]
    fn shared_geometry_is_processed_once() {
        let mut instances = Instances::new();
        let handle = instances.add_reference(GeometrySet::from_pointcloud(PointCloud::new(5)).into());
        for i in 0..3 {
            instances.add_instance(handle, translation(i as f32));
        }
        let mut geometry = GeometrySet::from_instances(instances);

        let calls = AtomicUsize::new(0);
        foreach_real_geometry(&mut geometry, &SceneData::new(), &ForeachOptions::default(), |geometry| {
            calls.fetch_add(1, Ordering::Relaxed);
            add_point(geometry);
        })
        .unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        let instances = geometry.get_instances_for_write().unwrap();
        assert_eq!(instances.instances_num(), 3);
        assert_eq!(instances.references_num(), 1);
        assert_eq!(
            instances
                .geometry_set_from_reference(0)
                .get_pointcloud()
                .unwrap()
                .points_num(),
            6
        );
    }

    #[test]
    fn payload_shared_by_two_references_is_processed_once() {
        let shared = GeometrySet::from_pointcloud(PointCloud::new(1));
        let mut instances = Instances::new();
        let a = instances.add_reference(shared.clone().into());
        let b = instances.add_reference(shared.into());
        instances.add_instance(a, Matrix4::identity());
        instances.add_instance(b, Matrix4::identity());
        let mut geometry = GeometrySet::from_instances(instances);

        let calls = AtomicUsize::new(0);
        foreach_real_geometry(&mut geometry, &SceneData::new(), &ForeachOptions::default(), |geometry| {
            calls.fetch_add(1, Ordering::Relaxed);
            add_point(geometry);
        })
        .unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        let instances = geometry.get_instances_for_write().unwrap();
        for handle in [a, b] {
            let points = instances.geometry_set_from_reference(handle).get_pointcloud().unwrap();
            assert_eq!(points.points_num(), 2);
        }
    }

    #[test]
    fn no_op_keeps_the_tree_intact() {
        let leaf = GeometrySet::from_mesh(Mesh::from_positions(vec![Vector3::zero()]));
        let mut inner = Instances::new();
        let leaf_handle = inner.add_reference(leaf.into());
        inner.add_instance(leaf_handle, translation(1.0));
        inner.add_instance(leaf_handle, translation(2.0));

        let mut outer = Instances::new();
        let none = outer.add_reference(InstanceReference::None);
        let nested = outer.add_reference(GeometrySet::from_instances(inner).into());
        outer.add_instance(nested, translation(3.0));
        outer.add_instance(none, translation(4.0));
        outer.add_instance(nested, translation(5.0));
        let mut geometry = GeometrySet::from_instances(outer);
        geometry.replace_pointcloud(PointCloud::new(2));

        let snapshot = |geometry: &mut GeometrySet| {
            let outer = geometry.get_instances_for_write().unwrap();
            let outer_state = (outer.reference_handles().to_vec(), outer.transforms().to_vec());
            let inner = outer.geometry_set_from_reference(1).get_instances().unwrap();
            let inner_state = (inner.reference_handles().to_vec(), inner.transforms().to_vec());
            (outer_state, inner_state)
        };
        let before = snapshot(&mut geometry);
        let points_before = geometry.get_pointcloud().cloned();

        foreach_real_geometry(&mut geometry, &SceneData::new(), &ForeachOptions::default(), |_| {}).unwrap();

        assert_eq!(snapshot(&mut geometry), before);
        assert_eq!(geometry.get_pointcloud().cloned(), points_before);
        let outer = geometry.get_instances_for_write().unwrap();
        let inner = outer.geometry_set_from_reference(1).get_instances_for_write().unwrap();
        assert_eq!(
            inner.geometry_set_from_reference(0).get_mesh().unwrap().verts_num(),
            1
        );
    }

    #[test]
    fn empty_geometry_is_still_visited() {
        let mut geometry = GeometrySet::new();
        foreach_real_geometry(&mut geometry, &SceneData::new(), &ForeachOptions::default(), |geometry| {
            geometry.replace_pointcloud(PointCloud::new(3));
        })
        .unwrap();
        assert_eq!(geometry.get_pointcloud().unwrap().points_num(), 3);
    }

    #[test]
    fn object_references_become_editable_geometry() {
        let mut scene = SceneData::new();
        let object = scene.add_object(Object::new(
            "points",
            Matrix4::identity(),
            GeometrySet::from_pointcloud(PointCloud::new(1)),
        ));
        let mut instances = Instances::new();
        let handle = instances.add_reference(InstanceReference::Object(object));
        instances.add_instance(handle, Matrix4::identity());
        let mut geometry = GeometrySet::from_instances(instances);

        foreach_real_geometry(&mut geometry, &scene, &ForeachOptions { grain_size: 1 }, add_point).unwrap();

        let instances = geometry.get_instances_for_write().unwrap();
        assert_eq!(instances.references()[0].kind(), ReferenceKind::GeometrySet);
        assert_eq!(
            instances
                .geometry_set_from_reference(0)
                .get_pointcloud()
                .unwrap()
                .points_num(),
            2
        );
        let original = scene.object(object).unwrap().geometry().get_pointcloud().unwrap();
        assert_eq!(original.points_num(), 1);
    }

    #[test]
    fn dangling_scene_references_fail_without_losing_geometry() {
        let mut scene = SceneData::new();
        let object = scene.add_object(Object::new("o", Matrix4::identity(), GeometrySet::new()));
        scene.remove_object(object);
        let mut instances = Instances::new();
        let handle = instances.add_reference(InstanceReference::Object(object));
        instances.add_instance(handle, Matrix4::identity());
        let mut geometry = GeometrySet::from_instances(instances);

        geometry.replace_pointcloud(PointCloud::new(4));

        let result = foreach_real_geometry(&mut geometry, &scene, &ForeachOptions::default(), |geometry| {
            geometry.remove(ComponentType::PointCloud);
        });
        assert!(matches!(result, Err(SceneError::ObjectNotFound(_))));
        assert_eq!(geometry.get_pointcloud().unwrap().points_num(), 4);
    }
}
