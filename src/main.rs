use cgmath::{Matrix4, SquareMatrix, Vector3};
use geometry_instancing::{
    GeometrySet, InstanceReference, Instances, SceneData,
    core::transform::SpatialTransform,
    geometry::PointCloud,
    operations::{
        ForeachOptions, JoinOptions, RealizeInstancesOptions, foreach_real_geometry, join_geometries,
        realize_instances,
    },
    scene::{Collection, Object},
};

const ROW_LENGTH: usize = 4;
const SPACE_BETWEEN: f32 = 2.0;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut scene = SceneData::new();
    let points = scene.add_object(Object::new(
        "points",
        Matrix4::identity(),
        GeometrySet::from_pointcloud(PointCloud::from_positions(vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ])),
    ));
    let lifted = scene.add_object(Object::new(
        "lifted points",
        Matrix4::from_translation(Vector3::new(0.0, 0.0, 3.0)),
        GeometrySet::from_pointcloud(PointCloud::new(1)),
    ));
    let collection = scene.add_collection(Collection::new("both").with_objects([points, lifted]));

    // A row of object instances next to a row of collection instances.
    let mut instances = Instances::new();
    let object_handle = instances.add_reference(InstanceReference::Object(points));
    let collection_handle = instances.add_reference(InstanceReference::Collection(collection));
    for i in 0..ROW_LENGTH {
        let x = i as f32 * SPACE_BETWEEN;
        instances.add_instance(
            object_handle,
            SpatialTransform::from_position(Vector3::new(x, 0.0, 0.0)).to_matrix(),
        );
        instances.add_instance(
            collection_handle,
            SpatialTransform::from_position(Vector3::new(x, 5.0, 0.0)).to_matrix(),
        );
    }

    let nested = GeometrySet::from_instances(instances);
    let mut geometry = GeometrySet::from_pointcloud(PointCloud::new(1));
    let mut outer = Instances::new();
    let nested_handle = outer.add_reference(nested.into());
    outer.add_instance(nested_handle, Matrix4::identity());
    outer.add_instance(
        nested_handle,
        SpatialTransform::from_position(Vector3::new(0.0, 0.0, 10.0)).to_matrix(),
    );
    geometry.replace_instances(outer);

    foreach_real_geometry(&mut geometry, &scene, &ForeachOptions::default(), |geometry| {
        if let Some(points) = geometry.get_pointcloud_for_write() {
            let top = points.positions().iter().map(|p| p.y).fold(0.0, f32::max);
            points.add_point(Vector3::new(0.0, top + 1.0, 0.0));
        }
    })?;

    let joined = join_geometries(&[geometry.clone(), geometry], &JoinOptions::default());
    if let Some(instances) = joined.get_instances() {
        log::info!(
            "Joined tree: {} instances of {} references",
            instances.instances_num(),
            instances.references_num()
        );
    }

    let realized = realize_instances(
        &joined,
        &RealizeInstancesOptions {
            scene: Some(&scene),
            ..RealizeInstancesOptions::default()
        },
    );
    for error in &realized.errors {
        log::warn!("{error}");
    }
    if let Some(points) = realized.geometry.get_pointcloud() {
        log::info!("Realized {} points", points.points_num());
    }

    Ok(())
}
