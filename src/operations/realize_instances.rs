//! Turn instances into real geometry.
//!
//! Realization happens in two steps: the instance tree is walked once to collect a task per
//! leaf geometry (with the accumulated transform, id and inherited instance attributes), then
//! every component type is built from the tasks. Each task becomes a transformed copy of its
//! leaf, built in parallel, and the copies are concatenated with the same attribute merging
//! rules as [`join_geometries`](super::join_geometries::join_geometries).

use cgmath::{Matrix4, SquareMatrix};
use rayon::prelude::*;
use thiserror::Error;

use crate::{
    attributes::{AttrDomain, AttrType, AttributeArray, AttributeFilter, AttributeMap, AttributeOwner, AttributeValue},
    constants::{
        DEFAULT_CURVE_RADIUS, DEFAULT_POINT_RADIUS, ID_ATTRIBUTE, INSTANCE_TRANSFORM_ATTRIBUTE, RADIUS_ATTRIBUTE,
        REALIZE_GRAIN_SIZE, REFERENCE_INDEX_ATTRIBUTE,
    },
    core::{hash::hash_ids, transform::is_identity},
    geometry::{ComponentType, Curves, GeometryEditData, GeometrySet, Mesh, PointCloud, Volume},
    instances::{InstanceReference, Instances},
    operations::join_geometries::{join_attributes, join_attributes_with_defaults},
    scene::{SceneData, SceneError},
};

/// Settings for [`realize_instances`].
#[derive(Clone, Debug)]
pub struct RealizeInstancesOptions<'a> {
    /// Copy stored `id` values instead of mixing in the instance id.
    pub keep_original_ids: bool,
    /// Copy instance attributes onto the points of the realized geometry.
    pub realize_instance_attributes: bool,
    pub attribute_filter: AttributeFilter,
    /// Where object and collection references are looked up. Without it they are skipped.
    pub scene: Option<&'a SceneData>,
}

impl Default for RealizeInstancesOptions<'_> {
    fn default() -> Self {
        Self {
            keep_original_ids: false,
            realize_instance_attributes: true,
            attribute_filter: AttributeFilter::default(),
            scene: None,
        }
    }
}

/// Realized geometry, plus everything that had to be left out.
#[derive(Debug)]
pub struct RealizeInstancesResult {
    pub geometry: GeometrySet,
    pub errors: Vec<RealizeError>,
}

#[derive(Debug, Error)]
pub enum RealizeError {
    #[error("Realized {component:?} would have {count} points, at most {max} are supported")]
    TooManyElements {
        component: ComponentType,
        count: usize,
        max: usize,
    },
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Instance attributes that aren't copied to realized geometry.
const SKIPPED_INSTANCE_ATTRIBUTES: [&str; 3] =
    [ID_ATTRIBUTE, REFERENCE_INDEX_ATTRIBUTE, INSTANCE_TRANSFORM_ATTRIBUTE];

/// Where a leaf geometry ends up.
#[derive(Clone, Debug)]
struct InstanceContext {
    transform: Matrix4<f32>,
    id: i32,
    /// Values of the instance attributes of every enclosing instance, innermost first wins.
    values: Vec<(String, AttributeValue)>,
}

impl InstanceContext {
    fn root() -> Self {
        Self {
            transform: Matrix4::identity(),
            id: 0,
            values: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct RealizeTask {
    /// Only the real components of the leaf.
    geometry: GeometrySet,
    context: InstanceContext,
}

struct GatherState<'a, 'b> {
    options: &'a RealizeInstancesOptions<'b>,
    tasks: Vec<RealizeTask>,
    errors: Vec<RealizeError>,
    warned_missing_scene: bool,
}

/// Flatten all instances, at any depth, into mesh, point cloud, curve and edit components.
///
/// Only the first volume found is kept. Geometry without instances is returned as is.
pub fn realize_instances(geometry: &GeometrySet, options: &RealizeInstancesOptions) -> RealizeInstancesResult {
    if !geometry.has_instances() {
        return RealizeInstancesResult {
            geometry: geometry.clone(),
            errors: Vec::new(),
        };
    }

    let mut state = GatherState {
        options,
        tasks: Vec::new(),
        errors: Vec::new(),
        warned_missing_scene: false,
    };
    gather_realize_tasks(geometry, &InstanceContext::root(), &mut state);
    let GatherState { tasks, mut errors, .. } = state;
    log::debug!("Realizing {} leaf geometries", tasks.len());

    let mut result = GeometrySet::new();
    if let Some(mesh) = realize_component::<Mesh>(&tasks, options, &mut errors) {
        result.replace_mesh(mesh);
    }
    if let Some(points) = realize_component::<PointCloud>(&tasks, options, &mut errors) {
        result.replace_pointcloud(points);
    }
    if let Some(curves) = realize_component::<Curves>(&tasks, options, &mut errors) {
        result.replace_curves(curves);
    }
    if let Some(volume) = realize_volume(&tasks) {
        result.replace_volume(volume);
    }
    if let Some(edit_data) = realize_edit_data(&tasks) {
        result.replace_edit_data(edit_data);
    }

    RealizeInstancesResult {
        geometry: result,
        errors,
    }
}

fn gather_realize_tasks(geometry: &GeometrySet, context: &InstanceContext, state: &mut GatherState) {
    let mut real = GeometrySet::new();
    for component in geometry.components() {
        if component.component_type() != ComponentType::Instances {
            real.add(component.clone());
        }
    }
    if real.count_components() > 0 {
        state.tasks.push(RealizeTask {
            geometry: real,
            context: context.clone(),
        });
    }
    if let Some(instances) = geometry.get_instances() {
        gather_instances(instances, context, state);
    }
}

fn gather_instances(instances: &Instances, parent: &InstanceContext, state: &mut GatherState) {
    let stored_ids = instances
        .attributes()
        .lookup(ID_ATTRIBUTE)
        .filter(|attribute| attribute.domain() == AttrDomain::Instance)
        .map(|attribute| attribute.values().convert(AttrType::Int32));
    let stored_ids = stored_ids.as_ref().and_then(|ids| ids.typed::<i32>());

    let filter = &state.options.attribute_filter;
    let propagated: Vec<_> = if state.options.realize_instance_attributes {
        instances
            .attributes()
            .iter()
            .filter(|attribute| {
                attribute.domain() == AttrDomain::Instance
                    && attribute.data_type() != AttrType::String
                    && !SKIPPED_INSTANCE_ATTRIBUTES.contains(&attribute.name())
                    && !filter.allow_skip(attribute.name())
            })
            .collect()
    } else {
        Vec::new()
    };

    for (i, (&handle, transform)) in instances
        .reference_handles()
        .iter()
        .zip(instances.transforms())
        .enumerate()
    {
        let local_id = stored_ids.map_or(i as i32, |ids| ids[i]);
        let mut context = InstanceContext {
            transform: parent.transform * *transform,
            id: hash_ids(parent.id, local_id),
            values: parent.values.clone(),
        };
        for attribute in &propagated {
            let value = attribute.values().get(i);
            match context.values.iter_mut().find(|(name, _)| name == attribute.name()) {
                Some((_, existing)) => *existing = value,
                None => context.values.push((attribute.name().to_owned(), value)),
            }
        }

        match &instances.references()[handle] {
            InstanceReference::None => {}
            InstanceReference::GeometrySet(geometry) => gather_realize_tasks(geometry, &context, state),
            InstanceReference::Object(id) => {
                if let Some(scene) = scene_for_lookup(state) {
                    match scene.object_geometry(*id) {
                        Ok(geometry) => gather_realize_tasks(&geometry, &context, state),
                        Err(error) => state.errors.push(error.into()),
                    }
                }
            }
            InstanceReference::Collection(id) => {
                if let Some(scene) = scene_for_lookup(state) {
                    match scene.collection_instances(*id) {
                        Ok(instances) => gather_instances(&instances, &context, state),
                        Err(error) => state.errors.push(error.into()),
                    }
                }
            }
        }
    }
}

/// The scene to resolve object and collection references in, warning once if there's none.
fn scene_for_lookup<'b>(state: &mut GatherState<'_, 'b>) -> Option<&'b SceneData> {
    if state.options.scene.is_none() && !state.warned_missing_scene {
        log::warn!("Skipping object and collection instances, no scene data to resolve them");
        state.warned_missing_scene = true;
    }
    state.options.scene
}

/// Component types that are realized by concatenating transformed copies.
trait Realizable: AttributeOwner + Clone + Send + Sync + Sized {
    const COMPONENT: ComponentType;

    fn from_geometry(geometry: &GeometrySet) -> Option<&Self>;

    fn apply_transform(&mut self, matrix: &Matrix4<f32>);

    /// Join realized copies, in order.
    fn concatenate(chunks: &[Self], filter: &AttributeFilter) -> Self;
}

impl Realizable for PointCloud {
    const COMPONENT: ComponentType = ComponentType::PointCloud;

    fn from_geometry(geometry: &GeometrySet) -> Option<&Self> {
        geometry.get_pointcloud()
    }

    fn apply_transform(&mut self, matrix: &Matrix4<f32>) {
        self.transform(matrix);
    }

    fn concatenate(chunks: &[Self], filter: &AttributeFilter) -> Self {
        let owners: Vec<&dyn AttributeOwner> = chunks.iter().map(|c| c as &dyn AttributeOwner).collect();
        let mut result = PointCloud::default();
        result.resize(chunks.iter().map(PointCloud::points_num).sum());
        join_attributes_with_defaults(&owners, &[], filter, result.attributes_for_write(), |name| {
            (name == RADIUS_ATTRIBUTE).then_some(AttributeValue::Float(DEFAULT_POINT_RADIUS))
        });
        result
    }
}

impl Realizable for Mesh {
    const COMPONENT: ComponentType = ComponentType::Mesh;

    fn from_geometry(geometry: &GeometrySet) -> Option<&Self> {
        geometry.get_mesh()
    }

    fn apply_transform(&mut self, matrix: &Matrix4<f32>) {
        self.transform(matrix);
    }

    fn concatenate(chunks: &[Self], filter: &AttributeFilter) -> Self {
        let mut edges = Vec::with_capacity(chunks.iter().map(Mesh::edges_num).sum());
        let mut face_offsets = Vec::with_capacity(chunks.iter().map(Mesh::faces_num).sum::<usize>() + 1);
        let mut corner_verts = Vec::with_capacity(chunks.iter().map(Mesh::corners_num).sum());
        face_offsets.push(0);

        let mut vert_offset = 0;
        for chunk in chunks {
            let corner_offset = corner_verts.len();
            edges.extend(
                chunk
                    .edges()
                    .iter()
                    .map(|[v1, v2]| [v1 + vert_offset, v2 + vert_offset]),
            );
            face_offsets.extend(chunk.face_offsets()[1..].iter().map(|offset| offset + corner_offset));
            corner_verts.extend(chunk.corner_verts().iter().map(|vert| vert + vert_offset));
            vert_offset += chunk.verts_num();
        }

        let mut result = Mesh::from_raw(vert_offset, edges, face_offsets, corner_verts, AttributeMap::new());
        let owners: Vec<&dyn AttributeOwner> = chunks.iter().map(|c| c as &dyn AttributeOwner).collect();
        join_attributes(&owners, &[], filter, result.attributes_for_write());
        result
    }
}

impl Realizable for Curves {
    const COMPONENT: ComponentType = ComponentType::Curve;

    fn from_geometry(geometry: &GeometrySet) -> Option<&Self> {
        geometry.get_curves()
    }

    fn apply_transform(&mut self, matrix: &Matrix4<f32>) {
        self.transform(matrix);
    }

    fn concatenate(chunks: &[Self], filter: &AttributeFilter) -> Self {
        let mut curve_offsets = Vec::with_capacity(chunks.iter().map(Curves::curves_num).sum::<usize>() + 1);
        curve_offsets.push(0);
        let mut point_offset = 0;
        for chunk in chunks {
            curve_offsets.extend(chunk.curve_offsets()[1..].iter().map(|offset| offset + point_offset));
            point_offset += chunk.points_num();
        }

        let mut result = Curves::from_raw(curve_offsets, AttributeMap::new());
        let owners: Vec<&dyn AttributeOwner> = chunks.iter().map(|c| c as &dyn AttributeOwner).collect();
        join_attributes_with_defaults(&owners, &[], filter, result.attributes_for_write(), |name| {
            (name == RADIUS_ATTRIBUTE).then_some(AttributeValue::Float(DEFAULT_CURVE_RADIUS))
        });
        result
    }
}

fn realize_component<T: Realizable>(
    tasks: &[RealizeTask],
    options: &RealizeInstancesOptions,
    errors: &mut Vec<RealizeError>,
) -> Option<T> {
    let leaves: Vec<(&RealizeTask, &T)> = tasks
        .iter()
        .filter_map(|task| T::from_geometry(&task.geometry).map(|component| (task, component)))
        .collect();
    if leaves.is_empty() {
        return None;
    }

    let points_num: usize = leaves
        .iter()
        .map(|(_, component)| component.attribute_domain_size(AttrDomain::Point))
        .sum();
    let max = i32::MAX as usize;
    if points_num > max {
        errors.push(RealizeError::TooManyElements {
            component: T::COMPONENT,
            count: points_num,
            max,
        });
        return None;
    }

    let create_id = leaves
        .iter()
        .any(|(_, component)| component.attributes().contains(ID_ATTRIBUTE));
    let chunks: Vec<T> = leaves
        .par_iter()
        .with_min_len(REALIZE_GRAIN_SIZE)
        .map(|(task, component)| realize_chunk(task, *component, create_id, options))
        .collect();

    if chunks.len() == 1 {
        return chunks.into_iter().next();
    }
    Some(T::concatenate(&chunks, &options.attribute_filter))
}

/// A transformed copy of one leaf, with instance attributes and ids filled in.
fn realize_chunk<T: Realizable>(
    task: &RealizeTask,
    component: &T,
    create_id: bool,
    options: &RealizeInstancesOptions,
) -> T {
    let mut chunk = component.clone();
    if !is_identity(&task.context.transform) {
        chunk.apply_transform(&task.context.transform);
    }
    let points_num = chunk.attribute_domain_size(AttrDomain::Point);

    let ids = create_id.then(|| {
        let stored = chunk
            .attributes()
            .contains(ID_ATTRIBUTE)
            .then(|| chunk.lookup_or_default(ID_ATTRIBUTE, AttrDomain::Point, AttrType::Int32));
        let stored = stored.as_ref().and_then(|ids| ids.typed::<i32>());
        (0..points_num)
            .map(|i| match (options.keep_original_ids, stored) {
                (true, Some(stored)) => stored[i],
                (true, None) => 0,
                (false, Some(stored)) => hash_ids(task.context.id, stored[i]),
                (false, None) => hash_ids(task.context.id, i as i32),
            })
            .collect::<Vec<i32>>()
    });

    let attributes = chunk.attributes_for_write();
    attributes.retain(|attribute| !options.attribute_filter.allow_skip(attribute.name()));
    for (name, value) in &task.context.values {
        if !attributes.contains(name) {
            attributes.add(name.clone(), AttrDomain::Point, AttributeArray::filled(value, points_num));
        }
    }
    if let Some(ids) = ids {
        attributes.remove(ID_ATTRIBUTE);
        attributes.add(ID_ATTRIBUTE, AttrDomain::Point, ids);
    }
    chunk
}

fn realize_volume(tasks: &[RealizeTask]) -> Option<Volume> {
    let mut volumes = tasks
        .iter()
        .filter_map(|task| task.geometry.get_volume().map(|volume| (task, volume)));
    let (task, volume) = volumes.next()?;
    let skipped = volumes.count();
    if skipped > 0 {
        log::debug!("Only the first volume is realized, skipping {}", skipped);
    }
    let mut volume = volume.clone();
    if !is_identity(&task.context.transform) {
        volume.transform(&task.context.transform);
    }
    Some(volume)
}

fn realize_edit_data(tasks: &[RealizeTask]) -> Option<GeometryEditData> {
    let mut result: Option<GeometryEditData> = None;
    for task in tasks {
        if let Some(edit_data) = task.geometry.get_edit_data() {
            result
                .get_or_insert_with(GeometryEditData::new)
                .merge_from(edit_data, &task.context.transform);
        }
    }
    result
}
