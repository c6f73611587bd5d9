use cgmath::{Matrix4, SquareMatrix};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::{
    attributes::{AttrType, AttributeArray, AttributeFilter, AttributeMap, AttributeMeta, AttributeOwner, AttributeValue},
    constants::{ATTRIBUTE_GRAIN_SIZE, INSTANCE_TRANSFORM_ATTRIBUTE, REFERENCE_INDEX_ATTRIBUTE},
    geometry::{ComponentType, GeometryComponent, GeometrySet},
    instances::{InstanceReference, Instances},
    operations::realize_instances::{RealizeInstancesOptions, realize_instances},
};

/// Settings for [`join_geometries`].
#[derive(Clone, Debug)]
pub struct JoinOptions {
    /// Which anonymous attributes have to survive.
    pub attribute_filter: AttributeFilter,
    /// Only join these component types, dropping the others. `None` joins everything.
    pub component_types: Option<Vec<ComponentType>>,
    /// Share equal instance references between inputs instead of keeping one per input.
    pub allow_merging_instance_references: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            attribute_filter: AttributeFilter::default(),
            component_types: None,
            allow_merging_instance_references: true,
        }
    }
}

/// Merge geometry bundles into one, component type by component type.
///
/// A component type present in a single input is passed through without copying. Volumes
/// can't be merged, so they are dropped when more than one input has one.
pub fn join_geometries(geometries: &[GeometrySet], options: &JoinOptions) -> GeometrySet {
    let mut result = GeometrySet::new();
    for component_type in ComponentType::ALL {
        if let Some(types) = &options.component_types {
            if !types.contains(&component_type) {
                continue;
            }
        }
        let components: Vec<&GeometryComponent> = geometries
            .iter()
            .filter_map(|geometry| geometry.get_component(component_type))
            .collect();
        match components.as_slice() {
            [] => continue,
            [component] => {
                result.add((*component).clone());
                continue;
            }
            _ => {}
        }

        match component_type {
            ComponentType::Instances => {
                let instances = join_instances(&components, options);
                result.replace_instances(instances);
            }
            ComponentType::Volume => {
                log::warn!(
                    "Joining {} volumes isn't supported, dropping them",
                    components.len()
                );
            }
            _ => join_component_type(component_type, &components, options, &mut result),
        }
    }
    result
}

fn join_instances(components: &[&GeometryComponent], options: &JoinOptions) -> Instances {
    let sources: Vec<&Instances> = components
        .iter()
        .filter_map(|component| match component {
            GeometryComponent::Instances(instances) => Some(&**instances),
            _ => None,
        })
        .collect();

    let mut offsets = Vec::with_capacity(sources.len() + 1);
    offsets.push(0);
    for instances in &sources {
        offsets.push(offsets[offsets.len() - 1] + instances.instances_num());
    }
    let total = offsets[sources.len()];

    let mut dst = Instances::new();
    dst.resize(total);

    for (i, instances) in sources.iter().enumerate() {
        let handle_map: Vec<usize> = instances
            .references()
            .iter()
            .map(|reference| {
                if options.allow_merging_instance_references {
                    dst.add_reference(reference.clone())
                } else {
                    dst.add_new_reference(reference.clone())
                }
            })
            .collect();

        let range = offsets[i]..offsets[i + 1];
        for (dst_handle, &src_handle) in dst.reference_handles_for_write()[range.clone()]
            .iter_mut()
            .zip(instances.reference_handles())
        {
            *dst_handle = handle_map[src_handle];
        }
        dst.transforms_for_write()[range].copy_from_slice(instances.transforms());
    }

    let owners: Vec<&dyn AttributeOwner> = sources
        .iter()
        .map(|instances| *instances as &dyn AttributeOwner)
        .collect();
    join_attributes(
        &owners,
        &[REFERENCE_INDEX_ATTRIBUTE, INSTANCE_TRANSFORM_ATTRIBUTE],
        &options.attribute_filter,
        dst.attributes_for_write(),
    );
    dst
}

/// Concatenate several components of one type by instancing each once at the origin and
/// realizing the result.
fn join_component_type(
    component_type: ComponentType,
    components: &[&GeometryComponent],
    options: &JoinOptions,
    result: &mut GeometrySet,
) {
    let mut instances = Instances::new();
    instances.reserve(components.len());
    for component in components {
        let mut geometry = GeometrySet::new();
        geometry.add((*component).clone());
        let handle = instances.add_new_reference(InstanceReference::from(geometry));
        instances.add_instance(handle, Matrix4::identity());
    }

    let realize_options = RealizeInstancesOptions {
        keep_original_ids: true,
        realize_instance_attributes: false,
        attribute_filter: options.attribute_filter.clone(),
        scene: None,
    };
    let realized = realize_instances(&GeometrySet::from_instances(instances), &realize_options);
    for error in &realized.errors {
        log::warn!("Joining {:?} components: {}", component_type, error);
    }
    if let Some(component) = realized.geometry.get_component(component_type) {
        result.add(component.clone());
    }
}

/// The attributes a join of `owners` ends up with, in order of first appearance.
///
/// Attributes with the same name are merged into the most complex type and the highest
/// priority domain any of them uses. String attributes are never joined.
pub(crate) fn get_final_attribute_info(
    owners: &[&dyn AttributeOwner],
    ignored: &[&str],
    filter: &AttributeFilter,
) -> Vec<(String, AttributeMeta)> {
    let mut info: Vec<(String, AttributeMeta)> = Vec::new();
    let mut index_by_name: FxHashMap<String, usize> = FxHashMap::default();
    for owner in owners {
        owner.attributes().for_all(|name, meta| {
            if ignored.contains(&name) || meta.data_type == AttrType::String || filter.allow_skip(name) {
                return true;
            }
            match index_by_name.get(name) {
                Some(&index) => {
                    let existing = &mut info[index].1;
                    existing.data_type = existing.data_type.highest_complexity(meta.data_type);
                    existing.domain = existing.domain.highest_priority(meta.domain);
                }
                None => {
                    index_by_name.insert(name.to_owned(), info.len());
                    info.push((name.to_owned(), meta));
                }
            }
            true
        });
    }
    info
}

/// Concatenate one attribute of every owner. Owners without it contribute `default`.
pub(crate) fn fill_new_attribute(
    owners: &[&dyn AttributeOwner],
    name: &str,
    meta: AttributeMeta,
    default: &AttributeValue,
) -> AttributeArray {
    let sizes: Vec<usize> = owners
        .iter()
        .map(|owner| owner.attribute_domain_size(meta.domain))
        .collect();
    let mut values = AttributeArray::new(meta.data_type, sizes.iter().sum());
    let mut offset = 0;
    for (owner, &size) in owners.iter().zip(&sizes) {
        if size == 0 {
            continue;
        }
        if owner.attributes().contains(name) {
            let src = owner.lookup_or_default(name, meta.domain, meta.data_type);
            values.copy_from_at(offset, &src);
        } else {
            values.fill_at(offset, size, default);
        }
        offset += size;
    }
    values
}

/// Add the concatenation of every attribute of `owners` to `dst`.
pub(crate) fn join_attributes(
    owners: &[&dyn AttributeOwner],
    ignored: &[&str],
    filter: &AttributeFilter,
    dst: &mut AttributeMap,
) {
    join_attributes_with_defaults(owners, ignored, filter, dst, |_| None);
}

/// Like [`join_attributes`], with a per-name override of the value used for owners that lack
/// an attribute.
pub(crate) fn join_attributes_with_defaults(
    owners: &[&dyn AttributeOwner],
    ignored: &[&str],
    filter: &AttributeFilter,
    dst: &mut AttributeMap,
    default_for: impl Fn(&str) -> Option<AttributeValue> + Sync,
) {
    let info = get_final_attribute_info(owners, ignored, filter);
    let columns: Vec<(String, AttributeMeta, AttributeArray)> = info
        .into_par_iter()
        .with_min_len(ATTRIBUTE_GRAIN_SIZE)
        .map(|(name, meta)| {
            let default = default_for(&name)
                .map(|value| value.convert(meta.data_type))
                .unwrap_or_else(|| AttributeValue::default_for(meta.data_type));
            let values = fill_new_attribute(owners, &name, meta, &default);
            (name, meta, values)
        })
        .collect();
    for (name, meta, values) in columns {
        dst.remove(&name);
        dst.add(name, meta.domain, values);
    }
}
