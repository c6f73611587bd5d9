use cgmath::{Matrix4, Vector3};

use crate::attributes::{AttrDomain, AttrType, AttributeMap, AttributeOwner};
use crate::constants::POSITION_ATTRIBUTE;
use crate::core::transform::transform_points;

/// A set of unconnected points.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    points_num: usize,
    attributes: AttributeMap,
}

impl PointCloud {
    /// A cloud of `points_num` points at the origin.
    pub fn new(points_num: usize) -> Self {
        Self::from_positions(vec![Vector3::new(0.0, 0.0, 0.0); points_num])
    }

    pub fn from_positions(positions: Vec<Vector3<f32>>) -> Self {
        let mut attributes = AttributeMap::new();
        let points_num = positions.len();
        attributes.add(POSITION_ATTRIBUTE, AttrDomain::Point, positions);
        Self {
            points_num,
            attributes,
        }
    }

    pub fn points_num(&self) -> usize {
        self.points_num
    }

    pub fn is_empty(&self) -> bool {
        self.points_num == 0
    }

    pub fn positions(&self) -> &[Vector3<f32>] {
        self.attributes
            .lookup_typed(POSITION_ATTRIBUTE)
            .unwrap_or_default()
    }

    pub fn positions_for_write(&mut self) -> &mut [Vector3<f32>] {
        let points_num = self.points_num;
        self.attributes
            .lookup_or_add_for_write_only_span(
                POSITION_ATTRIBUTE,
                AttrDomain::Point,
                AttrType::Float3,
                points_num,
            )
            .typed_mut()
            .unwrap_or_default()
    }

    /// Grow or shrink the cloud. New points get default attribute values.
    pub fn resize(&mut self, points_num: usize) {
        self.points_num = points_num;
        self.attributes.resize_domain(AttrDomain::Point, points_num);
    }

    /// Append one point, returning its index.
    pub fn add_point(&mut self, position: Vector3<f32>) -> usize {
        let index = self.points_num;
        self.resize(index + 1);
        self.positions_for_write()[index] = position;
        index
    }

    pub fn transform(&mut self, matrix: &Matrix4<f32>) {
        transform_points(matrix, self.positions_for_write());
    }
}

impl AttributeOwner for PointCloud {
    fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    fn attributes_for_write(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }

    fn attribute_domain_size(&self, domain: AttrDomain) -> usize {
        match domain {
            AttrDomain::Point => self.points_num,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transform::SpatialTransform;

    #[test]
    fn add_point_extends_every_point_attribute() {
        let mut points = PointCloud::new(2);
        points
            .attributes_for_write()
            .add("weight", AttrDomain::Point, vec![0.5_f32, 0.25]);
        let index = points.add_point(Vector3::new(1.0, 2.0, 3.0));

        assert_eq!(index, 2);
        assert_eq!(points.points_num(), 3);
        assert_eq!(points.positions()[2], Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(
            points.attributes().lookup_typed::<f32>("weight"),
            Some(&[0.5, 0.25, 0.0][..])
        );
    }

    #[test]
    fn transform_moves_positions() {
        let mut points = PointCloud::from_positions(vec![Vector3::new(1.0, 0.0, 0.0)]);
        points.transform(&SpatialTransform::from_position(Vector3::new(0.0, 2.0, 0.0)).to_matrix());
        assert_eq!(points.positions(), &[Vector3::new(1.0, 2.0, 0.0)]);
    }
}
