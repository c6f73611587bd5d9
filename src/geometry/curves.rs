use std::ops::Range;

use cgmath::{Matrix4, Vector3};

use crate::attributes::{AttrDomain, AttrType, AttributeMap, AttributeOwner};
use crate::constants::{HANDLE_LEFT_ATTRIBUTE, HANDLE_RIGHT_ATTRIBUTE, POSITION_ATTRIBUTE};
use crate::core::transform::transform_points;

/// A set of curves, each a run of consecutive points.
#[derive(Clone, Debug, PartialEq)]
pub struct Curves {
    curve_offsets: Vec<usize>,
    attributes: AttributeMap,
}

impl Default for Curves {
    fn default() -> Self {
        let mut attributes = AttributeMap::new();
        attributes.add(POSITION_ATTRIBUTE, AttrDomain::Point, Vec::<Vector3<f32>>::new());
        Self {
            curve_offsets: vec![0],
            attributes,
        }
    }
}

impl Curves {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_raw(curve_offsets: Vec<usize>, attributes: AttributeMap) -> Self {
        debug_assert_eq!(curve_offsets.first(), Some(&0));
        Self {
            curve_offsets,
            attributes,
        }
    }

    pub fn points_num(&self) -> usize {
        self.curve_offsets.last().copied().unwrap_or(0)
    }

    pub fn curves_num(&self) -> usize {
        self.curve_offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.curves_num() == 0
    }

    pub fn curve_offsets(&self) -> &[usize] {
        &self.curve_offsets
    }

    pub fn points_by_curve(&self, curve: usize) -> Range<usize> {
        self.curve_offsets[curve]..self.curve_offsets[curve + 1]
    }

    pub fn positions(&self) -> &[Vector3<f32>] {
        self.attributes
            .lookup_typed(POSITION_ATTRIBUTE)
            .unwrap_or_default()
    }

    pub fn positions_for_write(&mut self) -> &mut [Vector3<f32>] {
        let points_num = self.points_num();
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

    /// Append a curve through the given points, returning its index.
    pub fn add_curve(&mut self, positions: &[Vector3<f32>]) -> usize {
        let start = self.points_num();
        self.curve_offsets.push(start + positions.len());
        self.attributes.resize_domain(AttrDomain::Point, self.points_num());
        self.attributes.resize_domain(AttrDomain::Curve, self.curves_num());
        self.positions_for_write()[start..].copy_from_slice(positions);
        self.curves_num() - 1
    }

    /// Transform positions and bezier handles.
    pub fn transform(&mut self, matrix: &Matrix4<f32>) {
        transform_points(matrix, self.positions_for_write());
        for handle in [HANDLE_LEFT_ATTRIBUTE, HANDLE_RIGHT_ATTRIBUTE] {
            if let Some(handles) = self.attributes.lookup_typed_mut::<Vector3<f32>>(handle) {
                transform_points(matrix, handles);
            }
        }
    }

    /// The curve each point belongs to.
    fn point_curves(&self) -> Vec<usize> {
        (0..self.curves_num())
            .flat_map(|curve| self.points_by_curve(curve).map(move |_| curve))
            .collect()
    }
}

impl AttributeOwner for Curves {
    fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    fn attributes_for_write(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }

    fn attribute_domain_size(&self, domain: AttrDomain) -> usize {
        match domain {
            AttrDomain::Point => self.points_num(),
            AttrDomain::Curve => self.curves_num(),
            _ => 0,
        }
    }

    fn domain_gather_indices(&self, from: AttrDomain, to: AttrDomain) -> Option<Vec<usize>> {
        match (from, to) {
            (AttrDomain::Curve, AttrDomain::Point) => Some(self.point_curves()),
            _ => None,
        }
    }
}
