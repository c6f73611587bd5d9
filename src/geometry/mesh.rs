use std::ops::Range;

use cgmath::{Matrix4, Vector3};

use crate::attributes::{AttrDomain, AttrType, AttributeMap, AttributeOwner};
use crate::constants::POSITION_ATTRIBUTE;
use crate::core::transform::transform_points;

/// A polygon mesh: vertices, edges between them, and faces as loops of corners.
///
/// Faces are stored as offsets into `corner_verts`, so face `i` uses the corners
/// `face_offsets[i]..face_offsets[i + 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    verts_num: usize,
    edges: Vec<[usize; 2]>,
    face_offsets: Vec<usize>,
    corner_verts: Vec<usize>,
    attributes: AttributeMap,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::from_positions(Vec::new())
    }
}

impl Mesh {
    /// A mesh with only vertices.
    pub fn from_positions(positions: Vec<Vector3<f32>>) -> Self {
        let mut attributes = AttributeMap::new();
        let verts_num = positions.len();
        attributes.add(POSITION_ATTRIBUTE, AttrDomain::Point, positions);
        Self {
            verts_num,
            edges: Vec::new(),
            face_offsets: vec![0],
            corner_verts: Vec::new(),
            attributes,
        }
    }

    /// Build a mesh from raw topology. Offsets must start at 0 and end at `corner_verts.len()`.
    pub(crate) fn from_raw(
        verts_num: usize,
        edges: Vec<[usize; 2]>,
        face_offsets: Vec<usize>,
        corner_verts: Vec<usize>,
        attributes: AttributeMap,
    ) -> Self {
        debug_assert_eq!(face_offsets.first(), Some(&0));
        debug_assert_eq!(face_offsets.last(), Some(&corner_verts.len()));
        Self {
            verts_num,
            edges,
            face_offsets,
            corner_verts,
            attributes,
        }
    }

    pub fn verts_num(&self) -> usize {
        self.verts_num
    }

    pub fn edges_num(&self) -> usize {
        self.edges.len()
    }

    pub fn faces_num(&self) -> usize {
        self.face_offsets.len() - 1
    }

    pub fn corners_num(&self) -> usize {
        self.corner_verts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verts_num == 0
    }

    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    pub fn face_offsets(&self) -> &[usize] {
        &self.face_offsets
    }

    pub fn corner_verts(&self) -> &[usize] {
        &self.corner_verts
    }

    /// The corner range of a face.
    pub fn face_corners(&self, face: usize) -> Range<usize> {
        self.face_offsets[face]..self.face_offsets[face + 1]
    }

    /// The vertices of a face, in winding order.
    pub fn face_verts(&self, face: usize) -> &[usize] {
        &self.corner_verts[self.face_corners(face)]
    }

    pub fn positions(&self) -> &[Vector3<f32>] {
        self.attributes
            .lookup_typed(POSITION_ATTRIBUTE)
            .unwrap_or_default()
    }

    pub fn positions_for_write(&mut self) -> &mut [Vector3<f32>] {
        let verts_num = self.verts_num;
        self.attributes
            .lookup_or_add_for_write_only_span(
                POSITION_ATTRIBUTE,
                AttrDomain::Point,
                AttrType::Float3,
                verts_num,
            )
            .typed_mut()
            .unwrap_or_default()
    }

    /// Append an edge, returning its index.
    pub fn add_edge(&mut self, v1: usize, v2: usize) -> usize {
        debug_assert!(v1 < self.verts_num && v2 < self.verts_num);
        self.edges.push([v1, v2]);
        self.attributes.resize_domain(AttrDomain::Edge, self.edges.len());
        self.edges.len() - 1
    }

    /// Append a face through the given vertices, returning its index.
    pub fn add_face(&mut self, verts: &[usize]) -> usize {
        debug_assert!(verts.iter().all(|&v| v < self.verts_num));
        self.corner_verts.extend_from_slice(verts);
        self.face_offsets.push(self.corner_verts.len());
        self.attributes.resize_domain(AttrDomain::Face, self.faces_num());
        self.attributes.resize_domain(AttrDomain::Corner, self.corners_num());
        self.faces_num() - 1
    }

    pub fn transform(&mut self, matrix: &Matrix4<f32>) {
        transform_points(matrix, self.positions_for_write());
    }

    /// The face each corner belongs to.
    fn corner_faces(&self) -> Vec<usize> {
        (0..self.faces_num())
            .flat_map(|face| self.face_corners(face).map(move |_| face))
            .collect()
    }
}

impl AttributeOwner for Mesh {
    fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    fn attributes_for_write(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }

    fn attribute_domain_size(&self, domain: AttrDomain) -> usize {
        match domain {
            AttrDomain::Point => self.verts_num,
            AttrDomain::Edge => self.edges_num(),
            AttrDomain::Face => self.faces_num(),
            AttrDomain::Corner => self.corners_num(),
            _ => 0,
        }
    }

    fn domain_gather_indices(&self, from: AttrDomain, to: AttrDomain) -> Option<Vec<usize>> {
        match (from, to) {
            (AttrDomain::Point, AttrDomain::Corner) => Some(self.corner_verts.clone()),
            (AttrDomain::Face, AttrDomain::Corner) => Some(self.corner_faces()),
            (AttrDomain::Point, AttrDomain::Edge) => Some(self.edges.iter().map(|e| e[0]).collect()),
            _ => None,
        }
    }
}
