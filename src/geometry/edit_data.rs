use cgmath::Matrix4;

/// Data kept next to evaluated geometry so interactive tools can map edits back to the
/// original. Currently the transforms of named gizmos.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeometryEditData {
    gizmo_transforms: Vec<(String, Matrix4<f32>)>,
}

impl GeometryEditData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.gizmo_transforms.is_empty()
    }

    pub fn gizmo_transforms(&self) -> &[(String, Matrix4<f32>)] {
        &self.gizmo_transforms
    }

    pub fn gizmo(&self, name: &str) -> Option<&Matrix4<f32>> {
        self.gizmo_transforms
            .iter()
            .find(|(gizmo, _)| gizmo == name)
            .map(|(_, transform)| transform)
    }

    /// Set a gizmo transform, replacing any previous one with that name.
    pub fn set_gizmo(&mut self, name: impl Into<String>, transform: Matrix4<f32>) {
        let name = name.into();
        match self.gizmo_transforms.iter_mut().find(|(gizmo, _)| *gizmo == name) {
            Some((_, existing)) => *existing = transform,
            None => self.gizmo_transforms.push((name, transform)),
        }
    }

    /// Add the gizmos of `other` moved by `transform`. Gizmos already present win.
    pub fn merge_from(&mut self, other: &GeometryEditData, transform: &Matrix4<f32>) {
        for (name, gizmo) in &other.gizmo_transforms {
            if self.gizmo(name).is_none() {
                self.gizmo_transforms.push((name.clone(), *transform * *gizmo));
            }
        }
    }

    pub fn transform(&mut self, matrix: &Matrix4<f32>) {
        for (_, gizmo) in &mut self.gizmo_transforms {
            *gizmo = *matrix * *gizmo;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{SquareMatrix, Vector3};

    #[test]
    fn merge_keeps_existing_gizmos() {
        let mut a = GeometryEditData::new();
        a.set_gizmo("dial", Matrix4::identity());
        let mut b = GeometryEditData::new();
        b.set_gizmo("dial", Matrix4::from_scale(2.0));
        b.set_gizmo("arrow", Matrix4::identity());

        let offset = Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0));
        a.merge_from(&b, &offset);

        assert_eq!(a.gizmo("dial"), Some(&Matrix4::identity()));
        assert_eq!(a.gizmo("arrow"), Some(&offset));
    }
}
