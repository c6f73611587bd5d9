use cgmath::{Matrix4, One, Point3, Quaternion, SquareMatrix, Transform, Vector3};

/// Represents the spatial data for an instance, in a form that's easier to author than a matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialTransform {
    pub scale: Vector3<f32>,
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
}

impl SpatialTransform {
    /// Get the identity transform (ie doesn't do anything).
    pub fn identity() -> Self {
        Self {
            scale: Vector3::new(1.0, 1.0, 1.0),
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
        }
    }

    /// Only a translation.
    pub fn from_position(position: Vector3<f32>) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    /// Get the affine matrix for this transform (translation * rotation * scale).
    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

/// Transform a position (w = 1) by an affine matrix.
pub fn transform_point(matrix: &Matrix4<f32>, position: Vector3<f32>) -> Vector3<f32> {
    let point = matrix.transform_point(Point3::new(position.x, position.y, position.z));
    Vector3::new(point.x, point.y, point.z)
}

/// Transform every position in place.
pub fn transform_points(matrix: &Matrix4<f32>, positions: &mut [Vector3<f32>]) {
    for position in positions {
        *position = transform_point(matrix, *position);
    }
}

/// `true` if applying the matrix would not change anything (within float noise).
pub fn is_identity(matrix: &Matrix4<f32>) -> bool {
    const EPSILON: f32 = 1e-6;
    let identity = Matrix4::<f32>::identity();
    (0..4).all(|col| (0..4).all(|row| (matrix[col][row] - identity[col][row]).abs() <= EPSILON))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Rotation3};

    #[test]
    fn identity_matrix_is_identity() {
        assert!(is_identity(&SpatialTransform::identity().to_matrix()));
    }

    #[test]
    fn matrix_applies_scale_then_rotation_then_translation() {
        let transform = SpatialTransform {
            scale: Vector3::new(2.0, 2.0, 2.0),
            position: Vector3::new(1.0, 0.0, 0.0),
            rotation: Quaternion::from_angle_z(Deg(90.0)),
        };
        let moved = transform_point(&transform.to_matrix(), Vector3::new(1.0, 0.0, 0.0));
        let expected = Vector3::new(1.0, 2.0, 0.0);
        assert!((moved - expected).x.abs() < 1e-5 && (moved - expected).y.abs() < 1e-5 && moved.z.abs() < 1e-5);
    }

    #[test]
    fn translation_moves_points() {
        let m = SpatialTransform::from_position(Vector3::new(0.0, 0.0, 3.0)).to_matrix();
        assert_eq!(
            transform_point(&m, Vector3::new(1.0, 1.0, 1.0)),
            Vector3::new(1.0, 1.0, 4.0)
        );
        assert!(!is_identity(&m));
    }
}
