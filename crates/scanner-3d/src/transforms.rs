use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Error types for the transforms module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransformError {
    /// The rotation axis has no direction.
    #[error("Cannot compute rotation matrix from a zero vector")]
    ZeroAxis,
}

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation. It does not need to be normalized.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The row-major rotation matrix.
///
/// Example:
///
/// ```
/// use scanner_3d::transforms::axis_angle_to_rotation_matrix;
///
/// let rotation = axis_angle_to_rotation_matrix(&[1.0, 0.0, 0.0], std::f32::consts::FRAC_PI_2).unwrap();
/// assert!((rotation[1][2] + 1.0).abs() < 1e-6);
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f32; 3],
    angle: f32,
) -> Result<[[f32; 3]; 3], TransformError> {
    let magnitude = (axis[0].powi(2) + axis[1].powi(2) + axis[2].powi(2)).sqrt();
    if magnitude < 1e-10 {
        return Err(TransformError::ZeroAxis);
    }

    let x = axis[0] / magnitude;
    let y = axis[1] / magnitude;
    let z = axis[2] / magnitude;

    let c = angle.cos();
    let s = angle.sin();
    let t = 1.0 - c;

    let m00 = c + x * x * t;
    let m11 = c + y * y * t;
    let m22 = c + z * z * t;

    let tmp1 = x * y * t;
    let tmp2 = z * s;
    let m10 = tmp1 + tmp2;
    let m01 = tmp1 - tmp2;

    let tmp3 = x * z * t;
    let tmp4 = y * s;
    let m20 = tmp3 - tmp4;
    let m02 = tmp3 + tmp4;

    let tmp5 = y * z * t;
    let tmp6 = x * s;
    let m12 = tmp5 - tmp6;
    let m21 = tmp5 + tmp6;

    Ok([[m00, m01, m02], [m10, m11, m12], [m20, m21, m22]])
}

/// A rigid transform stored as a 4x4 homogeneous matrix.
///
/// The matrix is row-major and occupies exactly 64 bytes (16 x `f32`), so it can be
/// exchanged with native callers as a flat buffer. The upper-left 3x3 block is a
/// rotation and the last column holds the translation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// Row-major homogeneous matrix.
    pub matrix: [[f32; 4]; 4],
}

const _: () = assert!(std::mem::size_of::<RigidTransform>() == 64);

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RigidTransform {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        matrix: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Create a transform from a row-major rotation matrix and a translation vector.
    pub fn new(rotation: [[f32; 3]; 3], translation: [f32; 3]) -> Self {
        let r = rotation;
        let t = translation;
        Self {
            matrix: [
                [r[0][0], r[0][1], r[0][2], t[0]],
                [r[1][0], r[1][1], r[1][2], t[1]],
                [r[2][0], r[2][1], r[2][2], t[2]],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Create a transform from a glam rotation matrix and translation vector.
    pub fn from_rotation_translation(rotation: Mat3, translation: Vec3) -> Self {
        let rows = rotation.transpose().to_cols_array_2d();
        Self::new(rows, translation.to_array())
    }

    /// Create a transform from 16 row-major floats.
    pub fn from_row_major(data: &[f32; 16]) -> Self {
        let mut matrix = [[0.0; 4]; 4];
        for (row, chunk) in matrix.iter_mut().zip(data.chunks_exact(4)) {
            row.copy_from_slice(chunk);
        }
        Self { matrix }
    }

    /// Flatten the transform into 16 row-major floats.
    pub fn to_row_major(&self) -> [f32; 16] {
        let mut out = [0.0; 16];
        for (chunk, row) in out.chunks_exact_mut(4).zip(self.matrix.iter()) {
            chunk.copy_from_slice(row);
        }
        out
    }

    /// The rotation block as a glam matrix.
    pub fn rotation(&self) -> Mat3 {
        let m = &self.matrix;
        Mat3::from_cols_array_2d(&[
            [m[0][0], m[1][0], m[2][0]],
            [m[0][1], m[1][1], m[2][1]],
            [m[0][2], m[1][2], m[2][2]],
        ])
    }

    /// The translation column as a glam vector.
    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.matrix[0][3], self.matrix[1][3], self.matrix[2][3])
    }

    /// The transform as a glam (column-major) matrix.
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.matrix).transpose()
    }

    /// Build a transform from a glam matrix. The bottom row is reset to `[0, 0, 0, 1]`.
    pub fn from_mat4(mat: &Mat4) -> Self {
        let mut matrix = mat.transpose().to_cols_array_2d();
        matrix[3] = [0.0, 0.0, 0.0, 1.0];
        Self { matrix }
    }

    /// Apply the transform to a single point.
    #[inline]
    pub fn transform_point(&self, point: &[f32; 3]) -> [f32; 3] {
        let m = &self.matrix;
        let [x, y, z] = *point;
        [
            m[0][0] * x + m[0][1] * y + m[0][2] * z + m[0][3],
            m[1][0] * x + m[1][1] * y + m[1][2] * z + m[1][3],
            m[2][0] * x + m[2][1] * y + m[2][2] * z + m[2][3],
        ]
    }

    /// Apply the transform to every point of a slice, returning new points.
    pub fn transform_points(&self, points: &[[f32; 3]]) -> Vec<[f32; 3]> {
        points.iter().map(|p| self.transform_point(p)).collect()
    }

    /// Apply the transform to every point of a slice, in place.
    pub fn transform_points_in_place(&self, points: &mut [[f32; 3]]) {
        for p in points.iter_mut() {
            *p = self.transform_point(p);
        }
    }

    /// Compose two transforms: the result applies `other` first and then `self`.
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        Self::from_mat4(&(self.to_mat4() * other.to_mat4()))
    }

    /// Inverse of the rigid transform: `[R^T | -R^T t]`.
    pub fn inverse(&self) -> RigidTransform {
        let r_inv = self.rotation().transpose();
        let t_inv = -(r_inv * self.translation());
        Self::from_rotation_translation(r_inv, t_inv)
    }

    /// Project the rotation block back onto SO(3).
    ///
    /// Repeated composition in single precision slowly drifts away from an
    /// orthonormal matrix; this snaps it back through a unit quaternion.
    pub fn orthonormalized(&self) -> RigidTransform {
        let q = Quat::from_mat3(&self.rotation()).normalize();
        Self::from_rotation_translation(Mat3::from_quat(q), self.translation())
    }

    /// Check that the rotation block is orthonormal with determinant +1 and the
    /// bottom row is `[0, 0, 0, 1]`.
    pub fn is_rigid(&self, tolerance: f32) -> bool {
        let r = self.rotation();
        let should_be_identity = r.transpose() * r;
        let bottom_ok = self.matrix[3]
            .iter()
            .zip([0.0, 0.0, 0.0, 1.0])
            .all(|(a, b)| (a - b).abs() <= tolerance);
        bottom_ok
            && should_be_identity.abs_diff_eq(Mat3::IDENTITY, tolerance)
            && (r.determinant() - 1.0).abs() <= tolerance
    }

    /// Element-wise comparison of two transforms.
    pub fn approx_eq(&self, other: &RigidTransform, tolerance: f32) -> bool {
        self.matrix
            .iter()
            .flatten()
            .zip(other.matrix.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    /// Rotation angle of the transform in radians, in `[0, pi]`.
    pub fn rotation_angle(&self) -> f32 {
        let r = self.rotation();
        let cos = ((r.x_axis.x + r.y_axis.y + r.z_axis.z - 1.0) * 0.5).clamp(-1.0, 1.0);
        cos.acos()
    }
}
