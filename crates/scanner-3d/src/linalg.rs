use glam::{DMat3, DVec3};

use crate::{ops, transforms::RigidTransform};

/// Ratio between the second and the first singular value of the cross-covariance
/// under which the correspondences no longer pin down a unique rotation.
const RANK_TOLERANCE: f64 = 1e-5;

/// Error types for the linear algebra module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LinalgError {
    /// Input slices do not have the same length.
    #[error("Mismatched array lengths: source ({src}) != destination ({dst})")]
    MismatchedLengths {
        /// Length of the source slice.
        src: usize,
        /// Length of the destination slice.
        dst: usize,
    },

    /// Too few correspondences to estimate a rotation.
    #[error("Rigid fit requires at least 3 correspondences, got {0}")]
    InsufficientCorrespondences(usize),

    /// The cross-covariance has rank lower than two.
    #[error("Degenerate correspondences, singular values {0:?}")]
    RankDeficient([f64; 3]),
}

/// Transform a set of points using a rigid transform.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `transform` - The rigid transform to apply.
/// * `dst_points` - A pre-allocated slice to store the transformed points.
///
/// PRECONDITION: dst_points has the same length as src_points.
///
/// Example:
///
/// ```
/// use scanner_3d::linalg::transform_points;
/// use scanner_3d::transforms::RigidTransform;
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points(&src_points, &RigidTransform::IDENTITY, &mut dst_points).unwrap();
/// assert_eq!(src_points, dst_points);
/// ```
pub fn transform_points(
    src_points: &[[f32; 3]],
    transform: &RigidTransform,
    dst_points: &mut [[f32; 3]],
) -> Result<(), LinalgError> {
    if src_points.len() != dst_points.len() {
        return Err(LinalgError::MismatchedLengths {
            src: src_points.len(),
            dst: dst_points.len(),
        });
    }

    for (dst, src) in dst_points.iter_mut().zip(src_points.iter()) {
        *dst = transform.transform_point(src);
    }

    Ok(())
}

/// Output of the closed-form rigid fit.
#[derive(Debug, Clone)]
pub struct RigidFit {
    /// Rotation mapping source points onto destination points.
    pub rotation: DMat3,
    /// Translation applied after the rotation.
    pub translation: DVec3,
    /// Singular values of the cross-covariance in non-increasing order.
    pub singular_values: [f64; 3],
}

impl RigidFit {
    /// Convert the fit into a single precision rigid transform.
    pub fn to_transform(&self) -> RigidTransform {
        RigidTransform::from_rotation_translation(
            self.rotation.as_mat3(),
            self.translation.as_vec3(),
        )
    }
}

fn dmat3_from_faer(m: faer::MatRef<'_, f64>) -> DMat3 {
    DMat3::from_cols_array_2d(&[
        [m.read(0, 0), m.read(1, 0), m.read(2, 0)],
        [m.read(0, 1), m.read(1, 1), m.read(2, 1)],
        [m.read(0, 2), m.read(1, 2), m.read(2, 2)],
    ])
}

/// Compute the optimal rigid transformation between two sets of corresponding points.
///
/// Kabsch/Umeyama without scale. The cross-covariance is accumulated in double
/// precision and decomposed with faer's SVD.
///
/// The algorithm:
/// 1. Compute centroids of both point sets
/// 2. Compute the cross-covariance H = 1/n Σ[(p_src - p_src_mean) * (p_dst - p_dst_mean)^T]
/// 3. Compute the SVD of H = U * S * V^T
/// 4. Calculate rotation matrix R = V * diag(1, 1, d) * U^T with d = sign(det(V * U^T))
/// 5. Calculate translation vector t = p_dst_mean - R * p_src_mean
///
/// For more details, see: Arun, K., Huang, T. S., and Blostein, S. D.
/// "Least-squares fitting of two 3-D point sets." IEEE PAMI, 1987.
///
/// # Errors
///
/// Fails when the slices differ in length, hold fewer than 3 points, or when the
/// cross-covariance has rank lower than two (all correspondences equal or collinear).
pub fn fit_rigid_transform(
    points_src: &[[f32; 3]],
    points_dst: &[[f32; 3]],
) -> Result<RigidFit, LinalgError> {
    if points_src.len() != points_dst.len() {
        return Err(LinalgError::MismatchedLengths {
            src: points_src.len(),
            dst: points_dst.len(),
        });
    }
    if points_src.len() < 3 {
        return Err(LinalgError::InsufficientCorrespondences(points_src.len()));
    }

    let mu_s = DVec3::from_array(ops::centroid(points_src));
    let mu_d = DVec3::from_array(ops::centroid(points_dst));

    // H[row][col] += src[row] * dst[col]
    let mut h = [[0.0f64; 3]; 3];
    for (s, d) in points_src.iter().zip(points_dst.iter()) {
        let sc = DVec3::new(s[0] as f64, s[1] as f64, s[2] as f64) - mu_s;
        let dc = DVec3::new(d[0] as f64, d[1] as f64, d[2] as f64) - mu_d;
        for (r, &sc_r) in sc.to_array().iter().enumerate() {
            for (c, &dc_c) in dc.to_array().iter().enumerate() {
                h[r][c] += sc_r * dc_c;
            }
        }
    }
    let n = points_src.len() as f64;
    for row in &mut h {
        for val in row {
            *val /= n;
        }
    }

    let h_mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| h[i][j]);
    let svd = h_mat.svd();
    let s = svd.s_diagonal();
    let singular_values = [s.read(0), s.read(1), s.read(2)];

    if singular_values[0] <= f64::EPSILON
        || singular_values[1] <= singular_values[0] * RANK_TOLERANCE
    {
        return Err(LinalgError::RankDeficient(singular_values));
    }

    let u = dmat3_from_faer(svd.u());
    let v = dmat3_from_faer(svd.v());

    // handle the reflection case to ensure a proper rotation
    let d = (v * u.transpose()).determinant();
    let rotation = if d < 0.0 {
        let correction = DMat3::from_diagonal(DVec3::new(1.0, 1.0, -1.0));
        v * correction * u.transpose()
    } else {
        v * u.transpose()
    };

    let translation = mu_d - rotation * mu_s;

    Ok(RigidFit {
        rotation,
        translation,
        singular_values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::axis_angle_to_rotation_matrix;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};

    fn create_random_points(num_points: usize, seed: u64) -> Vec<[f32; 3]> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        (0..num_points)
            .map(|_| [rng.random::<f32>(), rng.random::<f32>(), rng.random::<f32>()])
            .collect()
    }

    #[test]
    fn test_transform_points_identity() -> Result<(), LinalgError> {
        let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
        let mut dst_points = vec![[0.0; 3]; src_points.len()];
        transform_points(&src_points, &RigidTransform::IDENTITY, &mut dst_points)?;
        assert_eq!(dst_points, src_points);
        Ok(())
    }

    #[test]
    fn test_transform_points_mismatch() {
        let src_points = vec![[2.0, 2.0, 2.0]];
        let mut dst_points = vec![[0.0; 3]; 2];
        let res = transform_points(&src_points, &RigidTransform::IDENTITY, &mut dst_points);
        assert_eq!(res, Err(LinalgError::MismatchedLengths { src: 1, dst: 2 }));
    }

    #[test]
    fn test_fit_identity() -> Result<(), LinalgError> {
        let points = create_random_points(30, 7);
        let fit = fit_rigid_transform(&points, &points)?;
        assert!(fit.rotation.abs_diff_eq(DMat3::IDENTITY, 1e-9));
        assert!(fit.translation.abs_diff_eq(DVec3::ZERO, 1e-9));
        Ok(())
    }

    #[test]
    fn test_fit_pure_rotation() -> Result<(), Box<dyn std::error::Error>> {
        // rotate 90 degrees around x: y -> z, z -> -y
        let points_src = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let rotation = axis_angle_to_rotation_matrix(&[1.0, 0.0, 0.0], std::f32::consts::FRAC_PI_2)?;
        let expected = RigidTransform::new(rotation, [0.0, 0.0, 0.0]);
        let mut points_dst = vec![[0.0; 3]; points_src.len()];
        transform_points(&points_src, &expected, &mut points_dst)?;

        let fit = fit_rigid_transform(&points_src, &points_dst)?;
        assert!(fit.to_transform().approx_eq(&expected, 1e-5));
        Ok(())
    }

    #[test]
    fn test_fit_random() -> Result<(), Box<dyn std::error::Error>> {
        let points_src = create_random_points(50, 42);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);

        for _ in 0..10 {
            let axis = [
                rng.random::<f32>() - 0.5,
                rng.random::<f32>() - 0.5,
                rng.random::<f32>() - 0.5,
            ];
            let angle = rng.random::<f32>() * std::f32::consts::PI;
            let translation = [
                rng.random::<f32>() * 2.0,
                rng.random::<f32>() * 2.0,
                rng.random::<f32>() * 2.0,
            ];
            let expected = RigidTransform::new(axis_angle_to_rotation_matrix(&axis, angle)?, translation);

            let mut points_dst = vec![[0.0; 3]; points_src.len()];
            transform_points(&points_src, &expected, &mut points_dst)?;

            let fit = fit_rigid_transform(&points_src, &points_dst)?;
            let estimated = fit.to_transform();
            assert!(estimated.is_rigid(1e-4));

            let mut points_fit = vec![[0.0; 3]; points_src.len()];
            transform_points(&points_src, &estimated, &mut points_fit)?;
            for (res, exp) in points_fit.iter().zip(points_dst.iter()) {
                for (r, e) in res.iter().zip(exp.iter()) {
                    assert_relative_eq!(r, e, epsilon = 1e-4);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_fit_planar_no_reflection() -> Result<(), Box<dyn std::error::Error>> {
        let points_src = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.5, 1.5, 0.0],
        ];
        let expected = RigidTransform::new(
            axis_angle_to_rotation_matrix(&[0.2, 0.9, 0.1], 1.2)?,
            [0.3, -0.4, 2.0],
        );
        let mut points_dst = vec![[0.0; 3]; points_src.len()];
        transform_points(&points_src, &expected, &mut points_dst)?;

        let fit = fit_rigid_transform(&points_src, &points_dst)?;
        assert_relative_eq!(fit.rotation.determinant(), 1.0, epsilon = 1e-9);
        assert!(fit.to_transform().approx_eq(&expected, 1e-4));
        Ok(())
    }

    #[test]
    fn test_fit_all_equal_is_degenerate() {
        let points_src = create_random_points(10, 1);
        let points_dst = vec![[0.5, 0.5, 0.5]; 10];
        let res = fit_rigid_transform(&points_src, &points_dst);
        assert!(matches!(res, Err(LinalgError::RankDeficient(_))));
    }

    #[test]
    fn test_fit_collinear_is_degenerate() {
        let points_src = (0..10).map(|i| [i as f32, 0.0, 0.0]).collect::<Vec<_>>();
        let points_dst = (0..10).map(|i| [0.0, i as f32, 0.0]).collect::<Vec<_>>();
        let res = fit_rigid_transform(&points_src, &points_dst);
        assert!(matches!(res, Err(LinalgError::RankDeficient(_))));
    }

    #[test]
    fn test_fit_too_few_points() {
        let points = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let res = fit_rigid_transform(&points, &points);
        assert_eq!(res.unwrap_err(), LinalgError::InsufficientCorrespondences(2));
    }
}
