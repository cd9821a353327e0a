use crate::pointset::PointSet;

/// A signed distance field: negative inside the surface, positive outside.
///
/// Any closure `Fn([f32; 3]) -> f32` is a field, so a learned model can be plugged in
/// by wrapping its inference call.
pub trait SignedDistanceField {
    /// Evaluate the field at a point.
    fn predict(&self, xyz: [f32; 3]) -> f32;
}

impl<F> SignedDistanceField for F
where
    F: Fn([f32; 3]) -> f32,
{
    fn predict(&self, xyz: [f32; 3]) -> f32 {
        self(xyz)
    }
}

/// Analytic sphere field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereSdf {
    /// Sphere center.
    pub center: [f32; 3],
    /// Sphere radius.
    pub radius: f32,
}

impl SignedDistanceField for SphereSdf {
    fn predict(&self, xyz: [f32; 3]) -> f32 {
        crate::ops::euclidean_distance(&xyz, &self.center) - self.radius
    }
}

/// Sample the zero level set of a field on a regular grid.
///
/// The box `[min, max]` is split into `resolution` cells per axis and every grid node
/// whose absolute field value is at most `band` is kept. A `resolution` of zero
/// yields an empty set.
///
/// Example:
///
/// ```
/// use scanner_3d::sdf::{sample_surface, SphereSdf};
///
/// let sphere = SphereSdf { center: [0.0; 3], radius: 1.0 };
/// let surface = sample_surface(&sphere, [-1.5; 3], [1.5; 3], 30, 0.05);
/// assert!(!surface.is_empty());
/// ```
pub fn sample_surface<S: SignedDistanceField + ?Sized>(
    sdf: &S,
    min: [f32; 3],
    max: [f32; 3],
    resolution: usize,
    band: f32,
) -> PointSet {
    if resolution == 0 {
        return PointSet::default();
    }

    let step = [
        (max[0] - min[0]) / resolution as f32,
        (max[1] - min[1]) / resolution as f32,
        (max[2] - min[2]) / resolution as f32,
    ];

    let mut points = Vec::new();
    for k in 0..=resolution {
        let z = min[2] + k as f32 * step[2];
        for j in 0..=resolution {
            let y = min[1] + j as f32 * step[1];
            for i in 0..=resolution {
                let p = [min[0] + i as f32 * step[0], y, z];
                if sdf.predict(p).abs() <= band {
                    points.push(p);
                }
            }
        }
    }

    log::debug!(
        "sampled {} surface points on a {}^3 grid",
        points.len(),
        resolution + 1
    );

    PointSet::new(points)
}
