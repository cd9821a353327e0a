/// Utility function to compute the squared Euclidean distance between two points.
#[inline]
pub fn squared_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Utility function to compute the Euclidean distance between two points.
///
/// Example:
/// ```
/// use scanner_3d::ops::euclidean_distance;
///
/// let a = [1.0, 2.0, 3.0];
/// let b = [4.0, 6.0, 3.0];
/// assert_eq!(euclidean_distance(&a, &b), 5.0);
/// ```
#[inline]
pub fn euclidean_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    squared_distance(a, b).sqrt()
}

/// Compute the centroid of a set of points in double precision.
///
/// Returns the origin for an empty slice.
pub fn centroid(points: &[[f32; 3]]) -> [f64; 3] {
    if points.is_empty() {
        return [0.0; 3];
    }
    let mut acc = [0.0f64; 3];
    for p in points {
        acc[0] += p[0] as f64;
        acc[1] += p[1] as f64;
        acc[2] += p[2] as f64;
    }
    let n = points.len() as f64;
    [acc[0] / n, acc[1] / n, acc[2] / n]
}

/// Length of the diagonal of the axis-aligned bounding box of the points.
///
/// Cheap upper bound of the set diameter; zero for fewer than two points.
pub fn bounding_box_diagonal(points: &[[f32; 3]]) -> f32 {
    let Some(first) = points.first() else {
        return 0.0;
    };
    let (min, max) = points.iter().fold((*first, *first), |(lo, hi), p| {
        (
            [lo[0].min(p[0]), lo[1].min(p[1]), lo[2].min(p[2])],
            [hi[0].max(p[0]), hi[1].max(p[1]), hi[2].max(p[2])],
        )
    });
    euclidean_distance(&min, &max)
}

/// Keep the first point falling in each cubic voxel of side `leaf_size`.
///
/// Kept points are original points, in input order. A non-positive `leaf_size`
/// keeps every point.
pub fn voxel_downsample(points: &[[f32; 3]], leaf_size: f32) -> Vec<[f32; 3]> {
    if leaf_size <= 0.0 {
        return points.to_vec();
    }
    let mut occupied = std::collections::HashSet::with_capacity(points.len());
    points
        .iter()
        .filter(|p| {
            let voxel_index = [
                (p[0] / leaf_size).floor() as i64,
                (p[1] / leaf_size).floor() as i64,
                (p[2] / leaf_size).floor() as i64,
            ];
            occupied.insert(voxel_index)
        })
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distances() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 4.0, 5.0];
        assert_eq!(squared_distance(&a, &b), 9.0);
        assert_eq!(euclidean_distance(&a, &b), 3.0);
    }

    #[test]
    fn test_centroid() {
        let points = vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let c = centroid(&points);
        assert_relative_eq!(c[0], 2.5);
        assert_relative_eq!(c[1], 3.5);
        assert_relative_eq!(c[2], 4.5);
        assert_eq!(centroid(&[]), [0.0; 3]);
    }

    #[test]
    fn test_bounding_box_diagonal() {
        let points = vec![[0.0, 0.0, 0.0], [1.0, 2.0, 2.0], [0.5, 0.5, 0.5]];
        assert_relative_eq!(bounding_box_diagonal(&points), 3.0);
        assert_eq!(bounding_box_diagonal(&[]), 0.0);
    }

    #[test]
    fn test_voxel_downsample() {
        let points = vec![
            [0.01, 0.01, 0.01],
            [0.05, 0.02, 0.09],
            [1.0, 1.0, 1.0],
            [-0.01, 0.0, 0.0],
        ];
        let kept = voxel_downsample(&points, 0.1);
        assert_eq!(kept, vec![[0.01, 0.01, 0.01], [1.0, 1.0, 1.0], [-0.01, 0.0, 0.0]]);
        assert_eq!(voxel_downsample(&points, 0.0), points);
    }
}
