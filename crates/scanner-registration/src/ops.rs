use kiddo::immutable::float::kdtree::ImmutableKdTree;
use scanner_3d::transforms::RigidTransform;

/// k-d tree over single precision 3D points.
pub(crate) type KdTree3 = ImmutableKdTree<f32, u32, 3, 32>;

/// Matched point pairs from a nearest neighbour search.
#[derive(Debug, Default)]
pub(crate) struct Correspondences {
    pub moving: Vec<[f32; 3]>,
    pub reference: Vec<[f32; 3]>,
    pub sq_distances: Vec<f32>,
}

impl Correspondences {
    pub fn len(&self) -> usize {
        self.moving.len()
    }

    /// Mean squared distance, accumulated in double precision.
    pub fn mse(&self) -> f64 {
        if self.sq_distances.is_empty() {
            return f64::INFINITY;
        }
        self.sq_distances.iter().map(|&d| d as f64).sum::<f64>() / self.sq_distances.len() as f64
    }
}

/// Options for [`find_correspondences`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct RejectionPolicy {
    /// Drop pairs beyond median + 3 sigma, with sigma estimated from the MAD.
    pub mad: bool,
    /// Hard bound on the squared distance of a pair.
    pub max_sq_distance: Option<f32>,
}

pub(crate) fn build_kdtree(points: &[[f32; 3]]) -> KdTree3 {
    ImmutableKdTree::new_from_slice(points)
}

/// Median of a set of values. The slice is reordered.
///
/// PRECONDITION: values is not empty.
fn median(values: &mut [f32]) -> f32 {
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

/// Pair every moving point with its nearest reference point and filter the pairs.
pub(crate) fn find_correspondences(
    moving: &[[f32; 3]],
    reference: &[[f32; 3]],
    kdtree: &KdTree3,
    policy: RejectionPolicy,
) -> Correspondences {
    if moving.is_empty() {
        return Correspondences::default();
    }

    let nn_results = moving
        .iter()
        .map(|p| kdtree.nearest_one::<kiddo::SquaredEuclidean>(p))
        .collect::<Vec<_>>();

    let mut threshold = policy.max_sq_distance.unwrap_or(f32::INFINITY);

    if policy.mad {
        let mut distances = nn_results.iter().map(|nn| nn.distance).collect::<Vec<_>>();
        let median_dist = median(&mut distances);
        let mut deviations = distances
            .iter()
            .map(|d| (d - median_dist).abs())
            .collect::<Vec<_>>();
        let sigma_d = 1.4826 * median(&mut deviations);
        threshold = threshold.min(median_dist + 3.0 * sigma_d);
    }

    let mut out = Correspondences::default();
    for (p, nn) in moving.iter().zip(nn_results.iter()) {
        if nn.distance <= threshold {
            out.moving.push(*p);
            out.reference.push(reference[nn.item as usize]);
            out.sq_distances.push(nn.distance);
        }
    }

    out
}

/// Quality of an alignment measured against a reference tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Evaluation {
    /// Fraction of points within the inlier distance.
    pub fitness: f32,
    /// Root mean squared distance of the inliers, zero if there are none.
    pub inlier_rmse: f64,
}

/// Transform the moving points and measure how many land near the reference.
pub(crate) fn evaluate(
    moving: &[[f32; 3]],
    transform: &RigidTransform,
    kdtree: &KdTree3,
    inlier_distance: f32,
) -> Evaluation {
    if moving.is_empty() {
        return Evaluation {
            fitness: 0.0,
            inlier_rmse: 0.0,
        };
    }

    let max_sq = inlier_distance * inlier_distance;
    let mut inliers = 0usize;
    let mut sum_sq = 0.0f64;
    for p in moving {
        let q = transform.transform_point(p);
        let nn = kdtree.nearest_one::<kiddo::SquaredEuclidean>(&q);
        if nn.distance <= max_sq {
            inliers += 1;
            sum_sq += nn.distance as f64;
        }
    }

    Evaluation {
        fitness: inliers as f32 / moving.len() as f32,
        inlier_rmse: if inliers > 0 {
            (sum_sq / inliers as f64).sqrt()
        } else {
            0.0
        },
    }
}

/// Largest common point set score with early abort.
///
/// Counts the transformed points within `max_sq_distance` of the reference and stops as
/// soon as the count can no longer exceed `to_beat`. Returns `None` in that case.
pub(crate) fn lcp_score(
    moving: &[[f32; 3]],
    transform: &RigidTransform,
    kdtree: &KdTree3,
    max_sq_distance: f32,
    to_beat: usize,
) -> Option<usize> {
    let n = moving.len();
    let mut count = 0usize;
    for (i, p) in moving.iter().enumerate() {
        let q = transform.transform_point(p);
        if kdtree.nearest_one::<kiddo::SquaredEuclidean>(&q).distance <= max_sq_distance {
            count += 1;
        }
        // remaining points cannot lift the count above the best
        if count + (n - i - 1) <= to_beat {
            return None;
        }
    }
    Some(count)
}
