use glam::Vec3;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use rand::{rngs::StdRng, Rng, SeedableRng};
use scanner_3d::{
    linalg::fit_rigid_transform,
    ops::{bounding_box_diagonal, voxel_downsample},
    pointset::PointSet,
    transforms::RigidTransform,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    icp::check_len,
    ops::{build_kdtree, evaluate, lcp_score, KdTree3},
    iterative_closest_point, AlignmentResult, IcpParams, RegistrationError,
};

// random triangles drawn per base
const TRIANGLE_TRIALS: usize = 100;

// max deviation of the cosine between the two diagonals of a congruent set
const MAX_COS_DEVIATION: f32 = 0.1;

// voxel side of the reference subsample, relative to delta
const REFERENCE_LEAF_RATIO: f32 = 0.5;

/// Parameters of the global 4-point congruent set registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalParams {
    /// Distance tolerance, in the units of the point sets, for matching and scoring.
    pub delta: f32,
    /// Expected overlap ratio in `(0, 1]`; scales the width of the sampled bases.
    pub overlap: f32,
    /// Number of moving points the bases are drawn from and candidates are scored on.
    ///
    /// The reference is not sampled at random: congruent sets are searched in a voxel
    /// subsample of side `delta / 2`, so every moving point keeps a counterpart.
    pub sample_size: usize,
    /// Maximum number of bases to try.
    pub max_bases: usize,
    /// Minimum fitness for the alignment to be accepted.
    pub min_fitness: f32,
    /// Stop as soon as a candidate reaches this fitness.
    pub terminate_fitness: f32,
    /// Seed of the sampling generator.
    pub seed: u64,
    /// Refine the coarse alignment with ICP.
    pub refine_with_icp: bool,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            delta: 0.01,
            overlap: 0.5,
            sample_size: 200,
            max_bases: 200,
            min_fitness: 0.3,
            terminate_fitness: 0.95,
            seed: 0,
            refine_with_icp: false,
        }
    }
}

/// Four nearly coplanar points of the moving set and their affine invariants.
///
/// The segments `points[0]-points[1]` and `points[2]-points[3]` are the diagonals.
#[derive(Debug, Clone, Copy)]
struct Base {
    points: [[f32; 3]; 4],
    /// Position of the diagonal intersection along the first diagonal.
    r1: f32,
    /// Position of the diagonal intersection along the second diagonal.
    r2: f32,
    /// Distance between the closest points of the two diagonals.
    gap: f32,
}

impl Base {
    fn diagonal_lengths(&self) -> (f32, f32) {
        let [a, b, c, d] = self.points.map(Vec3::from_array);
        (a.distance(b), c.distance(d))
    }

    fn diagonal_cos(&self) -> f32 {
        let [a, b, c, d] = self.points.map(Vec3::from_array);
        (b - a).normalize_or_zero().dot((d - c).normalize_or_zero())
    }
}

/// Parameters `(s, t)` of the closest points `p + s (q - p)` and `r + t (u - r)` of two
/// lines, or `None` if the lines are parallel.
fn closest_line_params(p: Vec3, q: Vec3, r: Vec3, u: Vec3) -> Option<(f32, f32)> {
    let d1 = q - p;
    let d2 = u - r;
    let w = p - r;
    let a = d1.dot(d1);
    let b = d1.dot(d2);
    let c = d2.dot(d2);
    let d = d1.dot(w);
    let e = d2.dot(w);
    let denom = a * c - b * b;
    if denom <= f32::EPSILON * a * c {
        return None;
    }
    Some(((b * e - c * d) / denom, (a * e - b * d) / denom))
}

/// Arrange four points so that the two diagonals cross, returning the base.
fn make_base(quad: [Vec3; 4]) -> Option<Base> {
    let [a, b, c, d] = quad;
    let pairings = [[a, b, c, d], [a, c, b, d], [a, d, b, c]];

    pairings
        .iter()
        .filter_map(|&[p, q, r, u]| {
            let (s, t) = closest_line_params(p, q, r, u)?;
            if !(0.0..=1.0).contains(&s) || !(0.0..=1.0).contains(&t) {
                return None;
            }
            let gap = (p + s * (q - p)).distance(r + t * (u - r));
            Some(Base {
                points: [p, q, r, u].map(|v| v.to_array()),
                r1: s,
                r2: t,
                gap,
            })
        })
        .min_by(|x, y| x.gap.total_cmp(&y.gap))
}

/// Draw a wide triangle and complete it with the most coplanar fourth point.
fn select_base(points: &[[f32; 3]], width: f32, rng: &mut StdRng) -> Option<Base> {
    let n = points.len();
    let pts = points.iter().map(|p| Vec3::from_array(*p)).collect::<Vec<_>>();

    // the widest triangle with all sides within the base width
    let mut best: Option<([usize; 3], f32)> = None;
    for _ in 0..TRIANGLE_TRIALS {
        let (i, j, k) = (
            rng.random_range(0..n),
            rng.random_range(0..n),
            rng.random_range(0..n),
        );
        if i == j || j == k || i == k {
            continue;
        }
        let (a, b, c) = (pts[i], pts[j], pts[k]);
        if a.distance(b) > width || a.distance(c) > width || b.distance(c) > width {
            continue;
        }
        let area = (b - a).cross(c - a).length() * 0.5;
        if best.map_or(true, |(_, best_area)| area > best_area) {
            best = Some(([i, j, k], area));
        }
    }
    let ([i, j, k], _) = best?;
    let (a, b, c) = (pts[i], pts[j], pts[k]);
    let normal = (b - a).cross(c - a).normalize_or_zero();
    if normal == Vec3::ZERO {
        return None;
    }

    // candidates sorted by distance to the triangle plane
    let min_separation = 0.1 * width;
    let mut candidates = (0..n)
        .filter(|&l| l != i && l != j && l != k)
        .filter(|&l| {
            [a, b, c].iter().all(|v| {
                let dist = v.distance(pts[l]);
                dist >= min_separation && dist <= width
            })
        })
        .map(|l| (l, normal.dot(pts[l] - a).abs()))
        .collect::<Vec<_>>();
    candidates.sort_by(|x, y| x.1.total_cmp(&y.1));

    candidates
        .iter()
        .filter_map(|&(l, _)| make_base([a, b, c, pts[l]]))
        .find(|base| base.gap <= 0.1 * width)
}

/// Ordered pairs of reference points `(i, j)` whose distance matches `length`.
fn extract_pairs(points: &[[f32; 3]], length: f32, delta: f32) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (i, p) in points.iter().enumerate() {
        for (j, q) in points.iter().enumerate().skip(i + 1) {
            let dist = scanner_3d::ops::euclidean_distance(p, q);
            if (dist - length).abs() <= delta {
                pairs.push((i, j));
                pairs.push((j, i));
            }
        }
    }
    pairs
}

#[inline]
fn lerp(points: &[[f32; 3]], (i, j): (usize, usize), r: f32) -> [f32; 3] {
    let (p, q) = (Vec3::from_array(points[i]), Vec3::from_array(points[j]));
    (p + r * (q - p)).to_array()
}

/// Find the 4-point sets of the reference congruent to the base.
fn find_congruent_sets(base: &Base, reference: &[[f32; 3]], delta: f32) -> Vec<[usize; 4]> {
    let (d1, d2) = base.diagonal_lengths();
    let pairs1 = extract_pairs(reference, d1, delta);
    let pairs2 = extract_pairs(reference, d2, delta);
    if pairs1.is_empty() || pairs2.is_empty() {
        return Vec::new();
    }

    let intermediates = pairs1
        .iter()
        .map(|&pair| lerp(reference, pair, base.r1))
        .collect::<Vec<_>>();
    let tree: KdTree3 = ImmutableKdTree::new_from_slice(&intermediates);

    let radius = base.gap + 2.0 * delta;
    let base_cos = base.diagonal_cos();
    let base_pts = base.points;
    let distance_tolerance = 3.0 * delta + base.gap;

    let mut sets = Vec::new();
    for &(k, l) in &pairs2 {
        let e2 = lerp(reference, (k, l), base.r2);
        for nn in tree.within_unsorted::<kiddo::SquaredEuclidean>(&e2, radius * radius) {
            let (i, j) = pairs1[nn.item as usize];
            if i == k || i == l || j == k || j == l {
                continue;
            }
            let candidate = [i, j, k, l];

            let pts = candidate.map(|idx| Vec3::from_array(reference[idx]));
            let cos = (pts[1] - pts[0])
                .normalize_or_zero()
                .dot((pts[3] - pts[2]).normalize_or_zero());
            if (cos - base_cos).abs() > MAX_COS_DEVIATION {
                continue;
            }

            let congruent = (0..4).all(|m| {
                (m + 1..4).all(|o| {
                    let base_dist =
                        Vec3::from_array(base_pts[m]).distance(Vec3::from_array(base_pts[o]));
                    (pts[m].distance(pts[o]) - base_dist).abs() <= distance_tolerance
                })
            });
            if congruent {
                sets.push(candidate);
            }
        }
    }
    sets
}

fn sample_points(points: &[[f32; 3]], size: usize, rng: &mut StdRng) -> Vec<[f32; 3]> {
    if points.len() <= size {
        return points.to_vec();
    }
    rand::seq::index::sample(rng, points.len(), size)
        .iter()
        .map(|i| points[i])
        .collect()
}

/// Global registration with 4-point congruent sets (4PCS).
///
/// Needs no initial alignment. Bases of four nearly coplanar points are drawn from a
/// random sample of the moving set; the affine invariants of each base select the
/// congruent 4-point sets of a voxel subsample of the reference, and every candidate
/// transform is scored by the fraction of sampled moving points it brings within `delta`
/// of the full reference.
///
/// The result is always `converged`, and `num_iterations` counts the bases that were
/// actually matched against the reference.
///
/// # Arguments
///
/// * `reference` - Fixed point set.
/// * `moving` - Point set to align onto `reference`.
/// * `params` - Sampling, tolerance and acceptance parameters.
/// * `cancel` - Optional token checked before every base.
///
/// # Errors
///
/// * [`RegistrationError::InvalidInput`] if a set holds fewer than four points.
/// * [`RegistrationError::Cancelled`] if the token is cancelled.
/// * [`RegistrationError::NoConvergentAlignment`] if no candidate reaches `min_fitness`.
pub fn global_register(
    reference: &PointSet,
    moving: &PointSet,
    params: &GlobalParams,
    cancel: Option<&CancellationToken>,
) -> Result<AlignmentResult, RegistrationError> {
    check_len("reference", reference, 4)?;
    check_len("moving", moving, 4)?;

    let mut rng = StdRng::seed_from_u64(params.seed);
    let moving_sample = sample_points(moving.points(), params.sample_size.max(4), &mut rng);
    let reference_sample =
        voxel_downsample(reference.points(), REFERENCE_LEAF_RATIO * params.delta);

    let kdtree = build_kdtree(reference.points());
    let width = params.overlap * bounding_box_diagonal(&moving_sample);
    let max_sq_distance = params.delta * params.delta;

    log::debug!(
        "4PCS: {} moving / {} reference samples, base width {:.4}",
        moving_sample.len(),
        reference_sample.len(),
        width
    );

    let mut best_transform = RigidTransform::IDENTITY;
    let mut best_count = 0usize;
    let mut num_bases = 0;
    let terminate_count = (params.terminate_fitness * moving_sample.len() as f32).ceil() as usize;

    for i in 0..params.max_bases {
        if cancel.is_some_and(|token| token.is_cancelled()) {
            log::info!("4PCS cancelled after {} bases", num_bases);
            return Err(RegistrationError::Cancelled);
        }
        let now = std::time::Instant::now();

        let Some(base) = select_base(&moving_sample, width, &mut rng) else {
            log::debug!("Base {}: no valid base", i);
            continue;
        };
        num_bases += 1;

        let sets = find_congruent_sets(&base, &reference_sample, params.delta);

        for set in &sets {
            let target = set.map(|idx| reference_sample[idx]);
            let Ok(fit) = fit_rigid_transform(&base.points, &target) else {
                continue;
            };
            let transform = fit.to_transform();
            if let Some(count) = lcp_score(
                &moving_sample,
                &transform,
                &kdtree,
                max_sq_distance,
                best_count,
            ) {
                best_count = count;
                best_transform = transform;
            }
        }

        log::debug!(
            "Base {}: {} congruent sets, best score {}/{}, elapsed: {:?}",
            i,
            sets.len(),
            best_count,
            moving_sample.len(),
            now.elapsed()
        );

        if best_count >= terminate_count {
            break;
        }
    }

    let mut evaluation = evaluate(moving.points(), &best_transform, &kdtree, params.delta);

    if best_count == 0 || evaluation.fitness < params.min_fitness {
        log::warn!(
            "4PCS found no alignment above {} (best {:.4}) after {} bases",
            params.min_fitness,
            evaluation.fitness,
            num_bases
        );
        return Err(RegistrationError::NoConvergentAlignment {
            best: if best_count == 0 { 0.0 } else { evaluation.fitness },
            threshold: params.min_fitness,
        });
    }

    if params.refine_with_icp {
        let icp_params = IcpParams {
            initial_guess: Some(best_transform),
            inlier_distance: params.delta,
            ..Default::default()
        };
        match iterative_closest_point(reference, moving, &icp_params) {
            Ok(refined) => {
                let refined_eval =
                    evaluate(moving.points(), &refined.transform, &kdtree, params.delta);
                if refined_eval.fitness >= evaluation.fitness {
                    best_transform = refined.transform;
                    evaluation = refined_eval;
                }
            }
            Err(err) => log::warn!("ICP refinement failed: {}", err),
        }
    }

    log::info!(
        "4PCS aligned after {} bases: fitness {:.4} rmse {:e}",
        num_bases,
        evaluation.fitness,
        evaluation.inlier_rmse
    );

    Ok(AlignmentResult {
        transform: best_transform,
        fitness_score: evaluation.fitness,
        converged: true,
        num_iterations: num_bases,
        rmse: evaluation.inlier_rmse,
    })
}

/// Run [`global_register`] and move `moving` onto the reference on success.
pub fn global_register_in_place(
    reference: &PointSet,
    moving: &mut PointSet,
    params: &GlobalParams,
    cancel: Option<&CancellationToken>,
) -> Result<AlignmentResult, RegistrationError> {
    let result = global_register(reference, moving, params, cancel)?;
    result.transform.transform_points_in_place(moving.points_mut());
    Ok(result)
}
