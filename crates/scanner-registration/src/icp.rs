use scanner_3d::{linalg::fit_rigid_transform, pointset::PointSet, transforms::RigidTransform};
use serde::{Deserialize, Serialize};

use crate::{
    ops::{build_kdtree, evaluate, find_correspondences, RejectionPolicy},
    RegistrationError,
};

/// Result of a registration.
///
/// The transform maps the moving set onto the reference set.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentResult {
    /// Estimated moving to reference transform.
    pub transform: RigidTransform,
    /// Fraction of moving points lying near a reference point after alignment, in `[0, 1]`.
    pub fitness_score: f32,
    /// Whether the method met its convergence criterion.
    ///
    /// Always `true` for global registration, which reports a failed search as
    /// [`RegistrationError::NoConvergentAlignment`] instead.
    pub converged: bool,
    /// Number of ICP iterations, or of global bases matched against the reference.
    ///
    /// Draws that yield no valid base are not counted.
    pub num_iterations: usize,
    /// Root mean squared correspondence distance of the last evaluation.
    pub rmse: f64,
}

/// Parameters of the iterative closest point algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpParams {
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Convergence tolerance as the change in mean squared error between two iterations.
    pub tolerance: f64,
    /// Distance under which a moving point counts as an inlier for the fitness score.
    pub inlier_distance: f32,
    /// Reject correspondences beyond median + 3 sigma of the squared distances.
    pub reject_outliers: bool,
    /// Ignore correspondences farther apart than this distance.
    pub max_correspondence_distance: Option<f32>,
    /// Starting estimate of the moving to reference transform.
    pub initial_guess: Option<RigidTransform>,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-9,
            inlier_distance: 0.01,
            reject_outliers: true,
            max_correspondence_distance: None,
            initial_guess: None,
        }
    }
}

/// Progress of an ICP run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcpState {
    /// Inputs are validated and the search structure is built.
    Initializing,
    /// Alternating correspondence search and rigid fit.
    Iterating,
    /// The error change fell below the tolerance.
    Converged,
    /// The iteration limit was hit first.
    MaxIterationsReached,
    /// The correspondences stopped determining a rotation.
    Degenerate,
}

pub(crate) fn check_len(
    name: &'static str,
    points: &PointSet,
    required: usize,
) -> Result<(), RegistrationError> {
    if points.len() < required {
        return Err(RegistrationError::InvalidInput {
            name,
            required,
            actual: points.len(),
        });
    }
    Ok(())
}

/// Iterative Closest Point (ICP) algorithm using point to point distance.
///
/// Each iteration transforms the moving set with the current estimate, pairs every
/// point with its nearest reference point, optionally rejects outlier pairs and solves
/// the incremental rigid motion in closed form.
///
/// # Arguments
///
/// * `reference` - Fixed point set.
/// * `moving` - Point set to align onto `reference`.
/// * `params` - Iteration limits, tolerances and the optional initial guess.
///
/// # Returns
///
/// The moving to reference transform. Hitting `max_iterations` is not an error: the
/// last estimate is returned with `converged == false`.
///
/// # Errors
///
/// * [`RegistrationError::InvalidInput`] if either set is empty.
/// * [`RegistrationError::DegenerateConfiguration`] if the correspondences are rank
///   deficient or fewer than three survive rejection.
pub fn iterative_closest_point(
    reference: &PointSet,
    moving: &PointSet,
    params: &IcpParams,
) -> Result<AlignmentResult, RegistrationError> {
    let mut state = IcpState::Initializing;
    check_len("reference", reference, 1)?;
    check_len("moving", moving, 1)?;

    let policy = RejectionPolicy {
        mad: params.reject_outliers,
        max_sq_distance: params.max_correspondence_distance.map(|d| d * d),
    };

    // build kdtree for reference points to speed up the nearest neighbor search
    let kdtree = build_kdtree(reference.points());

    let mut transform = params.initial_guess.unwrap_or_default();
    let mut current = vec![[0.0; 3]; moving.len()];
    let mut prev_mse = f64::INFINITY;
    let mut mse = f64::INFINITY;
    let mut num_iterations = 0;

    log::debug!("ICP state: {:?}", state);

    for i in 0..params.max_iterations {
        state = IcpState::Iterating;
        let now = std::time::Instant::now();

        // apply the full estimate to the input points
        for (dst, src) in current.iter_mut().zip(moving.points()) {
            *dst = transform.transform_point(src);
        }

        let corr = find_correspondences(&current, reference.points(), &kdtree, policy);
        mse = corr.mse();
        num_iterations = i + 1;

        log::debug!(
            "Iteration: {} correspondences: {} mse: {:e}",
            i,
            corr.len(),
            mse
        );

        if (prev_mse - mse).abs() < params.tolerance || mse == 0.0 {
            state = IcpState::Converged;
            break;
        }

        let fit = match fit_rigid_transform(&corr.moving, &corr.reference) {
            Ok(fit) => fit,
            Err(err) => {
                state = IcpState::Degenerate;
                log::debug!("ICP state: {:?} ({})", state, err);
                return Err(err.into());
            }
        };

        // T_new = T_delta * T_old
        transform = fit.to_transform().compose(&transform).orthonormalized();
        prev_mse = mse;

        log::debug!("elapsed: {:?}", now.elapsed());
    }

    if state != IcpState::Converged {
        state = IcpState::MaxIterationsReached;
        log::warn!(
            "ICP did not converge after {} iterations (mse {:e})",
            num_iterations,
            mse
        );
    }

    let evaluation = evaluate(moving.points(), &transform, &kdtree, params.inlier_distance);

    log::info!(
        "ICP {:?} after {} iterations: fitness {:.4} rmse {:e}",
        state,
        num_iterations,
        evaluation.fitness,
        mse.sqrt()
    );

    Ok(AlignmentResult {
        transform,
        fitness_score: evaluation.fitness,
        converged: state == IcpState::Converged,
        num_iterations,
        rmse: mse.sqrt(),
    })
}

/// Run [`iterative_closest_point`] and move `moving` onto the reference on success.
pub fn iterative_closest_point_in_place(
    reference: &PointSet,
    moving: &mut PointSet,
    params: &IcpParams,
) -> Result<AlignmentResult, RegistrationError> {
    let result = iterative_closest_point(reference, moving, params)?;
    result.transform.transform_points_in_place(moving.points_mut());
    Ok(result)
}
