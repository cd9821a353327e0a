//! Point sets are passed as `x, y, z` triplets of `f32`, the transform as 16 row-major
//! `f32`. On success the moving buffer is rewritten with the aligned points.

use scanner_3d::pointset::PointSet;

use crate::{
    global_register, iterative_closest_point, AlignmentResult, GlobalParams, IcpParams,
    RegistrationError, RegistrationStatus,
};

fn write_outputs(
    result: &AlignmentResult,
    moving: &mut [f32],
    out_transform: &mut [f32; 16],
    out_score: &mut f32,
) {
    *out_transform = result.transform.to_row_major();
    *out_score = result.fitness_score;
    for chunk in moving.chunks_exact_mut(3) {
        let p = result.transform.transform_point(&[chunk[0], chunk[1], chunk[2]]);
        chunk.copy_from_slice(&p);
    }
}

fn parse_buffers(
    reference: &[f32],
    moving: &[f32],
) -> Result<(PointSet, PointSet), RegistrationError> {
    Ok((PointSet::from_flat(reference)?, PointSet::from_flat(moving)?))
}

fn run_flat<F>(
    reference: &[f32],
    moving: &mut [f32],
    out_transform: &mut [f32; 16],
    out_score: &mut f32,
    register: F,
) -> i32
where
    F: FnOnce(&PointSet, &PointSet) -> Result<AlignmentResult, RegistrationError>,
{
    let result = parse_buffers(reference, moving).and_then(|(r, m)| register(&r, &m));

    let status = match result {
        Ok(result) => {
            write_outputs(&result, moving, out_transform, out_score);
            if result.converged {
                RegistrationStatus::Success
            } else {
                RegistrationStatus::MaxIterationsReached
            }
        }
        Err(err) => {
            log::debug!("flat registration failed: {}", err);
            err.status()
        }
    };

    status.into()
}

/// Iterative closest point on flat buffers with default [`IcpParams`].
///
/// Returns a [`RegistrationStatus`] code. On [`RegistrationStatus::Success`] and
/// [`RegistrationStatus::MaxIterationsReached`] the transform, the fitness score and the
/// moved points are written; on any other status the outputs are left untouched.
pub fn iterative_closest_point_flat(
    reference: &[f32],
    moving: &mut [f32],
    out_transform: &mut [f32; 16],
    out_score: &mut f32,
) -> i32 {
    run_flat(reference, moving, out_transform, out_score, |r, m| {
        iterative_closest_point(r, m, &IcpParams::default())
    })
}

/// Global 4-point congruent set registration on flat buffers with default [`GlobalParams`].
///
/// Returns a [`RegistrationStatus`] code; outputs are written only on success.
pub fn global_register_flat(
    reference: &[f32],
    moving: &mut [f32],
    out_transform: &mut [f32; 16],
    out_score: &mut f32,
) -> i32 {
    run_flat(reference, moving, out_transform, out_score, |r, m| {
        global_register(r, m, &GlobalParams::default(), None)
    })
}
