use rand::{rngs::StdRng, Rng, SeedableRng};
use scanner_3d::{
    pointset::PointSet,
    transforms::{axis_angle_to_rotation_matrix, RigidTransform},
};
use scanner_registration::{
    flat, global_register, global_register_in_place, iterative_closest_point,
    iterative_closest_point_in_place, GlobalParams, IcpParams, RegistrationError,
    RegistrationStatus,
};
use tokio_util::sync::CancellationToken;

// z = 0.3 sin(2x) + 0.2 x y sampled on a regular grid centered at the origin
fn create_surface(spacing: f32) -> PointSet {
    let n = (1.0 / spacing).round() as usize;
    let mut points = Vec::with_capacity((n + 1) * (n + 1));
    for i in 0..=n {
        for j in 0..=n {
            let x = -0.5 + i as f32 * spacing;
            let y = -0.5 + j as f32 * spacing;
            points.push([x, y, 0.3 * (2.0 * x).sin() + 0.2 * x * y]);
        }
    }
    PointSet::new(points)
}

fn create_random_points(num_points: usize, seed: u64) -> PointSet {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_points)
        .map(|_| [rng.random::<f32>(), rng.random::<f32>(), rng.random::<f32>()])
        .collect()
}

fn small_motion() -> Result<RigidTransform, Box<dyn std::error::Error>> {
    Ok(RigidTransform::new(
        axis_angle_to_rotation_matrix(&[0.2, 0.3, 1.0], 0.02)?,
        [0.008, -0.004, 0.006],
    ))
}

#[test]
fn icp_recovers_small_motion() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();

    let reference = create_surface(0.05);
    let motion = small_motion()?;
    let moving = PointSet::new(motion.transform_points(reference.points()));

    let params = IcpParams {
        tolerance: 1e-10,
        ..Default::default()
    };
    let result = iterative_closest_point(&reference, &moving, &params)?;

    assert!(result.transform.is_rigid(1e-4));
    assert!(result.transform.approx_eq(&motion.inverse(), 1e-3));
    assert!(result.fitness_score > 0.99);
    assert!(result.rmse < 1e-3);
    Ok(())
}

#[test]
fn icp_rerun_after_alignment_is_identity() -> Result<(), Box<dyn std::error::Error>> {
    let reference = create_surface(0.05);
    let motion = small_motion()?;
    let mut moving = PointSet::new(motion.transform_points(reference.points()));

    let params = IcpParams {
        tolerance: 1e-10,
        ..Default::default()
    };
    iterative_closest_point_in_place(&reference, &mut moving, &params)?;

    let again = iterative_closest_point(&reference, &moving, &params)?;
    assert!(again.transform.approx_eq(&RigidTransform::IDENTITY, 1e-3));
    assert!(again.fitness_score > 0.99);
    Ok(())
}

#[test]
fn global_recovers_large_motion() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();

    let moving = create_random_points(150, 17);
    let motion = RigidTransform::new(
        axis_angle_to_rotation_matrix(&[0.4, -1.0, 0.7], 2.1)?,
        [0.5, 1.5, -2.0],
    );
    let reference = PointSet::new(motion.transform_points(moving.points()));

    let result = global_register(&reference, &moving, &GlobalParams::default(), None)?;

    assert!(result.converged);
    assert!(result.transform.is_rigid(1e-4));
    assert!(result.transform.approx_eq(&motion, 1e-3));
    assert!(result.fitness_score > 0.99);
    Ok(())
}

#[test]
fn global_recovers_motion_of_cloud_larger_than_sample() -> Result<(), Box<dyn std::error::Error>>
{
    let _ = env_logger::builder().is_test(true).try_init();

    let params = GlobalParams::default();
    let moving = create_random_points(5 * params.sample_size, 17);
    let motion = RigidTransform::new(
        axis_angle_to_rotation_matrix(&[0.4, -1.0, 0.7], 2.1)?,
        [0.5, 1.5, -2.0],
    );
    let reference = PointSet::new(motion.transform_points(moving.points()));

    let result = global_register(&reference, &moving, &params, None)?;

    assert!(result.transform.approx_eq(&motion, 1e-3));
    assert!(result.fitness_score > 0.99);
    // the first matched base already holds an exact congruent set
    assert_eq!(result.num_iterations, 1);
    Ok(())
}

#[test]
fn global_in_place_moves_points() -> Result<(), Box<dyn std::error::Error>> {
    let original = create_random_points(120, 23);
    let motion = RigidTransform::new(
        axis_angle_to_rotation_matrix(&[1.0, 0.0, 0.0], -1.2)?,
        [-0.3, 0.2, 0.9],
    );
    let reference = PointSet::new(motion.transform_points(original.points()));
    let mut moving = original.clone();

    let params = GlobalParams {
        refine_with_icp: true,
        ..Default::default()
    };
    let result = global_register_in_place(&reference, &mut moving, &params, None)?;
    assert!(result.fitness_score > 0.99);

    for (m, r) in moving.points().iter().zip(reference.points()) {
        for i in 0..3 {
            assert!((m[i] - r[i]).abs() < 1e-3);
        }
    }
    Ok(())
}

#[test]
fn global_rejects_non_overlapping_sets() {
    let reference = create_random_points(150, 1);
    let moving = create_random_points(150, 2);
    let params = GlobalParams {
        max_bases: 50,
        ..Default::default()
    };

    match global_register(&reference, &moving, &params, None) {
        Err(RegistrationError::NoConvergentAlignment { best, threshold }) => {
            assert!(best < threshold);
            assert_eq!(threshold, params.min_fitness);
        }
        other => panic!("expected NoConvergentAlignment, got {:?}", other),
    }
}

#[test]
fn global_input_validation() {
    let points = create_random_points(10, 3);
    let params = GlobalParams::default();

    let res = global_register(&PointSet::default(), &points, &params, None);
    assert!(matches!(
        res,
        Err(RegistrationError::InvalidInput {
            name: "reference",
            ..
        })
    ));

    let three = PointSet::new(points.points()[..3].to_vec());
    let res = global_register(&points, &three, &params, None);
    assert_eq!(
        res,
        Err(RegistrationError::InvalidInput {
            name: "moving",
            required: 4,
            actual: 3
        })
    );
}

#[test]
fn global_cancelled_token() {
    let reference = create_random_points(50, 4);
    let moving = create_random_points(50, 5);

    let token = CancellationToken::new();
    token.cancel();

    let res = global_register(&reference, &moving, &GlobalParams::default(), Some(&token));
    assert_eq!(res, Err(RegistrationError::Cancelled));
}

#[test]
fn global_cancelled_during_search() {
    let reference = create_random_points(150, 6);
    let moving = create_random_points(150, 7);
    let params = GlobalParams {
        max_bases: usize::MAX,
        terminate_fitness: 2.0,
        ..Default::default()
    };

    let token = CancellationToken::new();
    let canceller = std::thread::spawn({
        let token = token.clone();
        move || {
            std::thread::sleep(std::time::Duration::from_millis(200));
            token.cancel();
        }
    });

    let res = global_register(&reference, &moving, &params, Some(&token));
    assert_eq!(res, Err(RegistrationError::Cancelled));
    assert!(canceller.join().is_ok());
}

#[test]
fn flat_global_writes_row_major_transform() -> Result<(), Box<dyn std::error::Error>> {
    let moving_set = create_random_points(400, 31);
    let motion = RigidTransform::new(
        axis_angle_to_rotation_matrix(&[0.0, 1.0, 1.0], 0.8)?,
        [1.0, 2.0, 3.0],
    );
    let reference = PointSet::new(motion.transform_points(moving_set.points())).to_flat();
    let mut moving = moving_set.to_flat();

    let mut transform = [0.0f32; 16];
    let mut score = 0.0f32;
    let status = flat::global_register_flat(&reference, &mut moving, &mut transform, &mut score);

    assert_eq!(status, RegistrationStatus::Success as i32);
    assert!(score > 0.99);
    // translation sits in the last column of the first three rows
    assert!((transform[3] - 1.0).abs() < 1e-3);
    assert!((transform[7] - 2.0).abs() < 1e-3);
    assert!((transform[11] - 3.0).abs() < 1e-3);
    assert_eq!(&transform[12..], &[0.0, 0.0, 0.0, 1.0]);

    for (m, r) in moving.iter().zip(reference.iter()) {
        assert!((m - r).abs() < 1e-3);
    }
    Ok(())
}

#[test]
fn flat_icp_recovers_small_motion() -> Result<(), Box<dyn std::error::Error>> {
    let reference_set = create_surface(0.05);
    let motion = small_motion()?;
    let reference = reference_set.to_flat();
    let mut moving = PointSet::new(motion.transform_points(reference_set.points())).to_flat();

    let mut transform = [0.0f32; 16];
    let mut score = 0.0f32;
    let status =
        flat::iterative_closest_point_flat(&reference, &mut moving, &mut transform, &mut score);
    assert!(
        status == RegistrationStatus::Success as i32
            || status == RegistrationStatus::MaxIterationsReached as i32
    );
    assert!(RigidTransform::from_row_major(&transform).approx_eq(&motion.inverse(), 1e-3));
    Ok(())
}
