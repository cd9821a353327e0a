use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rand::{rngs::StdRng, Rng, SeedableRng};
use scanner_3d::{
    pointset::PointSet,
    transforms::{axis_angle_to_rotation_matrix, RigidTransform},
};
use scanner_registration as reg;

fn generate_dataset_with_seed(
    num_points: usize,
    motion: &RigidTransform,
    seed: u64,
) -> (PointSet, PointSet) {
    let mut rng = StdRng::seed_from_u64(seed);
    let moving = (0..num_points)
        .map(|_| {
            [
                rng.random_range(-0.5..0.5),
                rng.random_range(-0.5..0.5),
                rng.random_range(-0.5..0.5),
            ]
        })
        .collect::<PointSet>();
    let reference = PointSet::new(motion.transform_points(moving.points()));
    (reference, moving)
}

fn bench_icp(c: &mut Criterion) {
    let mut group = c.benchmark_group("icp");
    let Ok(rotation) = axis_angle_to_rotation_matrix(&[0.0, 0.3, 1.0], 0.03) else {
        return;
    };
    let motion = RigidTransform::new(rotation, [0.01, -0.01, 0.005]);

    for &n in &[500usize, 2000, 8000] {
        let (reference, moving) = generate_dataset_with_seed(n, &motion, 42);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let res =
                    reg::iterative_closest_point(&reference, &moving, &reg::IcpParams::default());
                std::hint::black_box(res)
            });
        });
    }
    group.finish();
}

fn bench_global(c: &mut Criterion) {
    let mut group = c.benchmark_group("global_4pcs");
    group.sample_size(10);
    let Ok(rotation) = axis_angle_to_rotation_matrix(&[1.0, -0.5, 0.2], 2.0) else {
        return;
    };
    let motion = RigidTransform::new(rotation, [0.5, 0.2, -0.3]);

    for &n in &[200usize, 1000] {
        let (reference, moving) = generate_dataset_with_seed(n, &motion, 7);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let params = reg::GlobalParams::default();
                let res = reg::global_register(&reference, &moving, &params, None);
                std::hint::black_box(res)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_icp, bench_global);
criterion_main!(benches);
