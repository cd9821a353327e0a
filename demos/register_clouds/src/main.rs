use argh::FromArgs;
use serde::Deserialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use scanner::k3d;
use scanner::registration::{self as reg, GlobalParams, IcpParams};

#[derive(FromArgs)]
/// Align a moving point cloud onto a reference cloud (global 4PCS + ICP refinement)
struct Args {
    /// path to the reference point cloud (.ply, .pcd or .obj)
    #[argh(option)]
    reference_path: PathBuf,

    /// path to the moving point cloud (.ply, .pcd or .obj)
    #[argh(option)]
    moving_path: PathBuf,

    /// optional JSON file with `global` and `icp` parameter sections
    #[argh(option)]
    config: Option<PathBuf>,

    /// override the matching tolerance of the global registration
    #[argh(option)]
    delta: Option<f32>,

    /// override the expected overlap ratio
    #[argh(option)]
    overlap: Option<f32>,

    /// skip the global registration and only run ICP
    #[argh(switch)]
    icp_only: bool,

    /// where to write the aligned moving cloud (binary PLY)
    #[argh(option)]
    output_path: Option<PathBuf>,

    /// where to write the 4x4 transform
    #[argh(option)]
    matrix_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    global: GlobalParams,
    icp: IcpParams,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => serde_json::from_str::<Config>(&std::fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    if let Some(delta) = args.delta {
        config.global.delta = delta;
    }
    if let Some(overlap) = args.overlap {
        config.global.overlap = overlap;
    }

    let reference = k3d::io::read_point_set(&args.reference_path)?;
    println!("Reference cloud: #{} points", reference.len());

    let mut moving = k3d::io::read_point_set(&args.moving_path)?;
    println!("Moving cloud: #{} points", moving.len());

    // create a cancel token to stop the global search
    let cancel_token = CancellationToken::new();
    ctrlc::set_handler({
        let cancel_token = cancel_token.clone();
        move || {
            println!("Received Ctrl-C signal. Sending cancel signal !!");
            cancel_token.cancel();
        }
    })?;

    let mut transform = k3d::transforms::RigidTransform::IDENTITY;

    if !args.icp_only {
        let coarse = reg::global_register_in_place(
            &reference,
            &mut moving,
            &config.global,
            Some(&cancel_token),
        )?;
        println!(
            "Global registration: fitness {:.4} after {} bases",
            coarse.fitness_score, coarse.num_iterations
        );
        transform = coarse.transform;
    }

    let fine = reg::iterative_closest_point_in_place(&reference, &mut moving, &config.icp)?;
    if !fine.converged {
        log::warn!("ICP stopped after {} iterations", fine.num_iterations);
    }
    println!(
        "ICP: fitness {:.4}, rmse {:.6} after {} iterations",
        fine.fitness_score, fine.rmse, fine.num_iterations
    );
    transform = fine.transform.compose(&transform);

    let rotation = transform.rotation();
    println!("R =");
    for row in 0..3 {
        println!(
            "  {:>10.6} {:>10.6} {:>10.6}",
            rotation.row(row).x,
            rotation.row(row).y,
            rotation.row(row).z
        );
    }
    let t = transform.translation();
    println!("t = < {:.6}, {:.6}, {:.6} >", t.x, t.y, t.z);

    if let Some(path) = &args.output_path {
        k3d::io::ply::write_ply_binary(path, &moving)?;
        println!("Aligned cloud written to {}", path.display());
    }

    if let Some(path) = &args.matrix_path {
        k3d::io::matrix::write_matrix(path, &transform)?;
        println!("Transform written to {}", path.display());
    }

    Ok(())
}
