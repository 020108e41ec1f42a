use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};

use slamkit_vo::{
    rebuild_trajectories, CameraIntrinsics, PipelineConfig, SamplingStrategy,
    DEFAULT_CALIBRATION_LABEL, TRAJECTORY_DIR,
};

#[derive(Parser, Debug)]
#[command(version, about = "Monocular visual odometry trajectory pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate poses from an image directory and build the trajectories
    Run {
        #[arg(long, help = "Directory of grayscale .png frames")]
        images: PathBuf,

        #[arg(long, help = "KITTI-style calibration file")]
        calib: PathBuf,

        #[arg(long, default_value = "output")]
        output: PathBuf,

        #[arg(long, help = "JSON settings file")]
        config: Option<PathBuf>,

        #[arg(long, help = "consecutive (1-2-3-4), skip-2 (1-3-5-7) or skip-4 (1-5-9-13)")]
        strategy: Option<SamplingStrategy>,
    },
    /// Rebuild trajectories from an existing pose log
    Trajectory {
        #[arg(long)]
        poses: PathBuf,

        #[arg(long, default_value = "output")]
        output: PathBuf,

        #[arg(long, help = "JSON array of keyframe indices")]
        keyframes: Option<PathBuf>,

        #[arg(long, help = "JSON settings file")]
        config: Option<PathBuf>,
    },
    /// Print the intrinsics parsed from a calibration file
    Intrinsics {
        #[arg(long)]
        calib: PathBuf,

        #[arg(long, default_value = DEFAULT_CALIBRATION_LABEL)]
        label: String,
    },
    /// Print the frame pairs of a sampling strategy
    Pairs {
        #[arg(long)]
        frames: usize,

        #[arg(long, default_value = "skip-2")]
        strategy: SamplingStrategy,
    },
}

fn load_config(path: Option<&Path>) -> slamkit_vo::Result<PipelineConfig> {
    match path {
        Some(path) => {
            info!("loading settings from {}", path.display());
            PipelineConfig::from_json_file(path)
        }
        None => Ok(PipelineConfig::default()),
    }
}

#[cfg(feature = "opencv")]
fn run(
    images: &Path,
    calib: &Path,
    output: &Path,
    config: PipelineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    use slamkit_vo::{OrbFeatureSource, Pipeline, POSE_DIR};

    let intrinsics = CameraIntrinsics::from_calib_file_with_label(calib, &config.calibration_label)?;
    println!(
        "Camera: fx={:.3} fy={:.3} cx={:.3} cy={:.3}",
        intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy
    );

    let source = OrbFeatureSource::open(images)?;
    println!("Found {} frames in {}", source.paths().len(), images.display());

    let pipeline = Pipeline::new(intrinsics, config)?;
    let summary = pipeline.run(source, output)?;

    println!("\nPose estimation");
    println!("  Pairs: {}", summary.pairs);
    println!("  Poses: {}", summary.poses);
    println!(
        "  Skipped: {} (no matches {}, too few {}, degenerate {})",
        summary.skipped.total(),
        summary.skipped.unavailable,
        summary.skipped.insufficient,
        summary.skipped.degenerate
    );
    println!("\nTrajectory");
    println!("  Points: {}", summary.trajectory_points);
    println!("  Keyframes: {}", summary.keyframes);
    println!("  Smoothed points: {}", summary.smoothed_points);
    println!(
        "\nOutputs saved in {} and {}",
        output.join(POSE_DIR).display(),
        output.join(TRAJECTORY_DIR).display()
    );
    Ok(())
}

#[cfg(not(feature = "opencv"))]
fn run(
    _images: &Path,
    _calib: &Path,
    _output: &Path,
    _config: PipelineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Error: Image input not enabled!");
    eprintln!("Please compile with: cargo run --features opencv -- run <args>");
    std::process::exit(1);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            images,
            calib,
            output,
            config,
            strategy,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(strategy) = strategy {
                config.strategy = strategy;
            }
            run(&images, &calib, &output, config)?;
        }
        Command::Trajectory {
            poses,
            output,
            keyframes,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let keyframes: Option<Vec<usize>> = match keyframes {
                Some(path) => Some(serde_json::from_str(&std::fs::read_to_string(path)?)?),
                None => None,
            };

            let summary = rebuild_trajectories(&poses, keyframes, &config.smoothing, &output)?;

            println!("Records: {}", summary.poses);
            if summary.malformed_records > 0 {
                println!("Malformed records skipped: {}", summary.malformed_records);
            }
            if summary.out_of_order_records > 0 {
                println!("Out of order records: {}", summary.out_of_order_records);
            }
            println!("Trajectory points: {}", summary.trajectory_points);
            println!("Smoothed points: {}", summary.smoothed_points);
            println!(
                "Outputs saved in {}",
                output.join(TRAJECTORY_DIR).display()
            );
        }
        Command::Intrinsics { calib, label } => {
            let intrinsics = CameraIntrinsics::from_calib_file_with_label(&calib, &label)?;
            println!("fx: {}", intrinsics.fx);
            println!("fy: {}", intrinsics.fy);
            println!("cx: {}", intrinsics.cx);
            println!("cy: {}", intrinsics.cy);
            println!("focal length: {}", intrinsics.focal_length());
        }
        Command::Pairs { frames, strategy } => {
            let pairs = strategy.frame_pairs(frames);
            println!("{} pairs with the {} strategy", pairs.len(), strategy);
            for pair in pairs {
                println!("{}", pair);
            }
        }
    }

    Ok(())
}
