use log::{debug, info, warn};
use nalgebra as na;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::feature::{CorrespondenceProvider, FeatureSource, MatchingCorrespondences};
use crate::mapping::{reduce_trajectory, KeyframeSelector, SmoothingConfig, TrajectorySmoother};
use crate::odometry::{
    save_points, CameraIntrinsics, FramePair, PoseError, PoseEstimator, PoseLog, PoseLogWriter,
    PoseRecord, Trajectory,
};

pub const POSE_DIR: &str = "pose";
pub const POSE_LOG_FILE: &str = "poses.txt";
pub const TRAJECTORY_DIR: &str = "trajectory";
pub const BASE_TRAJECTORY_FILE: &str = "base_trajectory.txt";
pub const SMOOTHED_TRAJECTORY_FILE: &str = "smoothed_trajectory.txt";
pub const KEYFRAMES_FILE: &str = "keyframes.json";
pub const BASE_TRAJECTORY_JSON: &str = "base_trajectory.json";

/// Why frame pairs produced no pose
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipStats {
    /// No correspondences could be obtained
    pub unavailable: usize,
    /// Fewer correspondences than the estimator needs
    pub insufficient: usize,
    /// Solver failure, no consensus, or no candidate passed cheirality
    pub degenerate: usize,
}

impl SkipStats {
    pub fn total(&self) -> usize {
        self.unavailable + self.insufficient + self.degenerate
    }
}

/// Estimate the relative pose of every pair, in order, appending each to the log.
///
/// Pairs without a pose are counted and leave no trace in the log. Only write
/// failures abort.
pub fn estimate_poses<P, W>(
    estimator: &PoseEstimator,
    provider: &mut P,
    pairs: &[FramePair],
    log: &mut PoseLogWriter<W>,
) -> Result<SkipStats>
where
    P: CorrespondenceProvider,
    W: Write,
{
    let mut skipped = SkipStats::default();

    for &pair in pairs {
        let correspondences = match provider.correspondences(pair) {
            Some(set) if !set.is_empty() => set,
            _ => {
                debug!("pair {}: no correspondences", pair);
                skipped.unavailable += 1;
                continue;
            }
        };

        match estimator.estimate(pair, &correspondences) {
            Ok(pose) => log.write_record(&PoseRecord::from(&pose))?,
            Err(e @ PoseError::InsufficientCorrespondences { .. }) => {
                debug!("pair {}: {}", pair, e);
                skipped.insufficient += 1;
            }
            Err(e @ PoseError::DegenerateGeometry(_)) => {
                debug!("pair {}: {}", pair, e);
                skipped.degenerate += 1;
            }
        }
    }

    info!(
        "estimated {} poses from {} pairs ({} skipped)",
        pairs.len() - skipped.total(),
        pairs.len(),
        skipped.total()
    );
    Ok(skipped)
}

/// Chained, reduced and smoothed trajectories of one pose log
#[derive(Debug, Clone)]
pub struct TrajectoryOutputs {
    pub base: Trajectory,
    pub keyframes: Vec<usize>,
    pub reduced: Vec<na::Point3<f64>>,
    pub smoothed: Vec<na::Point3<f64>>,
}

impl TrajectoryOutputs {
    /// Chain the log's records, keep the keyframe points and smooth them
    pub fn build(log: &PoseLog, keyframes: Vec<usize>, smoothing: &SmoothingConfig) -> Result<Self> {
        let smoother = TrajectorySmoother::new(*smoothing)?;

        let base = Trajectory::from_records(&log.records);
        let reduced = reduce_trajectory(&base.positions(), &keyframes);
        if reduced.len() < keyframes.len() {
            debug!(
                "{} keyframes lie past the end of the trajectory",
                keyframes.len() - reduced.len()
            );
        }
        let smoothed = smoother.smooth(&reduced);

        Ok(Self {
            base,
            keyframes,
            reduced,
            smoothed,
        })
    }

    /// Write the plain tables and JSON exports into `dir`
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        save_points(dir.join(BASE_TRAJECTORY_FILE), &self.base.positions())?;
        save_points(dir.join(SMOOTHED_TRAJECTORY_FILE), &self.smoothed)?;
        self.base.save_to_file(dir.join(BASE_TRAJECTORY_JSON))?;
        fs::write(
            dir.join(KEYFRAMES_FILE),
            serde_json::to_string(&self.keyframes)?,
        )?;
        Ok(())
    }
}

/// What a pipeline run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames: usize,
    pub pairs: usize,
    pub poses: usize,
    pub skipped: SkipStats,
    pub malformed_records: usize,
    pub out_of_order_records: usize,
    pub keyframes: usize,
    pub trajectory_points: usize,
    pub smoothed_points: usize,
}

/// Rebuild the trajectory outputs from an existing pose log.
///
/// Only the log and the smoothing settings are needed: the poses already hold
/// everything the camera contributed. Without keyframes every trajectory point is
/// kept before smoothing.
pub fn rebuild_trajectories<P: AsRef<Path>>(
    log_path: P,
    keyframes: Option<Vec<usize>>,
    smoothing: &SmoothingConfig,
    output: &Path,
) -> Result<RunSummary> {
    let log = PoseLog::from_file(log_path)?;
    if log.malformed > 0 {
        warn!("{} malformed pose records skipped", log.malformed);
    }

    let keyframes = keyframes.unwrap_or_else(|| (0..log.records.len()).collect());
    let outputs = TrajectoryOutputs::build(&log, keyframes, smoothing)?;
    outputs.write_to(output.join(TRAJECTORY_DIR))?;

    info!(
        "trajectory: {} points, {} after keyframe reduction, distance {:.3}",
        outputs.base.len(),
        outputs.reduced.len(),
        outputs.base.total_distance()
    );

    Ok(RunSummary {
        poses: log.records.len(),
        malformed_records: log.malformed,
        out_of_order_records: log.out_of_order,
        keyframes: outputs.keyframes.len(),
        trajectory_points: outputs.base.len(),
        smoothed_points: outputs.smoothed.len(),
        ..Default::default()
    })
}

/// Full run: pose estimation, pose log, keyframes, trajectories
pub struct Pipeline {
    intrinsics: CameraIntrinsics,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(intrinsics: CameraIntrinsics, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { intrinsics, config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn pose_log_path<P: AsRef<Path>>(output: P) -> PathBuf {
        output.as_ref().join(POSE_DIR).join(POSE_LOG_FILE)
    }

    /// Run every stage over `source`, writing under `output`
    pub fn run<S, P>(&self, mut source: S, output: P) -> Result<RunSummary>
    where
        S: FeatureSource,
        P: AsRef<Path>,
    {
        let output = output.as_ref();
        fs::create_dir_all(output.join(POSE_DIR))?;

        let frames = source.len();
        let pairs = self.config.strategy.frame_pairs(frames);
        info!(
            "{} frames, {} pairs with the {} strategy",
            frames,
            pairs.len(),
            self.config.strategy
        );
        if pairs.is_empty() {
            warn!("sequence too short for the {} strategy", self.config.strategy);
        }

        // Stage 1: relative poses into the log
        let log_path = Self::pose_log_path(output);
        let estimator = PoseEstimator::with_config(self.intrinsics, self.config.estimator);
        let mut provider = MatchingCorrespondences::new(&mut source)
            .with_max_matches(self.config.estimator.max_correspondences);
        let mut writer = PoseLogWriter::create(&log_path)?;
        let skipped = estimate_poses(&estimator, &mut provider, &pairs, &mut writer)?;
        writer.finish()?;
        drop(provider);

        // Stage 2: keyframes over the whole sequence
        let keyframes = KeyframeSelector::with_config(self.config.keyframes).select(&mut source);

        // Stage 3: trajectories from the log, read back as written
        let mut summary = rebuild_trajectories(
            &log_path,
            Some(keyframes),
            &self.config.smoothing,
            output,
        )?;
        summary.frames = frames;
        summary.pairs = pairs.len();
        summary.skipped = skipped;
        Ok(summary)
    }
}
