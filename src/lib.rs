mod config;
mod error;
mod feature;
mod mapping;
mod odometry;
mod pipeline;

pub use config::PipelineConfig;
pub use error::{Result, VoError};
pub use feature::{
    BinaryDescriptor, CorrespondenceProvider, CorrespondenceSet, DescriptorMatch, FeatureMatcher,
    FeatureSource, FrameFeatures, MatchingCorrespondences, DESCRIPTOR_BYTES,
};
pub use mapping::{
    reduce_trajectory, CameraPose, KeyframeConfig, KeyframeSelector, KeyframeState, PixelMatch,
    SmoothingConfig, TrajectorySmoother, Triangulator,
};
pub use odometry::{
    save_points, write_points, CameraIntrinsics, EssentialMatrix, EstimatorConfig, FramePair,
    PoseError, PoseEstimator, PoseLog, PoseLogWriter, PoseRecord, RelativePose, SamplingStrategy,
    Trajectory, TrajectoryPoint, DEFAULT_CALIBRATION_LABEL,
};
pub use pipeline::{
    estimate_poses, rebuild_trajectories, Pipeline, RunSummary, SkipStats, TrajectoryOutputs,
    BASE_TRAJECTORY_FILE, BASE_TRAJECTORY_JSON, KEYFRAMES_FILE, POSE_DIR, POSE_LOG_FILE,
    SMOOTHED_TRAJECTORY_FILE, TRAJECTORY_DIR,
};

#[cfg(feature = "opencv")]
pub use feature::OrbFeatureSource;
