mod camera;
mod pose;
mod pose_log;
mod schedule;
mod trajectory;

pub use camera::{CameraIntrinsics, DEFAULT_CALIBRATION_LABEL};
pub use cv_pinhole::EssentialMatrix;
pub use pose::{EstimatorConfig, PoseError, PoseEstimator, RelativePose};
pub use pose_log::{PoseLog, PoseLogWriter, PoseRecord};
pub use schedule::{FramePair, SamplingStrategy};
pub use trajectory::{save_points, write_points, Trajectory, TrajectoryPoint};
