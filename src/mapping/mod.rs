mod keyframe;
mod reduce;
mod smoothing;
mod triangulation;

pub use keyframe::{KeyframeConfig, KeyframeSelector, KeyframeState};
pub use reduce::reduce_trajectory;
pub use smoothing::{SmoothingConfig, TrajectorySmoother};
pub use triangulation::{CameraPose, PixelMatch, Triangulator};
