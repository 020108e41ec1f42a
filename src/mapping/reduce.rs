use nalgebra as na;

/// Trajectory points at the keyframe indices.
///
/// Keyframes can outnumber trajectory points (the keyframe scan visits every frame,
/// the trajectory has one point per pose record), so indices past the end are dropped.
pub fn reduce_trajectory(trajectory: &[na::Point3<f64>], keyframes: &[usize]) -> Vec<na::Point3<f64>> {
    keyframes
        .iter()
        .filter_map(|&i| trajectory.get(i).copied())
        .collect()
}
