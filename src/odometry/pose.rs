use arrsac::Arrsac;
use cv_core::nalgebra as cvna;
use cv_core::{CameraToCamera, FeatureMatch};
use cv_pinhole::EssentialMatrix;
use eight_point::EightPoint;
use log::debug;
use nalgebra as na;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use sample_consensus::Consensus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::camera::CameraIntrinsics;
use super::schedule::FramePair;
use crate::feature::CorrespondenceSet;
use crate::mapping::{CameraPose, PixelMatch, Triangulator};

/// Reasons a frame pair produces no pose. The pair is skipped, the run goes on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoseError {
    #[error("insufficient correspondences: {found} (need {required})")]
    InsufficientCorrespondences { found: usize, required: usize },
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(&'static str),
}

/// Robust estimation settings for the relative pose estimator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Pairs with fewer correspondences are skipped
    pub min_correspondences: usize,
    /// Only the best matches of a pair are used
    pub max_correspondences: usize,
    /// Consensus inlier threshold in pixels
    pub ransac_threshold: f64,
    /// Seed of the consensus sampler
    pub seed: u64,
    /// Cheirality depth limit, in units of the (unit) baseline
    pub max_depth: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_correspondences: 8,
            max_correspondences: 100,
            ransac_threshold: 1.0,
            seed: 0x5eed,
            max_depth: 50.0,
        }
    }
}

/// Rotation and unit translation between the two frames of a pair.
///
/// Maps points from the first camera frame to the second: `X2 = R * X1 + t`.
/// The translation magnitude is not observable from a monocular pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativePose {
    pub pair: FramePair,
    pub rotation: na::Matrix3<f64>,
    pub translation: na::Vector3<f64>,
    /// Consensus inliers supporting the pose
    pub inliers: usize,
}

/// Pose estimator for VO
pub struct PoseEstimator {
    intrinsics: CameraIntrinsics,
    config: EstimatorConfig,
}

impl PoseEstimator {
    /// Create a new pose estimator with the given camera intrinsics.
    pub fn new(intrinsics: CameraIntrinsics) -> Self {
        Self::with_config(intrinsics, EstimatorConfig::default())
    }

    pub fn with_config(intrinsics: CameraIntrinsics, config: EstimatorConfig) -> Self {
        Self { intrinsics, config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimate the relative pose of a frame pair from its correspondences.
    pub fn estimate(
        &self,
        pair: FramePair,
        correspondences: &CorrespondenceSet,
    ) -> Result<RelativePose, PoseError> {
        let (points1, points2) = self.extract_matched_points(correspondences);
        let (essential, inliers) = self.compute_essential_matrix(&points1, &points2)?;
        let (rotation, translation) =
            self.recover_pose(&essential, &points1, &points2, &inliers)?;

        debug!(
            "pair {}: {} of {} correspondences are inliers",
            pair,
            inliers.len(),
            correspondences.len()
        );

        Ok(RelativePose {
            pair,
            rotation,
            translation,
            inliers: inliers.len(),
        })
    }

    /// Convert integer pixel correspondences into floating point point lists
    pub fn extract_matched_points(
        &self,
        correspondences: &CorrespondenceSet,
    ) -> (Vec<na::Point2<f64>>, Vec<na::Point2<f64>>) {
        correspondences
            .iter()
            .map(|(a, b)| (a.cast::<f64>(), b.cast::<f64>()))
            .unzip()
    }

    /// Compute essential matrix from matched points
    ///
    /// ARRSAC over eight-point hypotheses. Returns the matrix of the winning motion
    /// and the indices of its inliers.
    pub fn compute_essential_matrix(
        &self,
        points1: &[na::Point2<f64>],
        points2: &[na::Point2<f64>],
    ) -> Result<(EssentialMatrix, Vec<usize>), PoseError> {
        let found = points1.len().min(points2.len());
        let required = self.config.min_correspondences.max(EIGHT_POINT_SAMPLES);
        if found < required {
            return Err(PoseError::InsufficientCorrespondences { found, required });
        }

        let matches: Vec<FeatureMatch> = points1
            .iter()
            .zip(points2)
            .map(|(a, b)| FeatureMatch(self.bearing(a), self.bearing(b)))
            .collect();

        // the consensus residual is one minus the cosine of the bearing error
        let angle = self.config.ransac_threshold / self.intrinsics.focal_length();
        let threshold = 1.0 - angle.cos();

        let mut consensus =
            Arrsac::new(threshold, Xoshiro256PlusPlus::seed_from_u64(self.config.seed));
        let (motion, inliers) = consensus
            .model_inliers(&EightPoint::new(), matches.iter().copied())
            .ok_or(PoseError::DegenerateGeometry("no consensus essential matrix"))?;

        Ok((essential_from_motion(&motion), inliers))
    }

    /// Recover rotation and translation from essential matrix
    ///
    /// Of the four decompositions, the one placing the most inlier points in front
    /// of both cameras wins.
    pub fn recover_pose(
        &self,
        essential: &EssentialMatrix,
        points1: &[na::Point2<f64>],
        points2: &[na::Point2<f64>],
        inliers: &[usize],
    ) -> Result<(na::Matrix3<f64>, na::Vector3<f64>), PoseError> {
        let candidates = essential
            .possible_unscaled_poses(1e-12, 1000)
            .ok_or(PoseError::DegenerateGeometry("essential matrix decomposition failed"))?;

        // Triangulate with a single focal length, matching the bearings above
        let focal = self.intrinsics.focal_length();
        let camera = CameraIntrinsics::new(focal, focal, self.intrinsics.cx, self.intrinsics.cy);
        let triangulator = Triangulator::new(camera).with_max_depth(self.config.max_depth);

        let matches: Vec<PixelMatch> = inliers
            .iter()
            .filter_map(|&i| Some((*points1.get(i)?, *points2.get(i)?)))
            .collect();
        let origin = (na::Matrix3::identity(), na::Vector3::zeros());

        let (best, in_front) = candidates
            .iter()
            .map(|c| {
                let candidate = motion_parts(c);
                let count = triangulator.count_in_front(&origin, &candidate, &matches);
                (candidate, count)
            })
            .max_by_key(|&(_, count)| count)
            .ok_or(PoseError::DegenerateGeometry("no pose candidates"))?;

        if in_front == 0 {
            return Err(PoseError::DegenerateGeometry(
                "no pose candidate places points in front of both cameras",
            ));
        }

        Ok(best)
    }

    /// Unit bearing of a pixel, with the mean focal length and the principal point
    fn bearing(&self, pixel: &na::Point2<f64>) -> cvna::UnitVector3<f64> {
        let focal = self.intrinsics.focal_length();
        let pp = self.intrinsics.principal_point();
        let x = (pixel.x - pp.x) / focal;
        let y = (pixel.y - pp.y) / focal;
        cvna::UnitVector3::new_normalize(cvna::Vector3::new(x, y, 1.0))
    }
}

const EIGHT_POINT_SAMPLES: usize = 8;

/// `E = [t]x R` of a camera to camera motion
fn essential_from_motion(motion: &CameraToCamera) -> EssentialMatrix {
    let t = motion.0.translation.vector;
    EssentialMatrix(t.cross_matrix() * motion.0.rotation.matrix())
}

/// Rotation and translation of a camera to camera motion as `nalgebra` types
fn motion_parts(motion: &CameraToCamera) -> CameraPose {
    let r = motion.0.rotation.matrix();
    let t = motion.0.translation.vector;
    (
        na::Matrix3::from_fn(|i, j| r[(i, j)]),
        na::Vector3::new(t.x, t.y, t.z),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::Rng;

    /// Projects random scene points through a known motion and rounds to pixels.
    fn synthetic_correspondences(
        cam: &CameraIntrinsics,
        rotation: &na::Matrix3<f64>,
        translation: &na::Vector3<f64>,
        count: usize,
    ) -> CorrespondenceSet {
        let mut rng = StdRng::seed_from_u64(7);
        let project = |p: &na::Vector3<f64>| {
            na::Point2::new(
                (cam.fx * p.x / p.z + cam.cx).round() as i32,
                (cam.fy * p.y / p.z + cam.cy).round() as i32,
            )
        };
        let mut set = CorrespondenceSet::new();
        while set.len() < count {
            let p = na::Vector3::new(
                rng.gen_range(-8.0..8.0),
                rng.gen_range(-3.0..3.0),
                rng.gen_range(6.0..25.0),
            );
            let q = rotation * p + translation;
            let (a, b) = (project(&p), project(&q));
            let inside = |pt: &na::Point2<i32>| {
                (0..1242).contains(&pt.x) && (0..375).contains(&pt.y)
            };
            if q.z > 0.0 && inside(&a) && inside(&b) {
                set.push(a, b);
            }
        }
        set
    }

    fn known_motion() -> (na::Matrix3<f64>, na::Vector3<f64>) {
        let rotation = *na::Rotation3::from_euler_angles(0.01, 0.04, -0.005).matrix();
        // forward motion with a little sideways drift
        let translation = na::Vector3::new(0.1, -0.02, -1.0).normalize() * 1.5;
        (rotation, translation)
    }

    fn rotation_error(estimate: &na::Matrix3<f64>, truth: &na::Matrix3<f64>) -> f64 {
        na::Rotation3::from_matrix_unchecked(estimate.transpose() * truth).angle()
    }

    #[test]
    fn test_pose_estimator_creation() {
        let cam = CameraIntrinsics::kitti();
        let estimator = PoseEstimator::new(cam);
        assert_eq!(estimator.config().min_correspondences, 8);
        assert_eq!(estimator.config().ransac_threshold, 1.0);
        assert_eq!(estimator.config().max_depth, 50.0);
    }

    #[test]
    fn test_insufficient_points() {
        let cam = CameraIntrinsics::kitti();
        let estimator = PoseEstimator::new(cam);

        let mut set = CorrespondenceSet::new();
        for i in 0..5 {
            set.push(na::Point2::new(i, i), na::Point2::new(i + 1, i));
        }

        let result = estimator.estimate(FramePair::new(0, 1), &set);
        assert_eq!(
            result,
            Err(PoseError::InsufficientCorrespondences {
                found: 5,
                required: 8
            })
        );
    }

    #[test]
    fn test_empty_correspondences() {
        let estimator = PoseEstimator::new(CameraIntrinsics::kitti());
        let result = estimator.estimate(FramePair::new(0, 2), &CorrespondenceSet::new());
        assert!(matches!(
            result,
            Err(PoseError::InsufficientCorrespondences { found: 0, .. })
        ));
    }

    #[test]
    fn test_recovers_synthetic_motion() {
        let cam = CameraIntrinsics::kitti();
        let (rotation, translation) = known_motion();
        let set = synthetic_correspondences(&cam, &rotation, &translation, 100);

        let estimator = PoseEstimator::new(cam);
        let pose = estimator.estimate(FramePair::new(0, 1), &set).unwrap();

        // orthonormal, proper rotation
        let rtr = pose.rotation.transpose() * pose.rotation;
        assert!((rtr - na::Matrix3::identity()).norm() < 1e-9);
        assert_relative_eq!(pose.rotation.determinant(), 1.0, epsilon = 1e-9);

        // unit translation, scale is not observable
        assert_relative_eq!(pose.translation.norm(), 1.0, epsilon = 1e-9);

        // close to the ground truth despite pixel rounding
        let angle = rotation_error(&pose.rotation, &rotation);
        assert!(angle < 0.02, "rotation error {angle} rad");
        let direction = pose.translation.dot(&translation.normalize());
        assert!(direction > 0.98, "translation direction cosine {direction}");
        assert!(pose.inliers >= 70);
    }

    #[test]
    fn test_random_outliers_are_rejected() {
        let cam = CameraIntrinsics::kitti();
        let (rotation, translation) = known_motion();
        let mut set = synthetic_correspondences(&cam, &rotation, &translation, 70);

        // 30 of 100 correspondences pair unrelated pixels
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..30 {
            let a = na::Point2::new(rng.gen_range(0..1242), rng.gen_range(0..375));
            let b = na::Point2::new(rng.gen_range(0..1242), rng.gen_range(0..375));
            set.push(a, b);
        }

        let estimator = PoseEstimator::new(cam);
        let pose = estimator.estimate(FramePair::new(4, 6), &set).unwrap();

        let angle = rotation_error(&pose.rotation, &rotation);
        assert!(angle < 0.02, "rotation error {angle} rad");
        let direction = pose.translation.dot(&translation.normalize());
        assert!(direction > 0.98, "translation direction cosine {direction}");
        // the true matches survive, nearly all random pairs do not
        assert!(
            (63..=78).contains(&pose.inliers),
            "{} inliers",
            pose.inliers
        );
    }

    #[test]
    fn test_exact_correspondences_give_exact_rotation() {
        let cam = CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0);
        let (rotation, translation) = known_motion();
        let estimator = PoseEstimator::new(cam);

        let mut points1 = Vec::new();
        let mut points2 = Vec::new();
        for i in 0..30 {
            let p = na::Vector3::new(
                -3.0 + (i % 6) as f64,
                -1.0 + (i / 6) as f64 * 0.5,
                8.0 + ((i * 7) % 11) as f64,
            );
            let q = rotation * p + translation;
            points1.push(na::Point2::new(cam.fx * p.x / p.z + cam.cx, cam.fy * p.y / p.z + cam.cy));
            points2.push(na::Point2::new(cam.fx * q.x / q.z + cam.cx, cam.fy * q.y / q.z + cam.cy));
        }

        let (essential, inliers) = estimator
            .compute_essential_matrix(&points1, &points2)
            .unwrap();
        assert_eq!(inliers.len(), 30);

        let (r, t) = estimator
            .recover_pose(&essential, &points1, &points2, &inliers)
            .unwrap();
        assert!((r - rotation).norm() < 1e-6);
        assert!((t - translation.normalize()).norm() < 1e-6);
    }

    #[test]
    fn test_recover_pose_picks_the_motion_in_front() {
        let cam = CameraIntrinsics::kitti();
        let (rotation, translation) = known_motion();
        let direction = translation.normalize();

        let mut points1 = Vec::new();
        let mut points2 = Vec::new();
        for i in 0..20 {
            let p = na::Vector3::new(-4.0 + i as f64 * 0.4, 0.5 - (i % 3) as f64, 10.0 + i as f64);
            let q = rotation * p + translation;
            points1.push(na::Point2::new(cam.fx * p.x / p.z + cam.cx, cam.fy * p.y / p.z + cam.cy));
            points2.push(na::Point2::new(cam.fx * q.x / q.z + cam.cx, cam.fy * q.y / q.z + cam.cy));
        }

        // the sign of E does not change which candidate is physical
        let rotation_cv = cvna::Matrix3::from_fn(|i, j| rotation[(i, j)]);
        let t_cv = cvna::Vector3::new(direction.x, direction.y, direction.z);
        let inliers: Vec<usize> = (0..20).collect();
        for sign in [1.0, -1.0] {
            let essential = EssentialMatrix(t_cv.cross_matrix() * rotation_cv * sign);
            let (r, t) = PoseEstimator::new(cam)
                .recover_pose(&essential, &points1, &points2, &inliers)
                .unwrap();
            assert!(rotation_error(&r, &rotation) < 1e-7);
            assert_relative_eq!(t, direction, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_inlier_indices_out_of_range_are_ignored() {
        let cam = CameraIntrinsics::kitti();
        let (rotation, translation) = known_motion();
        let set = synthetic_correspondences(&cam, &rotation, &translation, 40);
        let estimator = PoseEstimator::new(cam);
        let (points1, points2) = estimator.extract_matched_points(&set);

        let (essential, mut inliers) = estimator
            .compute_essential_matrix(&points1, &points2)
            .unwrap();
        inliers.push(points1.len() + 3);
        assert!(estimator
            .recover_pose(&essential, &points1, &points2, &inliers)
            .is_ok());
    }

    #[test]
    fn test_no_points_in_front_is_degenerate() {
        let estimator = PoseEstimator::new(CameraIntrinsics::kitti());
        let (rotation, translation) = known_motion();
        let t = translation.normalize();
        let essential = EssentialMatrix(
            cvna::Vector3::new(t.x, t.y, t.z).cross_matrix()
                * cvna::Matrix3::from_fn(|i, j| rotation[(i, j)]),
        );
        assert_eq!(
            estimator.recover_pose(&essential, &[], &[], &[]),
            Err(PoseError::DegenerateGeometry(
                "no pose candidate places points in front of both cameras"
            ))
        );
    }
}
