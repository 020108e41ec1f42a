use nalgebra as na;

use crate::odometry::CameraIntrinsics;

/// Camera pose as `(R, t)`, mapping world points into the camera frame: `X_c = R * X_w + t`.
pub type CameraPose = (na::Matrix3<f64>, na::Vector3<f64>);

/// A pixel correspondence between two views.
pub type PixelMatch = (na::Point2<f64>, na::Point2<f64>);

/// Linear (DLT) triangulator for computing 3D points from 2D correspondences
#[derive(Debug, Clone, Copy)]
pub struct Triangulator {
    intrinsics: CameraIntrinsics,
    /// Points farther than this from either camera are rejected. With a unit baseline
    /// they are too close to infinity for their depth sign to be trusted.
    max_depth: f64,
}

impl Triangulator {
    /// Create a new triangulator with the given camera intrinsics
    pub fn new(intrinsics: CameraIntrinsics) -> Self {
        Self {
            intrinsics,
            max_depth: 50.0,
        }
    }

    /// Set maximum accepted depth
    pub fn with_max_depth(mut self, max_depth: f64) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Triangulate 3D points from two camera poses and matched pixels
    ///
    /// Arguments
    /// - `pose1` - (R, t) of the first camera (world to camera transform)
    /// - `pose2` - (R, t) of the second camera (world to camera transform)
    /// - `matches` - pixel in the first image paired with pixel in the second image
    ///
    /// Returns
    /// The points that lie in front of both cameras, within the depth limit
    pub fn triangulate(
        &self,
        pose1: &CameraPose,
        pose2: &CameraPose,
        matches: &[PixelMatch],
    ) -> Vec<na::Point3<f64>> {
        let proj1 = self.build_projection_matrix(&pose1.0, &pose1.1);
        let proj2 = self.build_projection_matrix(&pose2.0, &pose2.1);

        matches
            .iter()
            .filter_map(|(p1, p2)| triangulate_point(&proj1, &proj2, p1, p2))
            .filter(|point| {
                self.is_in_front_of_camera(point, &pose1.0, &pose1.1)
                    && self.is_in_front_of_camera(point, &pose2.0, &pose2.1)
            })
            .collect()
    }

    /// Number of correspondences that triangulate in front of both cameras
    pub fn count_in_front(
        &self,
        pose1: &CameraPose,
        pose2: &CameraPose,
        matches: &[PixelMatch],
    ) -> usize {
        self.triangulate(pose1, pose2, matches).len()
    }

    /// Build projection matrix P = K * [R | t]
    fn build_projection_matrix(
        &self,
        r: &na::Matrix3<f64>,
        t: &na::Vector3<f64>,
    ) -> na::Matrix3x4<f64> {
        let mut rt = na::Matrix3x4::zeros();
        rt.fixed_view_mut::<3, 3>(0, 0).copy_from(r);
        rt.set_column(3, t);
        self.intrinsics.to_matrix() * rt
    }

    /// Check if a 3D point is in front of the camera and not too far away
    fn is_in_front_of_camera(
        &self,
        point: &na::Point3<f64>,
        r: &na::Matrix3<f64>,
        t: &na::Vector3<f64>,
    ) -> bool {
        let point_cam = r * point.coords + t;
        point_cam.z > 0.0 && point_cam.z < self.max_depth
    }
}

/// Homogeneous DLT solution for one correspondence.
fn triangulate_point(
    proj1: &na::Matrix3x4<f64>,
    proj2: &na::Matrix3x4<f64>,
    p1: &na::Point2<f64>,
    p2: &na::Point2<f64>,
) -> Option<na::Point3<f64>> {
    let mut a = na::Matrix4::zeros();
    a.set_row(0, &(proj1.row(2) * p1.x - proj1.row(0)));
    a.set_row(1, &(proj1.row(2) * p1.y - proj1.row(1)));
    a.set_row(2, &(proj2.row(2) * p2.x - proj2.row(0)));
    a.set_row(3, &(proj2.row(2) * p2.y - proj2.row(1)));

    let svd = a.try_svd(false, true, 1e-12, 1000)?;
    let v_t = svd.v_t?;
    let x = v_t.row(3);

    // Skip points at infinity
    if x[3].abs() < 1e-12 {
        return None;
    }
    Some(na::Point3::new(x[0] / x[3], x[1] / x[3], x[2] / x[3]))
}
