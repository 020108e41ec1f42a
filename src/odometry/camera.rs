use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, VoError};

/// Label of the rectified left color camera projection matrix in KITTI calibration files.
pub const DEFAULT_CALIBRATION_LABEL: &str = "P_rect_02:";

/// Camera intrinsic parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64, // focal length x
    pub fy: f64, // focal length y
    pub cx: f64, // principal point x
    pub cy: f64, // principal point y
}

impl CameraIntrinsics {
    /// Create a new camera intrinsics with the given parameters.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// KITTI dataset default camera (grayscale camera 0)
    pub fn kitti() -> Self {
        Self {
            fx: 718.856,
            fy: 718.856,
            cx: 607.1928,
            cy: 185.2157,
        }
    }

    /// Mean of the two focal lengths, used as the single focal length for
    /// essential matrix estimation.
    pub fn focal_length(&self) -> f64 {
        (self.fx + self.fy) / 2.0
    }

    pub fn principal_point(&self) -> na::Point2<f64> {
        na::Point2::new(self.cx, self.cy)
    }

    /// 3x3 camera matrix K
    pub fn to_matrix(&self) -> na::Matrix3<f64> {
        na::Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Load intrinsics from a calibration file using the KITTI `P_rect_02:` record.
    pub fn from_calib_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_calib_file_with_label(path, DEFAULT_CALIBRATION_LABEL)
    }

    pub fn from_calib_file_with_label<P: AsRef<Path>>(path: P, label: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_calibration_str(&text, label)
    }

    /// Parse the 3x4 projection matrix stored under `label`.
    ///
    /// The record is the labelled line followed by two continuation lines, 12
    /// row-major values in total. A labelled line that already carries all 12
    /// values is accepted on its own.
    pub fn from_calibration_str(text: &str, label: &str) -> Result<Self> {
        let lines: Vec<&str> = text.lines().collect();
        let start = lines
            .iter()
            .position(|line| line.trim_start().starts_with(label))
            .ok_or_else(|| {
                VoError::parse("calibration", format!("record `{label}` not found"))
            })?;

        let head = parse_floats(&lines[start].trim_start()[label.len()..])?;
        let values = if head.len() == 12 {
            head
        } else {
            let mut values = head;
            for line in lines.iter().skip(start + 1).take(2) {
                values.extend(parse_floats(line)?);
            }
            values
        };

        if values.len() != 12 {
            return Err(VoError::parse(
                "calibration",
                format!(
                    "expected 12 values for a 3x4 projection matrix, got {}",
                    values.len()
                ),
            ));
        }

        let projection = na::Matrix3x4::from_row_slice(&values);
        let intrinsics = Self::new(
            projection[(0, 0)],
            projection[(1, 1)],
            projection[(0, 2)],
            projection[(1, 2)],
        );

        if !(intrinsics.fx > 0.0 && intrinsics.fy > 0.0) {
            return Err(VoError::parse(
                "calibration",
                format!(
                    "focal lengths must be positive (fx = {}, fy = {})",
                    intrinsics.fx, intrinsics.fy
                ),
            ));
        }

        Ok(intrinsics)
    }
}

fn parse_floats(line: &str) -> Result<Vec<f64>> {
    line.split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| {
                VoError::parse("calibration", format!("`{token}` is not a number"))
            })
        })
        .collect()
}
