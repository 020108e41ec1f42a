use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::pose_log::PoseRecord;
use crate::error::Result;

/// Single trajectory point with metadata
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    /// Target frame of the pose record that produced this point
    pub frame: usize,
    pub position: [f64; 3],
}

impl TrajectoryPoint {
    pub fn point(&self) -> na::Point3<f64> {
        na::Point3::from(self.position)
    }
}

/// Camera trajectory built by chaining relative poses
///
/// Starts at the identity with no points. Every update appends the position after
/// the motion, so the first point already reflects the first relative pose.
#[derive(Debug, Clone)]
pub struct Trajectory {
    points: Vec<TrajectoryPoint>,
    global_pose: na::Matrix4<f64>,
}

impl Default for Trajectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Trajectory {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            global_pose: na::Matrix4::identity(),
        }
    }

    /// Chain every record, in the given order
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a PoseRecord>,
    {
        let mut trajectory = Self::new();
        for record in records {
            trajectory.push_record(record);
        }
        trajectory
    }

    pub fn push_record(&mut self, record: &PoseRecord) {
        self.update(&record.to_homogeneous(), record.pair.second);
    }

    /// Update pose with a relative `[R | t]` transform, tagging the new point with `frame`
    pub fn update(&mut self, relative_transform: &na::Matrix4<f64>, frame: usize) {
        // Compose: T_global = T_global * T_relative
        self.global_pose *= relative_transform;

        let position = [
            self.global_pose[(0, 3)],
            self.global_pose[(1, 3)],
            self.global_pose[(2, 3)],
        ];
        self.points.push(TrajectoryPoint { frame, position });
    }

    /// Get current global pose
    pub fn current_pose(&self) -> &na::Matrix4<f64> {
        &self.global_pose
    }

    /// Get all trajectory points
    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn positions(&self) -> Vec<na::Point3<f64>> {
        self.points.iter().map(TrajectoryPoint::point).collect()
    }

    /// Calculate total distance traveled between consecutive points
    pub fn total_distance(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| na::distance(&w[0].point(), &w[1].point()))
            .sum()
    }

    /// Get number of trajectory points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if trajectory is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Export trajectory to JSON
    pub fn to_json(&self) -> Result<String> {
        let json = serde_json::to_string_pretty(&self.points)?;
        Ok(json)
    }

    /// Save trajectory to file as JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Write points as a plain `N x 3` table, one space separated row per point
pub fn write_points<W: Write>(mut out: W, points: &[na::Point3<f64>]) -> Result<()> {
    for p in points {
        writeln!(out, "{:.18e} {:.18e} {:.18e}", p.x, p.y, p.z)?;
    }
    out.flush()?;
    Ok(())
}

/// Save points to `path` in the plain table format of [`write_points`]
pub fn save_points<P: AsRef<Path>>(path: P, points: &[na::Point3<f64>]) -> Result<()> {
    let file = File::create(path)?;
    write_points(BufWriter::new(file), points)
}
