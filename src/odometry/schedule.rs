use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VoError;

/// Ordered frame index pair `(first, second)` with `first < second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FramePair {
    pub first: usize,
    pub second: usize,
}

impl FramePair {
    pub fn new(first: usize, second: usize) -> Self {
        debug_assert!(first < second, "frame pair must be ordered");
        Self { first, second }
    }
}

impl fmt::Display for FramePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}

/// How frames are paired for relative pose estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SamplingStrategy {
    /// (0,1), (1,2), (2,3), ...
    Consecutive,
    /// (0,2), (2,4), (4,6), ...
    #[default]
    Skip2,
    /// (0,4), (4,8), ...
    Skip4,
}

impl SamplingStrategy {
    /// Index gap between the two frames of a pair.
    pub fn gap(&self) -> usize {
        match self {
            Self::Consecutive => 1,
            Self::Skip2 => 2,
            Self::Skip4 => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Consecutive => "consecutive",
            Self::Skip2 => "skip-2",
            Self::Skip4 => "skip-4",
        }
    }

    /// Generate the ordered pair list for a sequence of `total_frames` frames.
    /// Successive pairs are chained: each pair starts where the previous one ended.
    ///
    /// Sequences too short to hold a single pair yield an empty list.
    pub fn frame_pairs(&self, total_frames: usize) -> Vec<FramePair> {
        let gap = self.gap();
        (0..total_frames.saturating_sub(gap))
            .step_by(gap)
            .map(|i| FramePair::new(i, i + gap))
            .collect()
    }
}

impl FromStr for SamplingStrategy {
    type Err = VoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "consecutive" | "1-2-3-4" => Ok(Self::Consecutive),
            "skip-2" | "skip2" | "1-3-5-7" => Ok(Self::Skip2),
            "skip-4" | "skip4" | "1-5-9-13" => Ok(Self::Skip4),
            other => Err(VoError::config(format!(
                "unknown sampling strategy `{other}` (expected consecutive, skip-2 or skip-4)"
            ))),
        }
    }
}

impl TryFrom<String> for SamplingStrategy {
    type Error = VoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SamplingStrategy> for String {
    fn from(strategy: SamplingStrategy) -> Self {
        strategy.name().to_string()
    }
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
